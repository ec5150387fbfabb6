//! The concept cache: every store plus the edition metadata, and the
//! bit-exact file codec that persists it.
//!
//! The on-disk layout is a fixed sequence of type-tagged fields (a legacy
//! encoding kept for compatibility with existing caches): three strings
//! (cache version, version URI, version date), ten byte arrays (one per
//! store plus the description id index), the is-a concept offset, the two
//! root lists as tagged u64 SCTIDs, and the default language. Writer and
//! reader round-trip byte-identically.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::time::Instant;

use tracing::info;

use crate::SctId;
use crate::error::{Result, SnomedError};
use crate::lang::Language;
use crate::store::{
    ConceptStore, DescriptionIdIndex, DescriptionStore, RefsStore, RefsetIndexStore,
    RefsetMemberStore, RelationshipStore, StemStore, StringStore, WordStore,
};

/// Bumped whenever the record layouts change; a mismatch on load demands a
/// re-import.
pub const CACHE_VERSION: &str = "16";

const TAG_INT32: u8 = 4;
const TAG_UINT64: u8 = 5;
const TAG_STRING: u8 = 6;

/// Marker length byte: the real length follows as a u32. The short/long
/// switch happens strictly at 255.
const LONG_STRING_MARKER: u8 = 0xFF;

// ─── Cache ───────────────────────────────────────────────────────────

/// The fully-built, frozen terminology cache. Queries take `&self`; after
/// import nothing mutates it, so any number of query threads share one
/// instance without locking.
#[derive(Debug)]
pub struct ConceptCache {
    pub strings: StringStore,
    pub refs: RefsStore,
    pub descriptions: DescriptionStore,
    pub words: WordStore,
    pub stems: StemStore,
    pub concepts: ConceptStore,
    pub relationships: RelationshipStore,
    pub refset_index: RefsetIndexStore,
    pub refset_members: RefsetMemberStore,
    pub desc_index: DescriptionIdIndex,
    /// Concept offset of `116680003 |is a|`.
    pub is_a_offset: u32,
    /// Roots (no active parents), partitioned by activity, as SCTIDs.
    pub inactive_roots: Vec<SctId>,
    pub active_roots: Vec<SctId>,
    pub default_language: Language,
    pub version_uri: String,
    pub version_date: String,
}

impl ConceptCache {
    /// Resolved concept offsets of the active roots, in SCTID order.
    pub fn active_root_offsets(&self) -> Vec<u32> {
        self.active_roots
            .iter()
            .filter_map(|&id| self.concepts.find(id))
            .collect()
    }

    /// The code-system URI: the configured edition URI up to `/sct/` (or
    /// `/xsct/` for test imports).
    pub fn system_uri(&self) -> &str {
        if self.version_uri.contains("/xsct/") {
            "http://snomed.info/xsct"
        } else {
            crate::SNOMED_URI
        }
    }

    // ── save ─────────────────────────────────────────────────────────

    pub fn save(&self, path: &Path) -> Result<()> {
        let start = Instant::now();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        let mut w = BufWriter::new(file);

        write_string(&mut w, CACHE_VERSION)?;
        write_string(&mut w, &self.version_uri)?;
        write_string(&mut w, &self.version_date)?;

        write_bytes(&mut w, self.strings.bytes())?;
        write_bytes(&mut w, self.refs.bytes())?;
        write_bytes(&mut w, self.descriptions.bytes())?;
        write_bytes(&mut w, self.words.bytes())?;
        write_bytes(&mut w, self.stems.bytes())?;
        write_bytes(&mut w, self.concepts.bytes())?;
        write_bytes(&mut w, self.relationships.bytes())?;
        write_bytes(&mut w, self.refset_index.bytes())?;
        write_bytes(&mut w, self.refset_members.bytes())?;
        write_bytes(&mut w, self.desc_index.bytes())?;

        write_int32(&mut w, self.is_a_offset as i32)?;
        write_int32(&mut w, self.inactive_roots.len() as i32)?;
        for &root in &self.inactive_roots {
            write_uint64(&mut w, root)?;
        }
        write_int32(&mut w, self.active_roots.len() as i32)?;
        for &root in &self.active_roots {
            write_uint64(&mut w, root)?;
        }
        write_int32(&mut w, self.default_language.code() as i32)?;

        w.flush()?;
        info!(
            path = %path.display(),
            concepts = self.concepts.count(),
            elapsed_s = start.elapsed().as_secs_f64(),
            "cache saved"
        );
        Ok(())
    }

    // ── load ─────────────────────────────────────────────────────────

    pub fn load(path: &Path) -> Result<ConceptCache> {
        let start = Instant::now();
        let file = File::open(path)?;
        let mut r = CacheReader {
            inner: BufReader::new(file),
            path: path.display().to_string(),
        };

        let version = r.read_string()?;
        if version != CACHE_VERSION {
            return Err(r.bad(format!(
                "cache version is {version}, this build reads {CACHE_VERSION}; re-import required"
            )));
        }
        let version_uri = r.read_string()?;
        let version_date = r.read_string()?;

        let strings = StringStore::from_bytes(r.read_bytes()?);
        let refs = RefsStore::from_bytes(r.read_bytes()?);
        let descriptions = DescriptionStore::from_bytes(r.read_bytes()?);
        let words = WordStore::from_bytes(r.read_bytes()?);
        let stems = StemStore::from_bytes(r.read_bytes()?);
        let concepts = ConceptStore::from_bytes(r.read_bytes()?);
        let relationships = RelationshipStore::from_bytes(r.read_bytes()?);
        let refset_index = RefsetIndexStore::from_bytes(r.read_bytes()?);
        let refset_members = RefsetMemberStore::from_bytes(r.read_bytes()?);
        let desc_index = DescriptionIdIndex::from_bytes(r.read_bytes()?);

        let is_a_offset = r.read_int32()? as u32;
        if !concepts.is_valid_offset(is_a_offset) {
            return Err(r.bad(format!("is-a offset {is_a_offset} is not a concept record")));
        }

        let inactive_count = r.read_int32()?;
        let mut inactive_roots = Vec::with_capacity(inactive_count.max(0) as usize);
        for _ in 0..inactive_count {
            inactive_roots.push(r.read_uint64()?);
        }
        let active_count = r.read_int32()?;
        let mut active_roots = Vec::with_capacity(active_count.max(0) as usize);
        for _ in 0..active_count {
            active_roots.push(r.read_uint64()?);
        }
        let default_language = Language::from_code(r.read_int32()? as u8);

        let cache = ConceptCache {
            strings,
            refs,
            descriptions,
            words,
            stems,
            concepts,
            relationships,
            refset_index,
            refset_members,
            desc_index,
            is_a_offset,
            inactive_roots,
            active_roots,
            default_language,
            version_uri,
            version_date,
        };
        info!(
            path = %path.display(),
            concepts = cache.concepts.count(),
            elapsed_s = start.elapsed().as_secs_f64(),
            "cache loaded"
        );
        Ok(cache)
    }
}

// ─── Writer half ─────────────────────────────────────────────────────

fn write_int32<W: Write>(w: &mut W, value: i32) -> Result<()> {
    w.write_all(&[TAG_INT32])?;
    w.write_all(&value.to_le_bytes())?;
    Ok(())
}

fn write_uint64<W: Write>(w: &mut W, value: u64) -> Result<()> {
    w.write_all(&[TAG_UINT64])?;
    w.write_all(&value.to_le_bytes())?;
    Ok(())
}

fn write_string<W: Write>(w: &mut W, value: &str) -> Result<()> {
    w.write_all(&[TAG_STRING])?;
    let bytes = value.as_bytes();
    if bytes.len() < LONG_STRING_MARKER as usize {
        w.write_all(&[bytes.len() as u8])?;
    } else {
        w.write_all(&[LONG_STRING_MARKER])?;
        w.write_all(&(bytes.len() as u32).to_le_bytes())?;
    }
    w.write_all(bytes)?;
    Ok(())
}

fn write_bytes<W: Write>(w: &mut W, bytes: &[u8]) -> Result<()> {
    w.write_all(&[TAG_INT32])?;
    w.write_all(&(bytes.len() as i32).to_le_bytes())?;
    w.write_all(bytes)?;
    Ok(())
}

// ─── Reader half ─────────────────────────────────────────────────────

struct CacheReader {
    inner: BufReader<File>,
    path: String,
}

impl CacheReader {
    fn bad(&self, message: String) -> SnomedError {
        SnomedError::BadCacheFile {
            path: self.path.clone(),
            message,
        }
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner
            .read_exact(buf)
            .map_err(|e| self.bad(format!("truncated file: {e}")))
    }

    fn expect_tag(&mut self, tag: u8, what: &str) -> Result<()> {
        let mut b = [0u8; 1];
        self.read_exact(&mut b)?;
        if b[0] != tag {
            return Err(self.bad(format!(
                "expected type tag {tag} for {what}, found {}",
                b[0]
            )));
        }
        Ok(())
    }

    fn read_int32(&mut self) -> Result<i32> {
        self.expect_tag(TAG_INT32, "int32")?;
        let mut b = [0u8; 4];
        self.read_exact(&mut b)?;
        Ok(i32::from_le_bytes(b))
    }

    fn read_uint64(&mut self) -> Result<u64> {
        self.expect_tag(TAG_UINT64, "uint64")?;
        let mut b = [0u8; 8];
        self.read_exact(&mut b)?;
        Ok(u64::from_le_bytes(b))
    }

    fn read_string(&mut self) -> Result<String> {
        self.expect_tag(TAG_STRING, "string")?;
        let mut b = [0u8; 1];
        self.read_exact(&mut b)?;
        let len = if b[0] == LONG_STRING_MARKER {
            let mut l = [0u8; 4];
            self.read_exact(&mut l)?;
            u32::from_le_bytes(l) as usize
        } else {
            b[0] as usize
        };
        let mut bytes = vec![0u8; len];
        self.read_exact(&mut bytes)?;
        String::from_utf8(bytes).map_err(|e| self.bad(format!("string field not UTF-8: {e}")))
    }

    fn read_bytes(&mut self) -> Result<Vec<u8>> {
        self.expect_tag(TAG_INT32, "byte array length")?;
        let mut l = [0u8; 4];
        self.read_exact(&mut l)?;
        let len = i32::from_le_bytes(l);
        if len < 0 {
            return Err(self.bad(format!("negative byte array length {len}")));
        }
        let mut bytes = vec![0u8; len as usize];
        self.read_exact(&mut bytes)?;
        Ok(bytes)
    }
}
