//! The RF2 importer: eighteen ordered phases from source tree to cache file.
//!
//! Import is strictly single-writer. The front phases are I/O bound (row
//! reading), the middle is CPU bound (words, closure), and the tail writes
//! the cache. Every phase logs its row counts and elapsed time and probes
//! the cancellation token; the tight inner loops probe it too.

mod closure;
mod refsets;
mod words;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::cache::ConceptCache;
use crate::cancel::CancelToken;
use crate::config::ImportConfig;
use crate::error::{Result, SnomedError};
use crate::expression::ExpressionEngine;
use crate::lang::Language;
use crate::rf2::{self, ConceptRow, DescriptionRow, RelationshipRow, Rf2File, Rf2FileKind};
use crate::store::{
    ConceptStore, DescriptionIdIndex, DescriptionStore, RefsStore, RefsetIndexStore,
    RefsetMemberStore, RelationshipStore, StemStore, StringStore, WordStore,
};
use crate::{IS_A, SctId, TEST_DATA_MARKER, is_defining_characteristic};

/// How often tight loops probe the cancellation token.
const CANCEL_STRIDE: usize = 4096;

// ─── Public surface ──────────────────────────────────────────────────

/// Per-phase timing plus final store counts.
#[derive(Debug, Default)]
pub struct ImportStats {
    pub concepts: u32,
    pub descriptions: u32,
    pub relationships: u32,
    pub refsets: u32,
    pub words: u32,
    pub stems: u32,
    pub phases: Vec<(String, Duration)>,
    pub elapsed: Duration,
}

/// Run a full import: RF2 source tree in, cache file out.
///
/// Returns the stats summary; the built cache itself is on disk at
/// `config.cache_path()`. Use [`import_to_cache`] to keep the cache in
/// memory as well.
pub fn import(config: &ImportConfig, cancel: &CancelToken) -> Result<ImportStats> {
    let (stats, _cache) = import_to_cache(config, cancel)?;
    Ok(stats)
}

/// As [`import`], but hands back the built cache instead of dropping it.
pub fn import_to_cache(
    config: &ImportConfig,
    cancel: &CancelToken,
) -> Result<(ImportStats, ConceptCache)> {
    config.validate()?;
    let cache_path = config.cache_path();
    if cache_path.exists() && !config.overwrite {
        return Err(SnomedError::BadConfig(format!(
            "cache file {} already exists; set overwrite to replace it",
            cache_path.display()
        )));
    }

    let start = Instant::now();
    let mut import = Import::new(config, cancel);

    // Phases 1..16 populate the stores.
    let files = import.run_discovery()?;
    import.run_concept_phases(&files)?;
    let desc_rows = import.run_description_phases(&files)?;
    import.run_word_phase(&desc_rows)?;
    drop(desc_rows);
    import.run_relationship_phases(&files)?;
    import.run_linking_phase()?;
    import.run_closure_phases()?;
    import.run_refset_phases(&files)?;

    // Phases 17 and 18 operate on the assembled cache.
    let (mut cache, mut stats) = import.assemble(config);
    run_normal_forms(&mut cache, cancel, &mut stats)?;

    let save_start = Instant::now();
    cache.save(&cache_path)?;
    stats.phases.push(("save cache".to_string(), save_start.elapsed()));

    stats.concepts = cache.concepts.count();
    stats.descriptions = cache.descriptions.count();
    stats.relationships = cache.relationships.count();
    stats.refsets = cache.refset_index.count();
    stats.words = cache.words.count();
    stats.stems = cache.stems.count();
    stats.elapsed = start.elapsed();
    info!(
        concepts = stats.concepts,
        descriptions = stats.descriptions,
        relationships = stats.relationships,
        refsets = stats.refsets,
        elapsed_s = stats.elapsed.as_secs_f64(),
        "import complete"
    );
    Ok((stats, cache))
}

// ─── Build state ─────────────────────────────────────────────────────

/// Per-concept cross-references accumulated between the build and link
/// phases. Indexed by concept position (record index).
#[derive(Default)]
pub(crate) struct ConceptTracker {
    pub active_parents: Vec<u32>,
    pub inactive_parents: Vec<u32>,
    pub descriptions: Vec<u32>,
    pub inbounds: Vec<u32>,
    pub outbounds: Vec<u32>,
}

pub(crate) struct Import<'a> {
    pub config: &'a ImportConfig,
    pub cancel: &'a CancelToken,
    pub stats: ImportStats,

    pub strings: StringStore,
    pub refs: RefsStore,
    pub concepts: ConceptStore,
    pub descriptions: DescriptionStore,
    pub relationships: RelationshipStore,
    pub words: WordStore,
    pub stems: StemStore,
    pub refset_index: RefsetIndexStore,
    pub refset_members: RefsetMemberStore,

    pub trackers: Vec<ConceptTracker>,
    pub desc_pairs: Vec<(SctId, u32)>,
    pub inactive_roots: Vec<SctId>,
    pub active_roots: Vec<SctId>,
    pub is_a_offset: u32,
    pub test_data: bool,
}

impl<'a> Import<'a> {
    fn new(config: &'a ImportConfig, cancel: &'a CancelToken) -> Self {
        Import {
            config,
            cancel,
            stats: ImportStats::default(),
            strings: StringStore::new(),
            refs: RefsStore::new(),
            concepts: ConceptStore::new(),
            descriptions: DescriptionStore::new(),
            relationships: RelationshipStore::new(),
            words: WordStore::new(),
            stems: StemStore::new(),
            refset_index: RefsetIndexStore::new(),
            refset_members: RefsetMemberStore::new(),
            trackers: Vec::new(),
            desc_pairs: Vec::new(),
            inactive_roots: Vec::new(),
            active_roots: Vec::new(),
            is_a_offset: 0,
            test_data: false,
        }
    }

    fn finish_phase(&mut self, name: &str, start: Instant, count: usize) {
        let elapsed = start.elapsed();
        info!(phase = name, rows = count, elapsed_s = elapsed.as_secs_f64(), "phase complete");
        self.stats.phases.push((name.to_string(), elapsed));
    }

    /// Concept position (record index) for a record offset.
    pub(crate) fn position_of(offset: u32) -> usize {
        offset as usize / crate::store::CONCEPT_RECORD_SIZE
    }

    /// Description lookup by id before the identity index is materialised.
    /// `desc_pairs` is in id order because descriptions are built from rows
    /// sorted in phase 6.
    pub(crate) fn find_description(&self, id: SctId) -> Option<u32> {
        self.desc_pairs
            .binary_search_by_key(&id, |&(pair_id, _)| pair_id)
            .ok()
            .map(|i| self.desc_pairs[i].1)
    }

    // ── phase 1: discover files ──────────────────────────────────────

    fn run_discovery(&mut self) -> Result<Vec<Rf2File>> {
        self.cancel.check("discover files")?;
        let start = Instant::now();
        let files = rf2::discover(&self.config.source)?;
        self.finish_phase("discover files", start, files.len());
        Ok(files)
    }

    // ── phases 2..4: concepts ────────────────────────────────────────

    fn run_concept_phases(&mut self, files: &[Rf2File]) -> Result<()> {
        // Phase 2: read.
        self.cancel.check("read concepts")?;
        let start = Instant::now();
        let mut rows = Vec::new();
        for file in files.iter().filter(|f| f.kind == Rf2FileKind::Concepts) {
            let file_name = file.path.display().to_string();
            for (line_no, line) in rf2::read_lines(&file.path)?.iter().enumerate() {
                if line_no % CANCEL_STRIDE == 0 {
                    self.cancel.check("read concepts")?;
                }
                match ConceptRow::parse(line) {
                    Ok(row) => {
                        if row.id == TEST_DATA_MARKER {
                            self.test_data = true;
                        }
                        rows.push(row);
                    }
                    Err(e) => match e {
                        SnomedError::BadDate { .. } => return Err(e),
                        _ => warn!(file = %file_name, line = line_no + 2, error = %e, "skipping concept row"),
                    },
                }
            }
        }
        self.finish_phase("read concepts", start, rows.len());

        // Phase 3: sort by SCTID; adjacent duplicates are fatal.
        let start = Instant::now();
        rows.sort_unstable_by_key(|r| r.id);
        for pair in rows.windows(2) {
            if pair[0].id == pair[1].id {
                return Err(SnomedError::DuplicateConcept { id: pair[0].id });
            }
        }
        self.finish_phase("sort concepts", start, rows.len());

        // Phase 4: append concept slots.
        let start = Instant::now();
        for (i, row) in rows.iter().enumerate() {
            if i % CANCEL_STRIDE == 0 {
                self.cancel.check("build concept cache")?;
            }
            let flags = if row.active {
                0
            } else {
                crate::store::CONCEPT_FLAG_INACTIVE
            };
            self.concepts.add(row.id, row.date, flags);
            self.trackers.push(ConceptTracker::default());
        }
        // The store and trackers now carry everything the later phases
        // need; the raw rows can go.
        let count = rows.len();
        drop(rows);
        self.finish_phase("build concept cache", start, count);
        Ok(())
    }

    // ── phases 5..7: descriptions ────────────────────────────────────

    fn run_description_phases(&mut self, files: &[Rf2File]) -> Result<Vec<(DescriptionRow, u32)>> {
        // Phase 5: read.
        self.cancel.check("read descriptions")?;
        let start = Instant::now();
        let mut rows = Vec::new();
        for file in files.iter().filter(|f| f.kind == Rf2FileKind::Descriptions) {
            let file_name = file.path.display().to_string();
            for (line_no, line) in rf2::read_lines(&file.path)?.iter().enumerate() {
                if line_no % CANCEL_STRIDE == 0 {
                    self.cancel.check("read descriptions")?;
                }
                match DescriptionRow::parse(line) {
                    Ok(row) => rows.push(row),
                    Err(e) => match e {
                        SnomedError::BadDate { .. } => return Err(e),
                        _ => warn!(file = %file_name, line = line_no + 2, error = %e, "skipping description row"),
                    },
                }
            }
        }
        self.finish_phase("read descriptions", start, rows.len());

        // Phase 6: sort by description id.
        let start = Instant::now();
        rows.sort_unstable_by_key(|r| r.id);
        self.finish_phase("sort descriptions", start, rows.len());

        // Phase 7: build records, link to concepts, feed the id index.
        let start = Instant::now();
        let mut built = Vec::with_capacity(rows.len());
        for (i, row) in rows.into_iter().enumerate() {
            if i % CANCEL_STRIDE == 0 {
                self.cancel.check("build description cache")?;
            }
            let Some(concept_offset) = self.concepts.find(row.concept) else {
                warn!(description = row.id, concept = row.concept, "description references a missing concept; skipped");
                continue;
            };
            let module = self.concepts.find(row.module).unwrap_or(0);
            let kind = self.concepts.find(row.type_id).unwrap_or(0);
            let caps = self.concepts.find(row.case_significance).unwrap_or(0);
            let lang = Language::from_tag(&row.language).unwrap_or(Language::Other);
            let term = self.strings.add(&row.term);
            let offset = self.descriptions.add(
                term,
                row.id,
                row.date,
                concept_offset,
                module,
                kind,
                caps,
                row.active,
                lang.code(),
            );
            self.trackers[Self::position_of(concept_offset)]
                .descriptions
                .push(offset);
            self.desc_pairs.push((row.id, offset));
            built.push((row, offset));
        }
        self.finish_phase("build description cache", start, built.len());
        Ok(built)
    }

    // ── phase 8: words & stems ───────────────────────────────────────

    fn run_word_phase(&mut self, desc_rows: &[(DescriptionRow, u32)]) -> Result<()> {
        let start = Instant::now();
        if !self.config.create_indexes {
            info!(phase = "process words", "skipped: create_indexes is off");
            self.stats.phases.push(("process words".to_string(), start.elapsed()));
            return Ok(());
        }
        let count = words::process_words(self, desc_rows)?;
        self.finish_phase("process words", start, count);
        Ok(())
    }

    // ── phase 9: relationships ───────────────────────────────────────

    fn run_relationship_phases(&mut self, files: &[Rf2File]) -> Result<()> {
        self.cancel.check("read relationships")?;
        let start = Instant::now();
        let mut count = 0usize;
        for file in files.iter().filter(|f| f.kind == Rf2FileKind::Relationships) {
            let file_name = file.path.display().to_string();
            for (line_no, line) in rf2::read_lines(&file.path)?.iter().enumerate() {
                if line_no % CANCEL_STRIDE == 0 {
                    self.cancel.check("read relationships")?;
                }
                let row = match RelationshipRow::parse(line) {
                    Ok(row) => row,
                    Err(e) => match e {
                        SnomedError::BadDate { .. } => return Err(e),
                        _ => {
                            warn!(file = %file_name, line = line_no + 2, error = %e, "skipping relationship row");
                            continue;
                        }
                    },
                };
                if self.add_relationship(&file_name, line_no, &row)? {
                    count += 1;
                }
            }
        }
        self.finish_phase("read relationships", start, count);
        Ok(())
    }

    fn add_relationship(
        &mut self,
        file_name: &str,
        line_no: usize,
        row: &RelationshipRow,
    ) -> Result<bool> {
        let (Some(source), Some(target), Some(rel_type)) = (
            self.concepts.find(row.source),
            self.concepts.find(row.destination),
            self.concepts.find(row.type_id),
        ) else {
            warn!(relationship = row.id, "relationship references a missing concept; skipped");
            return Ok(false);
        };
        let group = u8::try_from(row.group).map_err(|_| SnomedError::InvalidRf2 {
            file: file_name.to_string(),
            line: line_no + 2,
            message: format!("relationship group {} exceeds 255", row.group),
        })?;
        let defining = is_defining_characteristic(row.characteristic);
        let offset = self.relationships.add(
            row.id, source, target, rel_type, row.date, row.active, defining, group,
        );

        self.trackers[Self::position_of(source)].outbounds.push(offset);
        self.trackers[Self::position_of(target)].inbounds.push(offset);
        if defining && row.type_id == IS_A {
            let tracker = &mut self.trackers[Self::position_of(source)];
            if row.active {
                tracker.active_parents.push(target);
            } else {
                tracker.inactive_parents.push(target);
            }
        }
        Ok(true)
    }

    // ── phase 10: link concepts ──────────────────────────────────────

    fn run_linking_phase(&mut self) -> Result<()> {
        self.cancel.check("link concepts")?;
        let start = Instant::now();
        let count = self.concepts.count();
        for i in 0..count as usize {
            if i % CANCEL_STRIDE == 0 {
                self.cancel.check("link concepts")?;
            }
            let offset = self.concepts.offset_of_nth(i as u32);
            let tracker = std::mem::take(&mut self.trackers[i]);

            if !tracker.active_parents.is_empty() {
                let refs = self.refs.add(&tracker.active_parents);
                self.concepts.set_parents(offset, refs);
            }
            if !tracker.inactive_parents.is_empty() {
                let refs = self.refs.add(&tracker.inactive_parents);
                self.concepts.set_inactive_parents(offset, refs);
            }
            if !tracker.descriptions.is_empty() {
                let refs = self.refs.add(&tracker.descriptions);
                self.concepts.set_descriptions(offset, refs);
            }
            let mut inbounds = tracker.inbounds;
            inbounds.sort_unstable();
            if !inbounds.is_empty() {
                let refs = self.refs.add(&inbounds);
                self.concepts.set_inbounds(offset, refs);
            }
            let mut outbounds = tracker.outbounds;
            outbounds.sort_unstable();
            if !outbounds.is_empty() {
                let refs = self.refs.add(&outbounds);
                self.concepts.set_outbounds(offset, refs);
            }

            if tracker.active_parents.is_empty() {
                let id = self.concepts.id(offset);
                if self.concepts.is_inactive(offset) {
                    self.inactive_roots.push(id);
                } else {
                    self.active_roots.push(id);
                }
            }
        }
        if self.active_roots.is_empty() {
            return Err(SnomedError::NoActiveRoot);
        }
        self.is_a_offset = self.concepts.find(IS_A).ok_or(SnomedError::MissingConcept {
            id: IS_A,
            referrer: "the relationship table",
        })?;
        self.finish_phase("link concepts", start, count as usize);
        Ok(())
    }

    // ── phases 11..12: closure & depths ──────────────────────────────

    fn run_closure_phases(&mut self) -> Result<()> {
        let start = Instant::now();
        closure::build_closure(self)?;
        let count = self.concepts.count() as usize;
        self.finish_phase("build closure", start, count);

        let start = Instant::now();
        closure::set_depths(self)?;
        self.finish_phase("set depths", start, count);
        Ok(())
    }

    // ── phases 13..16: reference sets ────────────────────────────────

    fn run_refset_phases(&mut self, files: &[Rf2File]) -> Result<()> {
        refsets::run(self, files)
    }

    // ── assembly ─────────────────────────────────────────────────────

    fn assemble(self, config: &ImportConfig) -> (ConceptCache, ImportStats) {
        let mut version_uri = config.version_uri();
        if self.test_data {
            version_uri = version_uri.replace("/sct/", "/xsct/");
        }
        let cache = ConceptCache {
            strings: self.strings,
            refs: self.refs,
            descriptions: self.descriptions,
            words: self.words,
            stems: self.stems,
            concepts: self.concepts,
            relationships: self.relationships,
            refset_index: self.refset_index,
            refset_members: self.refset_members,
            desc_index: DescriptionIdIndex::build(self.desc_pairs),
            is_a_offset: self.is_a_offset,
            inactive_roots: self.inactive_roots,
            active_roots: self.active_roots,
            default_language: config.default_language(),
            version_uri,
            version_date: config.version.clone(),
        };
        (cache, self.stats)
    }
}

// ─── Phase 17: normal forms ──────────────────────────────────────────

fn run_normal_forms(
    cache: &mut ConceptCache,
    cancel: &CancelToken,
    stats: &mut ImportStats,
) -> Result<()> {
    let start = Instant::now();
    cache.strings.freeze();

    let mut forms: Vec<(u32, String)> = Vec::new();
    {
        let engine = ExpressionEngine::new(cache);
        let count = cache.concepts.count();
        for i in 0..count {
            if i as usize % CANCEL_STRIDE == 0 {
                cancel.check("build normal forms")?;
            }
            let offset = cache.concepts.offset_of_nth(i);
            if let Some(rendered) = engine.concept_normal_form(offset) {
                forms.push((offset, rendered));
            }
        }
    }

    let count = forms.len();
    cache.strings.reopen();
    for (offset, rendered) in forms {
        let string_offset = cache.strings.add(&rendered);
        cache.concepts.set_normal_form(offset, string_offset);
    }
    cache.strings.freeze();

    let elapsed = start.elapsed();
    info!(phase = "build normal forms", rows = count, elapsed_s = elapsed.as_secs_f64(), "phase complete");
    stats.phases.push(("build normal forms".to_string(), elapsed));
    Ok(())
}

// ─── Import-time display lookup ──────────────────────────────────────

/// Best display term for a concept while the cache is still building:
/// prefer an active synonym, then an active FSN, then any description.
/// Shared by the refset phases for member ordering and titles.
pub(crate) fn building_display(
    concepts: &ConceptStore,
    descriptions: &DescriptionStore,
    refs: &RefsStore,
    strings: &StringStore,
    concept_offset: u32,
    synonym_kind: u32,
) -> String {
    let list = refs.read(concepts.descriptions(concept_offset));
    let mut fsn = None;
    let mut any = None;
    for desc in list.iter() {
        if any.is_none() {
            any = Some(desc);
        }
        if !descriptions.is_active(desc) {
            continue;
        }
        if descriptions.kind(desc) == synonym_kind && synonym_kind != 0 {
            return strings.get(descriptions.term(desc)).to_string();
        }
        if fsn.is_none() {
            fsn = Some(desc);
        }
    }
    fsn.or(any)
        .map(|d| strings.get(descriptions.term(d)).to_string())
        .unwrap_or_default()
}

/// Cached per-language stemmers for the word phase.
pub(crate) struct StemmerSet {
    stemmers: HashMap<Language, rust_stemmers::Stemmer>,
}

impl StemmerSet {
    pub(crate) fn new() -> Self {
        StemmerSet {
            stemmers: HashMap::new(),
        }
    }

    pub(crate) fn stem(&mut self, lang: Language, word: &str) -> String {
        self.stemmers
            .entry(lang)
            .or_insert_with(|| lang.stemmer())
            .stem(word)
            .into_owned()
    }
}

#[cfg(test)]
#[path = "import_tests.rs"]
mod tests;
