//! Word and stem stores for text search.
//!
//! WORDS holds one 5-byte entry per distinct lowercased word of three or
//! more characters: a string offset plus a flag byte. The "appears in an
//! active description" bit is inverted at write time, so on disk a set bit
//! 0 means the word occurs only in inactive descriptions.
//!
//! STEMS holds one 8-byte entry per distinct stem: a string offset plus a
//! refs offset into the sorted list of concept offsets whose descriptions
//! produce that stem. Both stores are written in ascending text order so
//! lookup is a binary search through the string pool.

use super::{StringStore, u32_at};

/// On-disk flag: the word appears ONLY in inactive descriptions.
pub const WORD_FLAG_INACTIVE_ONLY: u8 = 0x01;

/// The word appears in at least one fully specified name.
pub const WORD_FLAG_FSN: u8 = 0x02;

const WORD_ENTRY_SIZE: usize = 5;
const STEM_ENTRY_SIZE: usize = 8;

// ─── Words ───────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct WordStore {
    data: Vec<u8>,
}

impl WordStore {
    pub fn new() -> Self {
        WordStore { data: Vec::new() }
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        assert!(
            data.len() % WORD_ENTRY_SIZE == 0,
            "word store length is not a whole number of entries"
        );
        WordStore { data }
    }

    /// Append an entry. Callers append in ascending word order.
    pub fn add(&mut self, term: u32, flags: u8) {
        self.data.extend_from_slice(&term.to_le_bytes());
        self.data.push(flags);
    }

    pub fn count(&self) -> u32 {
        (self.data.len() / WORD_ENTRY_SIZE) as u32
    }

    pub fn term(&self, i: u32) -> u32 {
        u32_at(&self.data, i as usize * WORD_ENTRY_SIZE)
    }

    pub fn flags(&self, i: u32) -> u8 {
        self.data[i as usize * WORD_ENTRY_SIZE + 4]
    }

    /// Binary search by word text.
    pub fn find(&self, word: &str, strings: &StringStore) -> Option<u32> {
        let mut low = 0u32;
        let mut high = self.count();
        while low < high {
            let mid = (low + high) / 2;
            match strings.get(self.term(mid)).cmp(word) {
                std::cmp::Ordering::Equal => return Some(mid),
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Greater => high = mid,
            }
        }
        None
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

impl Default for WordStore {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Stems ───────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct StemStore {
    data: Vec<u8>,
}

impl StemStore {
    pub fn new() -> Self {
        StemStore { data: Vec::new() }
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        assert!(
            data.len() % STEM_ENTRY_SIZE == 0,
            "stem store length is not a whole number of entries"
        );
        StemStore { data }
    }

    /// Append an entry. Callers append in ascending stem order; the entry
    /// index is the stem id recorded on concepts.
    pub fn add(&mut self, stem: u32, concepts: u32) {
        self.data.extend_from_slice(&stem.to_le_bytes());
        self.data.extend_from_slice(&concepts.to_le_bytes());
    }

    pub fn count(&self) -> u32 {
        (self.data.len() / STEM_ENTRY_SIZE) as u32
    }

    pub fn stem(&self, i: u32) -> u32 {
        u32_at(&self.data, i as usize * STEM_ENTRY_SIZE)
    }

    /// Refs offset of the sorted concept-offset list for stem `i`.
    pub fn concepts(&self, i: u32) -> u32 {
        u32_at(&self.data, i as usize * STEM_ENTRY_SIZE + 4)
    }

    /// Binary search by stem text.
    pub fn find(&self, stem: &str, strings: &StringStore) -> Option<u32> {
        let mut low = 0u32;
        let mut high = self.count();
        while low < high {
            let mid = (low + high) / 2;
            match strings.get(self.stem(mid)).cmp(stem) {
                std::cmp::Ordering::Equal => return Some(mid),
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Greater => high = mid,
            }
        }
        None
    }

    /// Indices of all stems that start with `prefix`, in text order.
    pub fn find_prefix(&self, prefix: &str, strings: &StringStore) -> Vec<u32> {
        // Locate the first candidate with a binary search, then scan.
        let mut low = 0u32;
        let mut high = self.count();
        while low < high {
            let mid = (low + high) / 2;
            if strings.get(self.stem(mid)) < prefix {
                low = mid + 1;
            } else {
                high = mid;
            }
        }
        let mut out = Vec::new();
        let mut i = low;
        while i < self.count() && strings.get(self.stem(i)).starts_with(prefix) {
            out.push(i);
            i += 1;
        }
        out
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

impl Default for StemStore {
    fn default() -> Self {
        Self::new()
    }
}
