//! Fixed-width description records and the description identity index.
//!
//! Record layout (40 bytes, little-endian):
//!
//! | bytes  | field |
//! |--------|-------|
//! | 0..4   | term (string offset) |
//! | 4..12  | description id |
//! | 12..14 | effective date |
//! | 14..18 | concept offset |
//! | 18..22 | module concept offset |
//! | 22..26 | kind concept offset (FSN/synonym/definition) |
//! | 26..30 | case-significance concept offset |
//! | 30     | active flag |
//! | 31     | language code |
//! | 32..36 | refset memberships (refs: refset concept offsets) |
//! | 36..40 | membership values (refs: parallel values-list offsets) |

use crate::SctId;

use super::{put_u32, u16_at, u32_at, u64_at};

pub const DESCRIPTION_RECORD_SIZE: usize = 40;

const OFF_TERM: usize = 0;
const OFF_ID: usize = 4;
const OFF_DATE: usize = 12;
const OFF_CONCEPT: usize = 14;
const OFF_MODULE: usize = 18;
const OFF_KIND: usize = 22;
const OFF_CAPS: usize = 26;
const OFF_ACTIVE: usize = 30;
const OFF_LANG: usize = 31;
const OFF_REFSETS: usize = 32;
const OFF_VALUES: usize = 36;

#[derive(Debug)]
pub struct DescriptionStore {
    data: Vec<u8>,
}

impl DescriptionStore {
    pub fn new() -> Self {
        DescriptionStore { data: Vec::new() }
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        assert!(
            data.len() % DESCRIPTION_RECORD_SIZE == 0,
            "description store length is not a whole number of records"
        );
        DescriptionStore { data }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add(
        &mut self,
        term: u32,
        id: SctId,
        date: u16,
        concept: u32,
        module: u32,
        kind: u32,
        caps: u32,
        active: bool,
        lang: u8,
    ) -> u32 {
        let offset = super::offset_of(self.data.len());
        let mut record = [0u8; DESCRIPTION_RECORD_SIZE];
        record[OFF_TERM..OFF_TERM + 4].copy_from_slice(&term.to_le_bytes());
        record[OFF_ID..OFF_ID + 8].copy_from_slice(&id.to_le_bytes());
        record[OFF_DATE..OFF_DATE + 2].copy_from_slice(&date.to_le_bytes());
        record[OFF_CONCEPT..OFF_CONCEPT + 4].copy_from_slice(&concept.to_le_bytes());
        record[OFF_MODULE..OFF_MODULE + 4].copy_from_slice(&module.to_le_bytes());
        record[OFF_KIND..OFF_KIND + 4].copy_from_slice(&kind.to_le_bytes());
        record[OFF_CAPS..OFF_CAPS + 4].copy_from_slice(&caps.to_le_bytes());
        record[OFF_ACTIVE] = active as u8;
        record[OFF_LANG] = lang;
        self.data.extend_from_slice(&record);
        offset
    }

    pub fn count(&self) -> u32 {
        (self.data.len() / DESCRIPTION_RECORD_SIZE) as u32
    }

    pub fn offset_of_nth(&self, i: u32) -> u32 {
        let offset = i as usize * DESCRIPTION_RECORD_SIZE;
        assert!(offset < self.data.len(), "description index {i} out of range");
        offset as u32
    }

    pub fn term(&self, offset: u32) -> u32 {
        u32_at(&self.data, offset as usize + OFF_TERM)
    }

    pub fn id(&self, offset: u32) -> SctId {
        u64_at(&self.data, offset as usize + OFF_ID)
    }

    pub fn date(&self, offset: u32) -> u16 {
        u16_at(&self.data, offset as usize + OFF_DATE)
    }

    pub fn concept(&self, offset: u32) -> u32 {
        u32_at(&self.data, offset as usize + OFF_CONCEPT)
    }

    pub fn module(&self, offset: u32) -> u32 {
        u32_at(&self.data, offset as usize + OFF_MODULE)
    }

    pub fn kind(&self, offset: u32) -> u32 {
        u32_at(&self.data, offset as usize + OFF_KIND)
    }

    pub fn caps(&self, offset: u32) -> u32 {
        u32_at(&self.data, offset as usize + OFF_CAPS)
    }

    pub fn is_active(&self, offset: u32) -> bool {
        self.data[offset as usize + OFF_ACTIVE] != 0
    }

    pub fn lang(&self, offset: u32) -> u8 {
        self.data[offset as usize + OFF_LANG]
    }

    pub fn refsets(&self, offset: u32) -> u32 {
        u32_at(&self.data, offset as usize + OFF_REFSETS)
    }

    pub fn values(&self, offset: u32) -> u32 {
        u32_at(&self.data, offset as usize + OFF_VALUES)
    }

    pub fn set_refsets(&mut self, offset: u32, refs: u32) {
        put_u32(&mut self.data, offset as usize + OFF_REFSETS, refs);
    }

    pub fn set_values(&mut self, offset: u32, refs: u32) {
        put_u32(&mut self.data, offset as usize + OFF_VALUES, refs);
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

impl Default for DescriptionStore {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Identity index ──────────────────────────────────────────────────

/// Sorted (description id, description offset) pairs; 12 bytes each.
/// Separate from the description store because descriptions are stored in
/// input order per concept, not in id order.
#[derive(Debug)]
pub struct DescriptionIdIndex {
    data: Vec<u8>,
}

const PAIR_SIZE: usize = 12;

impl DescriptionIdIndex {
    /// Build from pairs; sorts by id.
    pub fn build(mut pairs: Vec<(SctId, u32)>) -> Self {
        pairs.sort_unstable_by_key(|&(id, _)| id);
        let mut data = Vec::with_capacity(pairs.len() * PAIR_SIZE);
        for (id, offset) in pairs {
            data.extend_from_slice(&id.to_le_bytes());
            data.extend_from_slice(&offset.to_le_bytes());
        }
        DescriptionIdIndex { data }
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        assert!(
            data.len() % PAIR_SIZE == 0,
            "description index length is not a whole number of pairs"
        );
        DescriptionIdIndex { data }
    }

    pub fn count(&self) -> u32 {
        (self.data.len() / PAIR_SIZE) as u32
    }

    /// Binary search by description id, returning the description offset.
    pub fn find(&self, id: SctId) -> Option<u32> {
        let mut low = 0usize;
        let mut high = self.count() as usize;
        while low < high {
            let mid = (low + high) / 2;
            let at = u64_at(&self.data, mid * PAIR_SIZE);
            if at == id {
                return Some(u32_at(&self.data, mid * PAIR_SIZE + 8));
            } else if at < id {
                low = mid + 1;
            } else {
                high = mid;
            }
        }
        None
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}
