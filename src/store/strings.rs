//! UTF-8 string pool.
//!
//! Each entry is a 4-byte length followed by the bytes. Offset 0 is reserved
//! for the empty string so that zero-initialised record fields read as "".
//! The pool can be reopened after freezing: refset titles and normal forms
//! are interned late in the import, after everything else is linked.

use super::{offset_of, u32_at};

#[derive(Debug)]
pub struct StringStore {
    data: Vec<u8>,
    frozen: bool,
}

impl StringStore {
    pub fn new() -> Self {
        let mut store = StringStore {
            data: Vec::new(),
            frozen: false,
        };
        // Offset 0: the empty string.
        store.add("");
        store
    }

    /// Rehydrate a frozen pool from cache-file bytes.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        StringStore { data, frozen: true }
    }

    /// Append a string, returning its offset.
    pub fn add(&mut self, s: &str) -> u32 {
        assert!(!self.frozen, "string store is frozen");
        let offset = offset_of(self.data.len());
        let bytes = s.as_bytes();
        self.data.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        self.data.extend_from_slice(bytes);
        offset
    }

    /// Read the string at `offset`. Panics on an out-of-range or non-UTF-8
    /// entry; both indicate a corrupted offset, not bad user input.
    pub fn get(&self, offset: u32) -> &str {
        let at = offset as usize;
        let len = u32_at(&self.data, at) as usize;
        std::str::from_utf8(&self.data[at + 4..at + 4 + len]).expect("string store entry not UTF-8")
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Allow appends again. Only the importer does this, and only while no
    /// reader exists.
    pub fn reopen(&mut self) {
        self.frozen = false;
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

impl Default for StringStore {
    fn default() -> Self {
        Self::new()
    }
}
