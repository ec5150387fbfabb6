//! RF2 input: source-tree discovery and row parsing.
//!
//! RF2 snapshot files are tab-separated UTF-8 with a schema header line, no
//! quoting, and either LF or CRLF endings. Discovery classifies files by
//! sniffing the header (and by directory for reference sets); row parsing
//! turns lines into typed rows, converting effectiveTime into the 16-bit
//! day serial used throughout the cache.

mod files;
mod rows;

pub use files::{FieldType, Rf2File, Rf2FileKind, discover};
pub use rows::{
    ConceptRow, DescriptionRow, RefsetRow, RelationshipRow, effective_days, parse_active,
    parse_sctid, read_lines,
};
