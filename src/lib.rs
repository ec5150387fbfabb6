//! # snomed: SNOMED CT terminology core
//!
//! Offline RF2 importer producing a packed binary concept cache, plus the
//! query engine that answers concept lookup, hierarchy, full-text search,
//! reference-set membership, and compositional-grammar questions over it.
//!
//! ## Library usage
//!
//! This crate is the terminology core consumed by a FHIR terminology server.
//! The server-side glue (HTTP routing, CodeSystem/ValueSet wrappers, CLI) is
//! deliberately out of scope; the surface here is [`import::import`] on one
//! side and [`provider::SnomedProvider`] on the other.

pub mod cache;
pub mod cancel;
pub mod config;
pub mod error;
pub mod expression;
pub mod filter;
pub mod hierarchy;
pub mod import;
pub mod lang;
pub mod provider;
pub mod refset;
pub mod rf2;
pub mod store;

#[cfg(test)]
pub(crate) mod testutil;

pub use cache::ConceptCache;
pub use cancel::CancelToken;
pub use config::ImportConfig;
pub use error::SnomedError;
pub use provider::SnomedProvider;

// ─── Identifiers ─────────────────────────────────────────────────────

/// 64-bit unsigned decimal SNOMED CT identifier.
pub type SctId = u64;

/// The subsumption relation, `116680003 |is a|`.
pub const IS_A: SctId = 116680003;

/// Description type: fully specified name.
pub const FSN_TYPE: SctId = 900000000000003001;

/// Description type: synonym.
pub const SYNONYM_TYPE: SctId = 900000000000013009;

/// Description type: text definition.
pub const TEXT_DEFINITION_TYPE: SctId = 900000000000550004;

/// Characteristic type: defining relationship.
pub const DEFINING_CHARACTERISTIC: SctId = 900000000000011006;

/// Characteristic type: stated relationship (retained for historical imports).
pub const STATED_CHARACTERISTIC: SctId = 900000000000010007;

/// Characteristic type: inferred relationship.
pub const INFERRED_CHARACTERISTIC: SctId = 900000000000006009;

/// Language-refset acceptability: preferred.
pub const PREFERRED_ACCEPTABILITY: SctId = 900000000000548007;

/// Language-refset acceptability: acceptable.
pub const ACCEPTABLE_ACCEPTABILITY: SctId = 900000000000549004;

/// Presence of this concept in the source marks a test-data import and
/// rewrites the version URI from `/sct/` to `/xsct/`.
pub const TEST_DATA_MARKER: SctId = 31000003106;

/// Canonical SNOMED CT code-system URI.
pub const SNOMED_URI: &str = "http://snomed.info/sct";

/// Returns true if a relationship with this characteristic type contributes
/// to the logical definition of its source concept.
pub fn is_defining_characteristic(characteristic: SctId) -> bool {
    characteristic == DEFINING_CHARACTERISTIC
        || characteristic == STATED_CHARACTERISTIC
        || characteristic == INFERRED_CHARACTERISTIC
}

// ─── Term tokenisation ───────────────────────────────────────────────

/// Tokenize a description term into lowercase words for the word/stem index.
///
/// Splits on the description separator class, drops purely-numeric tokens
/// and tokens shorter than three characters, and lowercases the rest.
///
/// # Examples
///
/// ```
/// use snomed::tokenize;
///
/// let words = tokenize("Tetralogy of Fallot (disorder)");
/// assert_eq!(words, vec!["tetralogy", "fallot", "disorder"]);
/// ```
pub fn tokenize(term: &str) -> Vec<String> {
    term.split(is_term_separator)
        .filter(|w| w.chars().count() > 2)
        .filter(|w| !w.chars().all(|c| c.is_ascii_digit()))
        .map(|w| w.to_lowercase())
        .collect()
}

/// The separator class for description terms. Everything here splits words;
/// apostrophes and accented letters do not.
fn is_term_separator(c: char) -> bool {
    c.is_whitespace()
        || matches!(
            c,
            ',' | ':'
                | '.'
                | '!'
                | '@'
                | '#'
                | '$'
                | '%'
                | '^'
                | '&'
                | '*'
                | '('
                | ')'
                | '{'
                | '}'
                | '['
                | ']'
                | '|'
                | '\\'
                | ';'
                | '"'
                | '<'
                | '>'
                | '?'
                | '/'
                | '~'
                | '`'
                | '-'
                | '_'
                | '+'
                | '='
        )
}


// ─── Property-based tests (proptest) ─────────────────────────────────
