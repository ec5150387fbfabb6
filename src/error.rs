//! Unified error type for the terminology core.

use thiserror::Error;

use crate::SctId;

/// All errors that can occur during import or query.
///
/// "Not found" on an ordinary lookup is not an error; [`crate::provider`]
/// returns result objects with an optional message for that. These variants
/// cover structural failures, invalid input, and resource exhaustion.
#[derive(Error, Debug)]
pub enum SnomedError {
    /// I/O error (RF2 read, cache file read/write)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A single RF2 row that could not be parsed
    #[error("{file}:{line}: invalid RF2 row: {message}")]
    InvalidRf2 {
        file: String,
        line: usize,
        message: String,
    },

    /// An effectiveTime outside the 16-bit day range (1899-12-30 .. 2079)
    #[error("effective time '{date}' is outside the supported date range")]
    BadDate { date: String },

    /// The same SCTID appeared twice in the concept input
    #[error(
        "duplicate concept {id} in input; import requires the snapshot release, not the full edition"
    )]
    DuplicateConcept { id: SctId },

    /// An is-a cycle was found while building the closure
    #[error("is-a cycle detected through concept {id}")]
    CycleDetected { id: SctId },

    /// The hierarchy is deeper than 255 levels
    #[error("hierarchy depth exceeds 255 at concept {id}")]
    DepthOverflow { id: SctId },

    /// A structurally required concept is missing from the concept table
    #[error("concept {id} required by {referrer} is not in the concept table")]
    MissingConcept { id: SctId, referrer: &'static str },

    /// The source tree has no usable active root concept
    #[error("no active root concept found in the source")]
    NoActiveRoot,

    /// A cache file that cannot be read back
    #[error("bad cache file {path}: {message}")]
    BadCacheFile { path: String, message: String },

    /// A compositional-grammar expression that does not parse
    #[error("invalid expression '{expression}' at offset {offset}: {message}")]
    BadExpression {
        expression: String,
        offset: usize,
        message: String,
    },

    /// Invalid regex in a code filter
    #[error("invalid regex '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A code that must resolve for the operation to proceed (ordinary
    /// lookups report this through result objects instead)
    #[error("code '{code}' is not a known SNOMED CT concept")]
    NotFound { code: String },

    /// A filter property/op/value combination the provider cannot honour
    #[error("filter not supported: {0}")]
    NotSupported(String),

    /// An operation exceeded its wall-clock or size budget
    #[error("operation too costly: {0}")]
    TooCostly(String),

    /// The caller cancelled the operation
    #[error("cancelled during {0}")]
    Cancelled(String),

    /// Invalid import configuration
    #[error("invalid configuration: {0}")]
    BadConfig(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SnomedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_concept_hints_snapshot() {
        let err = SnomedError::DuplicateConcept { id: 64572001 };
        let msg = err.to_string();
        assert!(msg.contains("64572001"));
        assert!(msg.contains("snapshot"));
    }

    #[test]
    fn test_invalid_rf2_display() {
        let err = SnomedError::InvalidRf2 {
            file: "sct2_Concept_Snapshot.txt".to_string(),
            line: 42,
            message: "expected 5 columns, found 3".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("sct2_Concept_Snapshot.txt:42"));
        assert!(msg.contains("5 columns"));
    }

    #[test]
    fn test_io_error_from_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: SnomedError = io_err.into();
        assert!(matches!(err, SnomedError::Io(_)));
    }

    #[test]
    fn test_bad_expression_display() {
        let err = SnomedError::BadExpression {
            expression: "128045006:".to_string(),
            offset: 10,
            message: "expected refinement".to_string(),
        };
        assert!(err.to_string().contains("offset 10"));
    }
}
