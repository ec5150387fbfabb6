//! RF2 source-tree discovery.
//!
//! Files are classified by reading the first header line; reference sets
//! are recognised by their directory ancestry. StatedRelationship files are
//! excluded; the cache is built from inferred relationships only.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use tracing::{info, warn};

use crate::error::Result;

// ─── Classification ──────────────────────────────────────────────────

/// Declared type of a refset's extra column, from the filename signature
/// (`c` = concept, `i` = integer, `s` = string). The numeric codes are what
/// the cache stores in a refset's field-types list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FieldType {
    Concept = 1,
    Integer = 2,
    String = 3,
}

impl FieldType {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<FieldType> {
        match code {
            1 => Some(FieldType::Concept),
            2 => Some(FieldType::Integer),
            3 => Some(FieldType::String),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rf2FileKind {
    Concepts,
    Descriptions,
    Relationships,
    Refset {
        /// Under a directory whose name contains "language": members mark
        /// per-language preferred/acceptable descriptions.
        language: bool,
        field_types: Vec<FieldType>,
    },
}

#[derive(Debug, Clone)]
pub struct Rf2File {
    pub path: PathBuf,
    pub kind: Rf2FileKind,
    /// Header columns after the six fixed refset columns; empty for core
    /// files.
    pub field_names: Vec<String>,
}

// ─── Discovery ───────────────────────────────────────────────────────

/// Walk the source tree and classify every RF2 file found.
pub fn discover(root: &Path) -> Result<Vec<Rf2File>> {
    let mut files = Vec::new();
    for entry in WalkBuilder::new(root).hidden(true).build() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let path = entry.path();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if name.contains("StatedRelationship") {
            // Inferred relationships only.
            continue;
        }
        if let Some(file) = classify(root, path, &name)? {
            files.push(file);
        }
    }
    info!(count = files.len(), root = %root.display(), "classified RF2 files");
    Ok(files)
}

fn classify(root: &Path, path: &Path, name: &str) -> Result<Option<Rf2File>> {
    let header = match read_header(path) {
        Ok(Some(h)) => h,
        Ok(None) => return Ok(None),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "skipping unreadable file");
            return Ok(None);
        }
    };
    let columns: Vec<&str> = header.split('\t').collect();

    if under_refset_dir(root, path) || is_refset_header(&columns) {
        let field_types = parse_field_types(name);
        let field_names = columns
            .iter()
            .skip(6)
            .map(|c| c.to_string())
            .collect::<Vec<_>>();
        if field_types.len() != field_names.len() {
            warn!(
                path = %path.display(),
                declared = field_types.len(),
                found = field_names.len(),
                "refset filename signature does not match header; using header count"
            );
        }
        return Ok(Some(Rf2File {
            path: path.to_path_buf(),
            kind: Rf2FileKind::Refset {
                language: is_language_refset(root, path, name),
                field_types,
            },
            field_names,
        }));
    }

    let kind = if header.starts_with("id\teffectiveTime\tactive\tmoduleId\tdefinitionStatusId") {
        Rf2FileKind::Concepts
    } else if columns.contains(&"conceptId")
        && columns.contains(&"languageCode")
        && columns.contains(&"typeId")
        && columns.contains(&"term")
    {
        Rf2FileKind::Descriptions
    } else if columns.contains(&"sourceId")
        && columns.contains(&"destinationId")
        && columns.contains(&"relationshipGroup")
    {
        Rf2FileKind::Relationships
    } else {
        return Ok(None);
    };

    Ok(Some(Rf2File {
        path: path.to_path_buf(),
        kind,
        field_names: Vec::new(),
    }))
}

/// First line of the file, or None for an empty file.
fn read_header(path: &Path) -> std::io::Result<Option<String>> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

/// True if any directory between the source root and the file is named
/// `Refset` / `Reference Sets` (any case).
fn under_refset_dir(root: &Path, path: &Path) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .parent()
        .map(|parent| {
            parent.components().any(|c| {
                let dir = c.as_os_str().to_string_lossy().to_lowercase();
                dir.contains("refset") || dir.contains("reference set")
            })
        })
        .unwrap_or(false)
}

fn is_refset_header(columns: &[&str]) -> bool {
    columns.contains(&"refsetId") && columns.contains(&"referencedComponentId")
}

/// Language refsets live under a directory (or carry a filename) containing
/// "language".
fn is_language_refset(root: &Path, path: &Path, name: &str) -> bool {
    if name.to_lowercase().contains("language") {
        return true;
    }
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .parent()
        .map(|parent| {
            parent
                .components()
                .any(|c| c.as_os_str().to_string_lossy().to_lowercase().contains("language"))
        })
        .unwrap_or(false)
}

/// Extract the field-type signature from the filename component preceding
/// `Refset`: "der2_cRefset_Language..." declares one concept field,
/// "der2_iissscRefset_..." two integers, three strings and a concept.
fn parse_field_types(name: &str) -> Vec<FieldType> {
    let Some(at) = name.find("Refset") else {
        return Vec::new();
    };
    let prefix = &name[..at];
    let signature = match prefix.rfind('_') {
        Some(underscore) => &prefix[underscore + 1..],
        None => prefix,
    };
    signature
        .chars()
        .filter_map(|c| match c {
            'c' => Some(FieldType::Concept),
            'i' => Some(FieldType::Integer),
            's' => Some(FieldType::String),
            _ => None,
        })
        .collect()
}
