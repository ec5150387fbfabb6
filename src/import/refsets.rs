//! Phases 13..16: reference sets.
//!
//! 13 reads every refset file into per-refset builders (a single file may
//! carry rows for several refsets); 14 sorts the refsets and materialises
//! the two member orderings; 15 interns titles and filenames and appends
//! the index rows; 16 back-indexes memberships onto concepts and
//! descriptions.

use std::collections::BTreeMap;
use std::time::Instant;

use tracing::warn;

use crate::SctId;
use crate::error::Result;
use crate::lang::Language;
use crate::rf2::{self, FieldType, RefsetRow, Rf2File, Rf2FileKind};
use crate::SYNONYM_TYPE;
use crate::store::{MemberKind, MemberRecord};

use super::{CANCEL_STRIDE, Import, building_display};

struct RefsetBuild {
    id: SctId,
    concept_offset: u32,
    filename: String,
    field_types: Vec<FieldType>,
    field_names: Vec<String>,
    langs: u64,
    members: Vec<MemberBuild>,
}

struct MemberBuild {
    kind: MemberKind,
    component: u32,
    module: u32,
    date: u16,
    guid: [u8; 16],
    values: u32,
}

pub(crate) fn run(import: &mut Import<'_>, files: &[Rf2File]) -> Result<()> {
    // ── phase 13: read refset files ──────────────────────────────────
    import.cancel.check("process reference sets")?;
    let start = Instant::now();
    let mut builds: BTreeMap<SctId, RefsetBuild> = BTreeMap::new();
    let mut rows = 0usize;
    for file in files {
        let Rf2FileKind::Refset { language, ref field_types } = file.kind else {
            continue;
        };
        rows += read_refset_file(import, file, language, field_types, &mut builds)?;
    }
    import.strings.freeze();
    import.finish_phase("process reference sets", start, rows);

    // ── phase 14: sort and build member arrays ───────────────────────
    let start = Instant::now();
    let mut builds: Vec<RefsetBuild> = builds.into_values().collect();
    builds.sort_by_key(|b| b.concept_offset);

    let mut arrays: Vec<(u32, u32)> = Vec::with_capacity(builds.len());
    for build in &builds {
        import.cancel.check("sort reference sets")?;
        let pure_descriptions = build
            .members
            .iter()
            .all(|m| m.kind == MemberKind::Description);

        let mut by_name: Vec<&MemberBuild> = build.members.iter().collect();
        by_name.sort_by_cached_key(|m| member_display(import, m));
        let by_name_records: Vec<MemberRecord> =
            by_name.iter().map(|m| to_record(m, false)).collect();

        let mut by_ref: Vec<&MemberBuild> = build.members.iter().collect();
        by_ref.sort_by_key(|m| m.component);
        // GUIDs are recoverable from the by-name copy, so the by-ref copy
        // of a pure description refset drops them.
        let by_ref_records: Vec<MemberRecord> = by_ref
            .iter()
            .map(|m| to_record(m, pure_descriptions))
            .collect();

        let by_name_offset = import.refset_members.add_members(&by_name_records);
        let by_ref_offset = import.refset_members.add_members(&by_ref_records);
        arrays.push((by_name_offset, by_ref_offset));
    }
    import.finish_phase("sort reference sets", start, builds.len());

    // ── phase 15: index rows ─────────────────────────────────────────
    let start = Instant::now();
    import.strings.reopen();
    for (build, &(by_name, by_ref)) in builds.iter().zip(&arrays) {
        let title = refset_title(import, build);
        let title_offset = import.strings.add(&title);
        let filename_offset = import.strings.add(&build.filename);
        let type_codes: Vec<u32> = build.field_types.iter().map(|t| t.code()).collect();
        let field_types = if type_codes.is_empty() {
            0
        } else {
            import.refs.add(&type_codes)
        };
        let name_offsets: Vec<u32> = build
            .field_names
            .iter()
            .map(|n| import.strings.add(n))
            .collect();
        let field_names = if name_offsets.is_empty() {
            0
        } else {
            import.refs.add(&name_offsets)
        };
        import.refset_index.add(
            title_offset,
            filename_offset,
            build.concept_offset,
            by_name,
            by_ref,
            field_types,
            field_names,
            build.langs,
        );
    }
    import.strings.freeze();
    import.finish_phase("add refsets to index", start, builds.len());

    // ── phase 16: back-index memberships ─────────────────────────────
    let start = Instant::now();
    let mut concept_pairs: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
    let mut desc_memberships: BTreeMap<u32, (Vec<u32>, Vec<u32>)> = BTreeMap::new();
    for build in &builds {
        for member in &build.members {
            match member.kind {
                MemberKind::Concept => {
                    let pairs = concept_pairs.entry(member.component).or_default();
                    pairs.push(build.concept_offset);
                    pairs.push(member.values);
                }
                MemberKind::Description => {
                    let (refsets, values) =
                        desc_memberships.entry(member.component).or_default();
                    refsets.push(build.concept_offset);
                    values.push(member.values);
                }
                _ => {}
            }
        }
    }
    let touched = concept_pairs.len() + desc_memberships.len();
    for (concept, pairs) in concept_pairs {
        let refs = import.refs.add(&pairs);
        import.concepts.set_refsets(concept, refs);
    }
    for (desc, (refsets, values)) in desc_memberships {
        let refsets = import.refs.add(&refsets);
        let values = import.refs.add(&values);
        import.descriptions.set_refsets(desc, refsets);
        import.descriptions.set_values(desc, values);
    }
    import.finish_phase("index refset members", start, touched);
    Ok(())
}

fn read_refset_file(
    import: &mut Import<'_>,
    file: &Rf2File,
    language: bool,
    field_types: &[FieldType],
    builds: &mut BTreeMap<SctId, RefsetBuild>,
) -> Result<usize> {
    let file_name = file
        .path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut count = 0usize;
    for (line_no, line) in rf2::read_lines(&file.path)?.iter().enumerate() {
        if line_no % CANCEL_STRIDE == 0 {
            import.cancel.check("process reference sets")?;
        }
        let row = match RefsetRow::parse(line) {
            Ok(row) => row,
            Err(e) => {
                warn!(file = %file_name, line = line_no + 2, error = %e, "skipping refset row");
                continue;
            }
        };
        // Retired members carry no membership.
        if !row.active {
            continue;
        }
        let Some(refset_concept) = import.concepts.find(row.refset) else {
            warn!(file = %file_name, refset = row.refset, "refset concept missing from concept table; row skipped");
            continue;
        };

        let (kind, component) = resolve_component(import, row.component);
        if kind == MemberKind::Other && component == 0 {
            warn!(file = %file_name, component = row.component, "referenced component not found; member kept as 'other'");
        }
        let module = import.concepts.find(row.module).unwrap_or(0);
        let values = decode_values(import, &row, field_types);

        let build = builds.entry(row.refset).or_insert_with(|| RefsetBuild {
            id: row.refset,
            concept_offset: refset_concept,
            filename: file_name.clone(),
            field_types: field_types.to_vec(),
            field_names: file.field_names.clone(),
            langs: 0,
            members: Vec::new(),
        });
        if language && kind == MemberKind::Description {
            let lang = Language::from_code(import.descriptions.lang(component));
            build.langs |= lang.bit();
        }
        build.members.push(MemberBuild {
            kind,
            component,
            module,
            date: row.date,
            guid: row.guid,
            values,
        });
        count += 1;
    }
    Ok(count)
}

/// A referenced component is a concept, a description, or (rarely)
/// something else we hold no index for.
fn resolve_component(import: &Import<'_>, id: SctId) -> (MemberKind, u32) {
    if let Some(offset) = import.concepts.find(id) {
        (MemberKind::Concept, offset)
    } else if let Some(offset) = import.find_description(id) {
        (MemberKind::Description, offset)
    } else {
        (MemberKind::Other, 0)
    }
}

/// Decode typed extra columns per the filename signature. Columns beyond
/// the signature are kept as strings.
fn decode_values(import: &mut Import<'_>, row: &RefsetRow, field_types: &[FieldType]) -> u32 {
    if row.extra.is_empty() {
        return 0;
    }
    let mut values = Vec::with_capacity(row.extra.len());
    for (i, column) in row.extra.iter().enumerate() {
        let field_type = field_types.get(i).copied().unwrap_or(FieldType::String);
        let value = match field_type {
            FieldType::Concept => rf2::parse_sctid(column)
                .and_then(|id| import.concepts.find(id))
                .unwrap_or(0),
            FieldType::Integer => column.parse().unwrap_or(0),
            FieldType::String => import.strings.add(column),
        };
        values.push(value);
    }
    import.refs.add(&values)
}

fn to_record(member: &MemberBuild, drop_guid: bool) -> MemberRecord {
    MemberRecord {
        kind: member.kind,
        component: member.component,
        module: member.module,
        date: member.date,
        values: member.values,
        guid: if drop_guid { [0u8; 16] } else { member.guid },
    }
}

/// Display text used to order members: the description's own term, or the
/// referenced concept's display.
fn member_display(import: &Import<'_>, member: &MemberBuild) -> String {
    match member.kind {
        MemberKind::Description => import
            .strings
            .get(import.descriptions.term(member.component))
            .to_string(),
        MemberKind::Concept => display_of(import, member.component),
        _ => String::new(),
    }
}

fn refset_title(import: &Import<'_>, build: &RefsetBuild) -> String {
    let title = display_of(import, build.concept_offset);
    if title.is_empty() {
        build.id.to_string()
    } else {
        title
    }
}

fn display_of(import: &Import<'_>, concept_offset: u32) -> String {
    let synonym_kind = import.concepts.find(SYNONYM_TYPE).unwrap_or(0);
    building_display(
        &import.concepts,
        &import.descriptions,
        &import.refs,
        &import.strings,
        concept_offset,
        synonym_kind,
    )
}
