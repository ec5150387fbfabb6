//! Shared test fixture: a small synthetic RF2 snapshot written to a temp
//! directory and run through the full import pipeline.
//!
//! The hierarchy is a miniature of the real edition: a root, a clinical
//! finding branch with diseases under it, an unrelated branch, body
//! structures, the attribute and description-type metadata, one simple
//! refset and one language refset. Concept and description identifiers are
//! real SNOMED CT codes so end-to-end scenarios read naturally.

use std::path::Path;
use std::sync::Arc;

use crate::cache::ConceptCache;
use crate::cancel::CancelToken;
use crate::config::{ImportConfig, international_defaults};
use crate::import::{ImportStats, import_to_cache};
use crate::provider::SnomedProvider;

/// SCTIDs used across the test suites.
pub(crate) mod ids {
    use crate::SctId;

    pub const ROOT: SctId = 138875005;
    pub const CLINICAL_FINDING: SctId = 404684003;
    pub const DISEASE: SctId = 64572001;
    pub const DIABETES: SctId = 73211009;
    pub const GESTATIONAL_DIABETES: SctId = 11687002;
    pub const TETRALOGY: SctId = 86299006;
    pub const CELLULITIS: SctId = 128045006;
    pub const FITNESS: SctId = 303248007;
    pub const FOOT: SctId = 56459004;
    pub const ENDOCRINE: SctId = 113331007;
    pub const FINDING_SITE: SctId = 363698007;
    pub const SIMPLE_REFSET: SctId = 723264001;
    pub const LANGUAGE_REFSET: SctId = 900000000000509007;
    pub const INACTIVE_DISORDER: SctId = 95320005;
    pub const MODULE: SctId = 900000000000207008;

    /// Description id of the preferred "Diabetes" synonym.
    pub const DIABETES_SYNONYM_DESC: SctId = 2771362011;
}

pub(crate) struct Fixture {
    /// Keeps the RF2 tree and cache file alive for the test's duration.
    #[allow(dead_code)]
    pub dir: tempfile::TempDir,
    pub config: ImportConfig,
    pub stats: ImportStats,
    pub cache: Arc<ConceptCache>,
}

impl Fixture {
    pub fn provider(&self) -> SnomedProvider {
        SnomedProvider::new(self.cache.clone())
    }
}

/// Build the snapshot, import it, and hand back the live cache.
pub(crate) fn fixture() -> Fixture {
    let dir = tempfile::tempdir().expect("create fixture dir");
    write_snapshot(dir.path());
    let config = international_defaults(dir.path(), &dir.path().join("cache"));
    let (stats, cache) =
        import_to_cache(&config, &CancelToken::new()).expect("fixture import succeeds");
    Fixture {
        dir,
        config,
        stats,
        cache: Arc::new(cache),
    }
}

/// Write the RF2 files without importing; used by importer failure tests
/// that mutate individual files first.
pub(crate) fn write_snapshot(root: &Path) {
    let terminology = root.join("Snapshot").join("Terminology");
    let refset_content = root.join("Snapshot").join("Refset").join("Content");
    let refset_language = root.join("Snapshot").join("Refset").join("Language");
    std::fs::create_dir_all(&terminology).unwrap();
    std::fs::create_dir_all(&refset_content).unwrap();
    std::fs::create_dir_all(&refset_language).unwrap();

    std::fs::write(
        terminology.join("sct2_Concept_Snapshot_INT_20240201.txt"),
        concepts_file(),
    )
    .unwrap();
    std::fs::write(
        terminology.join("sct2_Description_Snapshot-en_INT_20240201.txt"),
        descriptions_file(),
    )
    .unwrap();
    std::fs::write(
        terminology.join("sct2_TextDefinition_Snapshot-en_INT_20240201.txt"),
        text_definitions_file(),
    )
    .unwrap();
    std::fs::write(
        terminology.join("sct2_Relationship_Snapshot_INT_20240201.txt"),
        relationships_file(),
    )
    .unwrap();
    // Excluded by name; its bogus row would wreck the hierarchy if read.
    std::fs::write(
        terminology.join("sct2_StatedRelationship_Snapshot_INT_20240201.txt"),
        stated_relationships_file(),
    )
    .unwrap();
    std::fs::write(
        refset_content.join("der2_Refset_SimpleSnapshot_INT_20240201.txt"),
        simple_refset_file(),
    )
    .unwrap();
    std::fs::write(
        refset_language.join("der2_cRefset_LanguageSnapshot-en_INT_20240201.txt"),
        language_refset_file(),
    )
    .unwrap();
}

const DATE: &str = "20240201";
const MODULE: &str = "900000000000207008";
const PRIMITIVE: &str = "900000000000074008";
const CASE: &str = "900000000000448009";
const FSN: &str = "900000000000003001";
const SYNONYM: &str = "900000000000013009";
const DEFINITION: &str = "900000000000550004";
const INFERRED: &str = "900000000000006009";
const MODIFIER: &str = "900000000000451002";
const PREFERRED: &str = "900000000000548007";

fn concepts_file() -> String {
    let mut out = String::from("id\teffectiveTime\tactive\tmoduleId\tdefinitionStatusId\r\n");
    let concepts: &[(&str, u8)] = &[
        ("138875005", 1),
        ("404684003", 1),
        ("64572001", 1),
        ("73211009", 1),
        ("11687002", 1),
        ("86299006", 1),
        ("128045006", 1),
        ("303248007", 1),
        ("56459004", 1),
        ("113331007", 1),
        ("363698007", 1),
        ("723264001", 1),
        ("116680003", 1),
        ("95320005", 0),
        ("900000000000003001", 1),
        ("900000000000013009", 1),
        ("900000000000207008", 1),
        ("900000000000448009", 1),
        ("900000000000509007", 1),
        ("900000000000548007", 1),
        ("900000000000549004", 1),
        ("900000000000550004", 1),
    ];
    for (id, active) in concepts {
        out.push_str(&format!("{id}\t{DATE}\t{active}\t{MODULE}\t{PRIMITIVE}\r\n"));
    }
    out
}

fn descriptions_file() -> String {
    let mut out = String::from(
        "id\teffectiveTime\tactive\tmoduleId\tconceptId\tlanguageCode\ttypeId\tterm\tcaseSignificanceId\r\n",
    );
    let rows: &[(&str, u8, &str, &str, &str)] = &[
        // (description id, active, concept, type, term)
        ("680946011", 1, "138875005", FSN, "SNOMED CT Concept (SNOMED RT+CTV3)"),
        ("680947019", 1, "138875005", SYNONYM, "SNOMED CT Concept"),
        ("751689013", 1, "404684003", FSN, "Clinical finding (finding)"),
        ("751690016", 1, "404684003", SYNONYM, "Clinical finding"),
        ("2148514019", 1, "64572001", FSN, "Disease (disorder)"),
        ("121589010", 1, "73211009", FSN, "Diabetes mellitus (disorder)"),
        ("2771362011", 1, "73211009", SYNONYM, "Diabetes"),
        ("190416013", 1, "11687002", FSN, "Gestational diabetes mellitus (disorder)"),
        ("190417016", 1, "11687002", SYNONYM, "Gestational diabetes"),
        ("143123010", 1, "86299006", FSN, "Tetralogy of Fallot (disorder)"),
        ("143124016", 1, "86299006", SYNONYM, "Tetralogy of Fallot"),
        ("143125015", 0, "86299006", SYNONYM, "Steno-Fallot tetralogy"),
        ("212962015", 1, "128045006", FSN, "Cellulitis (disorder)"),
        ("212963013", 1, "128045006", SYNONYM, "Cellulitis"),
        ("94234014", 1, "56459004", FSN, "Foot structure (body structure)"),
        ("94235010", 1, "56459004", SYNONYM, "Foot structure"),
        ("188192011", 1, "113331007", FSN, "Structure of endocrine system (body structure)"),
        ("449406017", 1, "303248007", FSN, "Cardiovascular fitness (observable entity)"),
        ("544618016", 1, "363698007", FSN, "Finding site (attribute)"),
        ("544619012", 1, "363698007", SYNONYM, "Finding site"),
        ("3513578013", 1, "723264001", FSN, "Lateralizable body structure reference set (foundation metadata concept)"),
        ("3513579017", 1, "723264001", SYNONYM, "Lateralizable body structure reference set"),
        ("1225312015", 1, "900000000000509007", SYNONYM, "US English"),
        ("153562019", 1, "95320005", FSN, "Disorder of soft tissue (disorder)"),
    ];
    for (id, active, concept, kind, term) in rows {
        out.push_str(&format!(
            "{id}\t{DATE}\t{active}\t{MODULE}\t{concept}\ten\t{kind}\t{term}\t{CASE}\r\n"
        ));
    }
    out
}

fn text_definitions_file() -> String {
    let mut out = String::from(
        "id\teffectiveTime\tactive\tmoduleId\tconceptId\tlanguageCode\ttypeId\tterm\tcaseSignificanceId\r\n",
    );
    out.push_str(&format!(
        "2971206011\t{DATE}\t1\t{MODULE}\t73211009\ten\t{DEFINITION}\tA metabolic disorder of glucose regulation.\t{CASE}\r\n"
    ));
    out
}

fn relationships_file() -> String {
    let mut out = String::from(
        "id\teffectiveTime\tactive\tmoduleId\tsourceId\tdestinationId\trelationshipGroup\ttypeId\tcharacteristicTypeId\tmodifierId\r\n",
    );
    let is_a_rows: &[(&str, &str)] = &[
        ("404684003", "138875005"),
        ("64572001", "404684003"),
        ("73211009", "64572001"),
        ("11687002", "73211009"),
        ("86299006", "64572001"),
        ("128045006", "64572001"),
        ("303248007", "138875005"),
        ("56459004", "138875005"),
        ("113331007", "138875005"),
        ("363698007", "138875005"),
        ("723264001", "138875005"),
        ("116680003", "138875005"),
        ("900000000000003001", "138875005"),
        ("900000000000013009", "138875005"),
        ("900000000000207008", "138875005"),
        ("900000000000448009", "138875005"),
        ("900000000000509007", "138875005"),
        ("900000000000548007", "138875005"),
        ("900000000000549004", "138875005"),
        ("900000000000550004", "138875005"),
    ];
    let mut rel_id = 3_000_000_021u64;
    for (source, target) in is_a_rows {
        out.push_str(&format!(
            "{rel_id}\t{DATE}\t1\t{MODULE}\t{source}\t{target}\t0\t116680003\t{INFERRED}\t{MODIFIER}\r\n"
        ));
        rel_id += 10;
    }
    // Attribute relationships: ungrouped for diabetes, group 1 for
    // cellulitis.
    out.push_str(&format!(
        "3100000026\t{DATE}\t1\t{MODULE}\t73211009\t113331007\t0\t363698007\t{INFERRED}\t{MODIFIER}\r\n"
    ));
    out.push_str(&format!(
        "3100000033\t{DATE}\t1\t{MODULE}\t128045006\t56459004\t1\t363698007\t{INFERRED}\t{MODIFIER}\r\n"
    ));
    // Retired is-a keeps the inactive disorder out of the live hierarchy.
    out.push_str(&format!(
        "3100000045\t{DATE}\t0\t{MODULE}\t95320005\t64572001\t0\t116680003\t{INFERRED}\t{MODIFIER}\r\n"
    ));
    out
}

fn stated_relationships_file() -> String {
    let mut out = String::from(
        "id\teffectiveTime\tactive\tmoduleId\tsourceId\tdestinationId\trelationshipGroup\ttypeId\tcharacteristicTypeId\tmodifierId\r\n",
    );
    // If this file were imported, Foot structure would become a disease.
    out.push_str(&format!(
        "3900000011\t{DATE}\t1\t{MODULE}\t56459004\t64572001\t0\t116680003\t900000000000010007\t{MODIFIER}\r\n"
    ));
    out
}

fn simple_refset_file() -> String {
    let mut out =
        String::from("id\teffectiveTime\tactive\tmoduleId\trefsetId\treferencedComponentId\r\n");
    out.push_str(&format!(
        "800aa109-64a9-4d7d-9ce9-a9ae128b8bd1\t{DATE}\t1\t{MODULE}\t723264001\t56459004\r\n"
    ));
    // Retired membership must not surface.
    out.push_str(&format!(
        "800aa109-64a9-4d7d-9ce9-a9ae128b8bd2\t{DATE}\t0\t{MODULE}\t723264001\t113331007\r\n"
    ));
    out
}

fn language_refset_file() -> String {
    let mut out = String::from(
        "id\teffectiveTime\tactive\tmoduleId\trefsetId\treferencedComponentId\tacceptabilityId\r\n",
    );
    // The "Diabetes" synonym is the preferred US English term.
    out.push_str(&format!(
        "91d2b05e-3b5f-4a35-8be6-c0bb0d13a1c4\t{DATE}\t1\t{MODULE}\t900000000000509007\t2771362011\t{PREFERRED}\r\n"
    ));
    out
}
