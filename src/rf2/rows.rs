//! RF2 row parsing and date conversion.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::SctId;
use crate::error::{Result, SnomedError};

// ─── Line reading ────────────────────────────────────────────────────

/// Read all data lines of an RF2 file, skipping the header row. Handles
/// both LF and CRLF endings; empty lines are dropped.
pub fn read_lines(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut lines = Vec::new();
    for line in reader.lines().skip(1) {
        let line = line?;
        let line = line.strip_suffix('\r').unwrap_or(&line);
        if !line.is_empty() {
            lines.push(line.to_string());
        }
    }
    Ok(lines)
}

// ─── Field parsing ───────────────────────────────────────────────────

pub fn parse_sctid(field: &str) -> Option<SctId> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}

/// The RF2 `active` column: "1" or "0".
pub fn parse_active(field: &str) -> Option<bool> {
    match field {
        "1" => Some(true),
        "0" => Some(false),
        _ => None,
    }
}

// ─── Date conversion ─────────────────────────────────────────────────

/// Day serial of 1899-12-30 relative to the Unix epoch.
const EPOCH_OFFSET: i64 = 25_569;

/// Convert an RF2 effectiveTime (YYYYMMDD) into days since 1899-12-30.
///
/// The record field is 16 bits, which covers 1899-12-30 through mid-2079;
/// anything outside that range is a fatal import error. An empty field
/// (seen in some historical releases) maps to day 0.
pub fn effective_days(date: &str) -> Result<u16> {
    if date.is_empty() {
        return Ok(0);
    }
    let bad = || SnomedError::BadDate {
        date: date.to_string(),
    };
    if date.len() != 8 || !date.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad());
    }
    let year: i64 = date[0..4].parse().map_err(|_| bad())?;
    let month: u32 = date[4..6].parse().map_err(|_| bad())?;
    let day: u32 = date[6..8].parse().map_err(|_| bad())?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return Err(bad());
    }
    let serial = days_from_civil(year, month, day) + EPOCH_OFFSET;
    u16::try_from(serial).map_err(|_| bad())
}

/// Days since 1970-01-01 for a proleptic Gregorian date
/// (Howard Hinnant's civil-days algorithm).
fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let mp = (month as i64 + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day as i64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

// ─── Typed rows ──────────────────────────────────────────────────────

/// sct2_Concept: id, effectiveTime, active, moduleId, definitionStatusId.
#[derive(Debug, Clone)]
pub struct ConceptRow {
    pub id: SctId,
    pub date: u16,
    pub active: bool,
    pub module: SctId,
    pub definition_status: SctId,
}

impl ConceptRow {
    pub fn parse(line: &str) -> Result<ConceptRow> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 5 {
            return Err(row_error(format!("expected 5 columns, found {}", fields.len())));
        }
        Ok(ConceptRow {
            id: parse_sctid(fields[0]).ok_or_else(|| row_error("bad concept id".into()))?,
            date: effective_days(fields[1])?,
            active: parse_active(fields[2]).ok_or_else(|| row_error("bad active flag".into()))?,
            module: parse_sctid(fields[3]).ok_or_else(|| row_error("bad moduleId".into()))?,
            definition_status: parse_sctid(fields[4])
                .ok_or_else(|| row_error("bad definitionStatusId".into()))?,
        })
    }
}

/// sct2_Description: id, effectiveTime, active, moduleId, conceptId,
/// languageCode, typeId, term, caseSignificanceId.
#[derive(Debug, Clone)]
pub struct DescriptionRow {
    pub id: SctId,
    pub date: u16,
    pub active: bool,
    pub module: SctId,
    pub concept: SctId,
    pub language: String,
    pub type_id: SctId,
    pub term: String,
    pub case_significance: SctId,
}

impl DescriptionRow {
    pub fn parse(line: &str) -> Result<DescriptionRow> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 9 {
            return Err(row_error(format!("expected 9 columns, found {}", fields.len())));
        }
        Ok(DescriptionRow {
            id: parse_sctid(fields[0]).ok_or_else(|| row_error("bad description id".into()))?,
            date: effective_days(fields[1])?,
            active: parse_active(fields[2]).ok_or_else(|| row_error("bad active flag".into()))?,
            module: parse_sctid(fields[3]).ok_or_else(|| row_error("bad moduleId".into()))?,
            concept: parse_sctid(fields[4]).ok_or_else(|| row_error("bad conceptId".into()))?,
            language: fields[5].to_string(),
            type_id: parse_sctid(fields[6]).ok_or_else(|| row_error("bad typeId".into()))?,
            term: fields[7].to_string(),
            case_significance: parse_sctid(fields[8])
                .ok_or_else(|| row_error("bad caseSignificanceId".into()))?,
        })
    }
}

/// sct2_Relationship: id, effectiveTime, active, moduleId, sourceId,
/// destinationId, relationshipGroup, typeId, characteristicTypeId,
/// modifierId.
#[derive(Debug, Clone)]
pub struct RelationshipRow {
    pub id: SctId,
    pub date: u16,
    pub active: bool,
    pub source: SctId,
    pub destination: SctId,
    pub group: u32,
    pub type_id: SctId,
    pub characteristic: SctId,
}

impl RelationshipRow {
    pub fn parse(line: &str) -> Result<RelationshipRow> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 10 {
            return Err(row_error(format!("expected 10 columns, found {}", fields.len())));
        }
        Ok(RelationshipRow {
            id: parse_sctid(fields[0]).ok_or_else(|| row_error("bad relationship id".into()))?,
            date: effective_days(fields[1])?,
            active: parse_active(fields[2]).ok_or_else(|| row_error("bad active flag".into()))?,
            source: parse_sctid(fields[4]).ok_or_else(|| row_error("bad sourceId".into()))?,
            destination: parse_sctid(fields[5])
                .ok_or_else(|| row_error("bad destinationId".into()))?,
            group: fields[6]
                .parse()
                .map_err(|_| row_error("bad relationshipGroup".into()))?,
            type_id: parse_sctid(fields[7]).ok_or_else(|| row_error("bad typeId".into()))?,
            characteristic: parse_sctid(fields[8])
                .ok_or_else(|| row_error("bad characteristicTypeId".into()))?,
        })
    }
}

/// der2 refset rows: id (GUID), effectiveTime, active, moduleId, refsetId,
/// referencedComponentId, then typed extra columns.
#[derive(Debug, Clone)]
pub struct RefsetRow {
    pub guid: [u8; 16],
    pub date: u16,
    pub active: bool,
    pub module: SctId,
    pub refset: SctId,
    pub component: SctId,
    pub extra: Vec<String>,
}

impl RefsetRow {
    pub fn parse(line: &str) -> Result<RefsetRow> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 6 {
            return Err(row_error(format!("expected 6+ columns, found {}", fields.len())));
        }
        Ok(RefsetRow {
            guid: parse_guid(fields[0]).ok_or_else(|| row_error("bad member GUID".into()))?,
            date: effective_days(fields[1])?,
            active: parse_active(fields[2]).ok_or_else(|| row_error("bad active flag".into()))?,
            module: parse_sctid(fields[3]).ok_or_else(|| row_error("bad moduleId".into()))?,
            refset: parse_sctid(fields[4]).ok_or_else(|| row_error("bad refsetId".into()))?,
            component: parse_sctid(fields[5])
                .ok_or_else(|| row_error("bad referencedComponentId".into()))?,
            extra: fields[6..].iter().map(|f| f.to_string()).collect(),
        })
    }
}

/// Parse a member id GUID ("xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx").
fn parse_guid(field: &str) -> Option<[u8; 16]> {
    let hex: String = field.chars().filter(|&c| c != '-').collect();
    if hex.len() != 32 {
        return None;
    }
    let mut out = [0u8; 16];
    for i in 0..16 {
        out[i] = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(out)
}

/// Row errors get file/line context added by the importer.
fn row_error(message: String) -> SnomedError {
    SnomedError::InvalidRf2 {
        file: String::new(),
        line: 0,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_days_epoch() {
        // 1900-01-01 is day 2 of the 1899-12-30 serial.
        assert_eq!(effective_days("19000101").unwrap(), 2);
    }

    #[test]
    fn test_effective_days_before_epoch_rejected() {
        assert!(matches!(
            effective_days("18991229"),
            Err(SnomedError::BadDate { .. })
        ));
    }

    #[test]
    fn test_effective_days_epoch_day_zero() {
        assert_eq!(effective_days("18991230").unwrap(), 0);
    }

    #[test]
    fn test_effective_days_known_serials() {
        // Spreadsheet serials for cross-checking the civil-days conversion.
        assert_eq!(effective_days("20020131").unwrap(), 37_287);
        assert_eq!(effective_days("20240201").unwrap(), 45_323);
    }

    #[test]
    fn test_effective_days_overflow_rejected() {
        assert!(effective_days("20800101").is_err());
    }

    #[test]
    fn test_effective_days_empty_is_zero() {
        assert_eq!(effective_days("").unwrap(), 0);
    }

    #[test]
    fn test_effective_days_malformed() {
        for bad in ["2024", "2024-02-01", "20241301", "20240100", "abcdefgh"] {
            assert!(effective_days(bad).is_err(), "accepted {bad}");
        }
    }

    #[test]
    fn test_concept_row_parse() {
        let row = ConceptRow::parse("64572001\t20020131\t1\t900000000000207008\t900000000000074008")
            .unwrap();
        assert_eq!(row.id, 64572001);
        assert!(row.active);
        assert_eq!(row.module, 900000000000207008);
    }

    #[test]
    fn test_concept_row_too_few_columns() {
        assert!(ConceptRow::parse("64572001\t20020131\t1").is_err());
    }

    #[test]
    fn test_description_row_parse() {
        let line = "2148514019\t20020131\t1\t900000000000207008\t64572001\ten\t900000000000003001\tDisease (disorder)\t900000000000448009";
        let row = DescriptionRow::parse(line).unwrap();
        assert_eq!(row.concept, 64572001);
        assert_eq!(row.language, "en");
        assert_eq!(row.term, "Disease (disorder)");
        assert_eq!(row.type_id, crate::FSN_TYPE);
    }

    #[test]
    fn test_relationship_row_parse() {
        let line = "3126871025\t20020131\t1\t900000000000207008\t86299006\t64572001\t0\t116680003\t900000000000011006\t900000000000451002";
        let row = RelationshipRow::parse(line).unwrap();
        assert_eq!(row.source, 86299006);
        assert_eq!(row.destination, 64572001);
        assert_eq!(row.type_id, crate::IS_A);
        assert_eq!(row.group, 0);
    }

    #[test]
    fn test_refset_row_parse() {
        let line = "80001087-c5f8-4d20-b974-f59df48aa6bd\t20020131\t1\t900000000000207008\t900000000000509007\t2148514019\t900000000000548007";
        let row = RefsetRow::parse(line).unwrap();
        assert_eq!(row.refset, 900000000000509007);
        assert_eq!(row.component, 2148514019);
        assert_eq!(row.extra, vec!["900000000000548007".to_string()]);
        assert_eq!(row.guid[0], 0x80);
        assert_eq!(row.guid[15], 0xbd);
    }

    #[test]
    fn test_guid_rejects_malformed() {
        assert!(parse_guid("not-a-guid").is_none());
        assert!(parse_guid("80001087c5f84d20b974f59df48aa6bd").is_some());
    }

    #[test]
    fn test_sctid_rejects_non_numeric() {
        assert_eq!(parse_sctid(""), None);
        assert_eq!(parse_sctid("12a"), None);
        assert_eq!(parse_sctid("64572001"), Some(64572001));
    }

    #[test]
    fn test_read_lines_handles_crlf() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("rows.txt");
        std::fs::write(&path, "id\teffectiveTime\r\n1\t20020131\r\n\r\n2\t20020131\n").unwrap();
        let lines = read_lines(&path).unwrap();
        assert_eq!(lines, vec!["1\t20020131", "2\t20020131"]);
    }
}
