//! Reference-set queries over the frozen cache.
//!
//! Membership probes are O(log n) against the by-ref member arrays; the
//! per-component back-index answers "which refsets hold this component"
//! without touching the member arrays at all. Language refsets drive the
//! preferred-term logic used by display.

use crate::PREFERRED_ACCEPTABILITY;
use crate::cache::ConceptCache;
use crate::lang::Language;
use crate::rf2::FieldType;
use crate::store::{MemberList, MemberRecord};

/// A typed extra-column value of a refset member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefsetFieldValue {
    /// Concept offset (0 when the referenced concept was absent).
    Concept(u32),
    Integer(u32),
    Text(String),
}

impl ConceptCache {
    /// Number of reference sets in the index.
    pub fn refset_count(&self) -> u32 {
        self.refset_index.count()
    }

    /// Index-record offset for the n-th refset, ascending by defining
    /// concept offset.
    pub fn refset_nth(&self, i: u32) -> u32 {
        self.refset_index.offset_of_nth(i)
    }

    /// Find a refset by its defining concept.
    pub fn refset_by_concept(&self, concept_offset: u32) -> Option<u32> {
        self.refset_index.find_by_concept(concept_offset)
    }

    pub fn refset_title(&self, row: u32) -> &str {
        self.strings.get(self.refset_index.title(row))
    }

    pub fn refset_filename(&self, row: u32) -> &str {
        self.strings.get(self.refset_index.filename(row))
    }

    /// Members ordered by the display text of the referenced component.
    pub fn refset_members_by_name(&self, row: u32) -> MemberList<'_> {
        self.refset_members.read(self.refset_index.members_by_name(row))
    }

    /// Members ordered by component offset; the probe order.
    pub fn refset_members_by_ref(&self, row: u32) -> MemberList<'_> {
        self.refset_members.read(self.refset_index.members_by_ref(row))
    }

    /// O(log n) membership probe.
    pub fn refset_member(&self, row: u32, component: u32) -> Option<MemberRecord> {
        self.refset_members_by_ref(row).find_by_component(component)
    }

    /// True when the refset marks per-language description preferences.
    pub fn refset_is_language(&self, row: u32) -> bool {
        self.refset_index.langs(row) != 0
    }

    /// Declared extra-column types of a refset.
    pub fn refset_field_types(&self, row: u32) -> Vec<FieldType> {
        self.refs
            .read(self.refset_index.field_types(row))
            .iter()
            .filter_map(FieldType::from_code)
            .collect()
    }

    /// Declared extra-column names of a refset.
    pub fn refset_field_names(&self, row: u32) -> Vec<&str> {
        self.refs
            .read(self.refset_index.field_names(row))
            .iter()
            .map(|off| self.strings.get(off))
            .collect()
    }

    /// Decode a member's extra columns against the refset's declared types.
    pub fn refset_field_values(&self, row: u32, values: u32) -> Vec<RefsetFieldValue> {
        let types = self.refset_field_types(row);
        self.refs
            .read(values)
            .iter()
            .enumerate()
            .map(|(i, raw)| match types.get(i) {
                Some(FieldType::Concept) => RefsetFieldValue::Concept(raw),
                Some(FieldType::Integer) => RefsetFieldValue::Integer(raw),
                _ => RefsetFieldValue::Text(self.strings.get(raw).to_string()),
            })
            .collect()
    }

    /// Refset memberships of a concept: (refset defining-concept offset,
    /// values refs offset) pairs from the back-index.
    pub fn concept_memberships(&self, concept_offset: u32) -> Vec<(u32, u32)> {
        let pairs = self.refs.read(self.concepts.refsets(concept_offset));
        (0..pairs.len() / 2)
            .map(|i| (pairs.get(i * 2), pairs.get(i * 2 + 1)))
            .collect()
    }

    /// Refset memberships of a description, same shape as
    /// [`Self::concept_memberships`].
    pub fn description_memberships(&self, desc_offset: u32) -> Vec<(u32, u32)> {
        let refsets = self.refs.read(self.descriptions.refsets(desc_offset));
        let values = self.refs.read(self.descriptions.values(desc_offset));
        refsets.iter().zip(values.iter()).collect()
    }

    /// True when a language refset for `lang` marks this description as the
    /// preferred term.
    pub fn is_preferred_term(&self, desc_offset: u32, lang: Language) -> bool {
        let Some(preferred) = self.concepts.find(PREFERRED_ACCEPTABILITY) else {
            return false;
        };
        for (refset_concept, values) in self.description_memberships(desc_offset) {
            let Some(row) = self.refset_by_concept(refset_concept) else {
                continue;
            };
            if self.refset_index.langs(row) & lang.bit() == 0 {
                continue;
            }
            let fields = self.refs.read(values);
            if !fields.is_empty() && fields.get(0) == preferred {
                return true;
            }
        }
        false
    }
}
