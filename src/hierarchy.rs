//! The closure engine, query side.
//!
//! Everything here reads the frozen stores: children come from inbound
//! relationship lists, ancestors from the stored parents, and descendant
//! membership is a binary search over the persisted closure. Nothing is
//! recomputed at query time.

use crate::cache::ConceptCache;
use crate::store::LEAF_SENTINEL;

/// Outcome of a subsumption test between two concepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsumption {
    Equivalent,
    Subsumes,
    SubsumedBy,
    NotSubsumed,
}

impl Subsumption {
    /// The FHIR coding for the outcome.
    pub fn as_str(self) -> &'static str {
        match self {
            Subsumption::Equivalent => "equivalent",
            Subsumption::Subsumes => "subsumes",
            Subsumption::SubsumedBy => "subsumed-by",
            Subsumption::NotSubsumed => "not-subsumed",
        }
    }
}

impl ConceptCache {
    /// Direct children: sources of inbound active defining is-a
    /// relationships, ascending by concept offset.
    pub fn children(&self, offset: u32) -> Vec<u32> {
        let inbounds = self.refs.read(self.concepts.inbounds(offset));
        let mut children = Vec::new();
        for rel in inbounds.iter() {
            if self.relationships.is_active(rel)
                && self.relationships.is_defining(rel)
                && self.relationships.rel_type(rel) == self.is_a_offset
            {
                children.push(self.relationships.source(rel));
            }
        }
        children.sort_unstable();
        children.dedup();
        children
    }

    /// Active parents, in stored order.
    pub fn parents(&self, offset: u32) -> Vec<u32> {
        self.refs.read(self.concepts.parents(offset)).to_vec()
    }

    /// All transitive descendants, ascending by concept offset. Empty for
    /// leaves.
    pub fn all_descendants(&self, offset: u32) -> Vec<u32> {
        let all_desc = self.concepts.all_desc(offset);
        if all_desc == LEAF_SENTINEL {
            return Vec::new();
        }
        self.refs.read(all_desc).to_vec()
    }

    /// Count of transitive descendants without materialising them.
    pub fn descendant_count(&self, offset: u32) -> usize {
        let all_desc = self.concepts.all_desc(offset);
        if all_desc == LEAF_SENTINEL {
            return 0;
        }
        self.refs.read(all_desc).len()
    }

    /// Shortest-path distance from the nearest active root.
    pub fn depth(&self, offset: u32) -> u8 {
        self.concepts.depth(offset)
    }

    /// O(log n): binary search of the stored sorted closure.
    pub fn is_descendant(&self, offset: u32, ancestor: u32) -> bool {
        let all_desc = self.concepts.all_desc(ancestor);
        if all_desc == LEAF_SENTINEL {
            return false;
        }
        self.refs.read(all_desc).contains_sorted(offset)
    }

    /// Relate two concepts through the is-a hierarchy.
    pub fn subsumes(&self, a: u32, b: u32) -> Subsumption {
        if a == b {
            Subsumption::Equivalent
        } else if self.is_descendant(b, a) {
            Subsumption::Subsumes
        } else if self.is_descendant(a, b) {
            Subsumption::SubsumedBy
        } else {
            Subsumption::NotSubsumed
        }
    }
}
