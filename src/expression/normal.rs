//! Expression normalisation and equivalence over a concept cache.
//!
//! Normalising a bare concept unfolds its active outbound defining
//! attribute relationships into refinements, one refinement group per
//! relationship group. Composite expressions normalise every constituent
//! and merge. Output ordering is fixed (focus concepts ascending, then
//! refinements by (property, value), then groups by canonical render), so
//! the minimal rendering of a normal form is a stable equivalence key.

use std::collections::BTreeMap;

use crate::cache::ConceptCache;

use super::{
    ConceptRef, Expression, Refinement, RefinementValue, RenderMode, render,
};

/// Stateless normalisation engine borrowing the frozen cache.
pub struct ExpressionEngine<'a> {
    cache: &'a ConceptCache,
}

impl<'a> ExpressionEngine<'a> {
    pub fn new(cache: &'a ConceptCache) -> ExpressionEngine<'a> {
        ExpressionEngine { cache }
    }

    /// Normal form of a stored concept, rendered minimally. `None` when
    /// the form is just the SCTID itself (no attribute relationships).
    pub fn concept_normal_form(&self, offset: u32) -> Option<String> {
        let (refinements, groups) = self.stored_refinements(offset);
        if refinements.is_empty() && groups.is_empty() {
            return None;
        }
        let expression = Expression {
            status: None,
            concepts: vec![ConceptRef::new(self.cache.concepts.id(offset))],
            refinements,
            groups,
        };
        Some(render(&self.normalise(&expression), RenderMode::Minimal))
    }

    /// Normalise an expression against the cache.
    pub fn normalise(&self, expression: &Expression) -> Expression {
        let mut focus: Vec<u64> = expression.concepts.iter().map(|c| c.code).collect();
        focus.sort_unstable();
        focus.dedup();

        let mut refinements: Vec<Refinement> = Vec::new();
        let mut groups: Vec<Vec<Refinement>> = Vec::new();

        // Each focus concept contributes its stored definition.
        for &code in &focus {
            if let Some(offset) = self.cache.concepts.find(code) {
                let (stored_refinements, stored_groups) = self.stored_refinements(offset);
                refinements.extend(stored_refinements);
                groups.extend(stored_groups);
            }
        }

        // Plus the expression's own refinements, normalised recursively.
        refinements.extend(expression.refinements.iter().map(|r| self.normalise_refinement(r)));
        groups.extend(
            expression
                .groups
                .iter()
                .map(|g| g.iter().map(|r| self.normalise_refinement(r)).collect()),
        );

        sort_refinements(&mut refinements);
        dedup_by_render(&mut refinements);
        for group in &mut groups {
            sort_refinements(group);
            dedup_by_render(group);
        }
        groups.sort_by_cached_key(|g| group_key(g));
        groups.dedup_by_key(|g| group_key(g));

        Expression {
            status: expression.status,
            concepts: focus.into_iter().map(ConceptRef::new).collect(),
            refinements,
            groups,
        }
    }

    /// Two expressions are equivalent iff their normalised minimal
    /// renderings are identical.
    pub fn equivalent(&self, a: &Expression, b: &Expression) -> bool {
        render(&self.normalise(a), RenderMode::Minimal)
            == render(&self.normalise(b), RenderMode::Minimal)
    }

    // ── internals ────────────────────────────────────────────────────

    /// A concept's definition as refinements: one per ungrouped attribute
    /// relationship, one group per relationship group. Is-a edges are
    /// hierarchy, not attributes, and stay out.
    fn stored_refinements(&self, offset: u32) -> (Vec<Refinement>, Vec<Vec<Refinement>>) {
        let cache = self.cache;
        let outbounds = cache.refs.read(cache.concepts.outbounds(offset));
        let mut ungrouped = Vec::new();
        let mut grouped: BTreeMap<u8, Vec<Refinement>> = BTreeMap::new();
        for rel in outbounds.iter() {
            if !cache.relationships.is_active(rel)
                || !cache.relationships.is_defining(rel)
                || cache.relationships.rel_type(rel) == cache.is_a_offset
            {
                continue;
            }
            let refinement = Refinement {
                name: ConceptRef::new(cache.concepts.id(cache.relationships.rel_type(rel))),
                value: RefinementValue::Concept(ConceptRef::new(
                    cache.concepts.id(cache.relationships.target(rel)),
                )),
            };
            let group = cache.relationships.group(rel);
            if group == 0 {
                ungrouped.push(refinement);
            } else {
                grouped.entry(group).or_default().push(refinement);
            }
        }
        (ungrouped, grouped.into_values().collect())
    }

    fn normalise_refinement(&self, refinement: &Refinement) -> Refinement {
        Refinement {
            name: ConceptRef::new(refinement.name.code),
            value: match &refinement.value {
                RefinementValue::Concept(c) => RefinementValue::Concept(ConceptRef::new(c.code)),
                RefinementValue::Expression(nested) => {
                    RefinementValue::Expression(Box::new(self.normalise(nested)))
                }
            },
        }
    }
}

/// Refinement order: property SCTID, then value SCTID; nested-expression
/// values order after concept values, by canonical render.
fn refinement_key(refinement: &Refinement) -> (u64, u8, u64, String) {
    match &refinement.value {
        RefinementValue::Concept(c) => (refinement.name.code, 0, c.code, String::new()),
        RefinementValue::Expression(nested) => (
            refinement.name.code,
            1,
            0,
            render(nested, RenderMode::Minimal),
        ),
    }
}

fn sort_refinements(refinements: &mut [Refinement]) {
    refinements.sort_by_cached_key(refinement_key);
}

fn dedup_by_render(refinements: &mut Vec<Refinement>) {
    refinements.dedup_by_key(|r| refinement_key(r));
}

fn group_key(group: &[Refinement]) -> String {
    let probe = Expression {
        status: None,
        concepts: Vec::new(),
        refinements: group.to_vec(),
        groups: Vec::new(),
    };
    render(&probe, RenderMode::Minimal)
}
