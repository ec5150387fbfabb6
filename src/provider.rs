//! The code-system provider consumed by the FHIR terminology server.
//!
//! One provider wraps one frozen cache. Lookups never throw for ordinary
//! "code not found": [`Located`] carries either a context or a message and
//! the caller decides whether that becomes an operation outcome.

use std::sync::Arc;

use crate::cache::ConceptCache;
use crate::error::{Result, SnomedError};
use crate::expression::{
    Expression, ExpressionContext, ExpressionEngine, RenderMode, parse, render,
};
use crate::hierarchy::Subsumption;
use crate::lang::Language;
use crate::{FSN_TYPE, SYNONYM_TYPE, SctId, TEXT_DEFINITION_TYPE};

// ─── Result objects ──────────────────────────────────────────────────

/// Outcome of a lookup: a context, or a human-readable message saying why
/// not.
#[derive(Debug)]
pub struct Located {
    pub context: Option<ExpressionContext>,
    pub message: Option<String>,
}

impl Located {
    fn found(context: ExpressionContext) -> Located {
        Located {
            context: Some(context),
            message: None,
        }
    }

    fn not_found(message: String) -> Located {
        Located {
            context: None,
            message: Some(message),
        }
    }
}

/// One designation of a concept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Designation {
    pub language: Language,
    /// Description kind SCTID (FSN, synonym, text definition).
    pub use_id: SctId,
    pub value: String,
    pub active: bool,
    /// Marked preferred for its language by a language refset.
    pub preferred: bool,
}

/// Cursor over root concepts or a concept's children.
#[derive(Debug)]
pub struct ConceptIterator {
    offsets: Vec<u32>,
    at: usize,
}

impl ConceptIterator {
    pub fn remaining(&self) -> usize {
        self.offsets.len() - self.at
    }
}

// ─── Provider ────────────────────────────────────────────────────────

/// The SNOMED CT code-system provider.
#[derive(Clone)]
pub struct SnomedProvider {
    cache: Arc<ConceptCache>,
}

impl SnomedProvider {
    pub fn new(cache: Arc<ConceptCache>) -> SnomedProvider {
        SnomedProvider { cache }
    }

    pub fn cache(&self) -> &ConceptCache {
        &self.cache
    }

    // ── identity ─────────────────────────────────────────────────────

    pub fn system(&self) -> &str {
        self.cache.system_uri()
    }

    pub fn version(&self) -> &str {
        &self.cache.version_date
    }

    pub fn version_uri(&self) -> &str {
        &self.cache.version_uri
    }

    pub fn def_lang(&self) -> &'static str {
        self.cache.default_language.tag()
    }

    pub fn total_count(&self) -> u32 {
        self.cache.concepts.count()
    }

    // ── locate ───────────────────────────────────────────────────────

    /// Pure digits are an identity lookup; anything else parses as a
    /// compositional-grammar expression.
    pub fn locate(&self, code: &str) -> Located {
        let code = code.trim();
        if code.is_empty() {
            return Located::not_found("empty code".to_string());
        }
        if code.bytes().all(|b| b.is_ascii_digit()) {
            return match code.parse::<SctId>().ok().and_then(|id| self.cache.concepts.find(id)) {
                Some(offset) => Located::found(ExpressionContext::Reference(offset)),
                None => Located::not_found(format!("concept {code} not found in this edition")),
            };
        }
        match parse(code) {
            Ok(expression) => self.locate_expression(code, expression),
            Err(e) => Located::not_found(e.to_string()),
        }
    }

    fn locate_expression(&self, source: &str, expression: Expression) -> Located {
        // Every focus concept must exist.
        for concept in &expression.concepts {
            if self.cache.concepts.find(concept.code).is_none() {
                return Located::not_found(format!(
                    "concept {} in expression not found in this edition",
                    concept.code
                ));
            }
        }
        if !expression.is_composite() {
            // A bare single concept materialises as a plain reference; the
            // loop above already proved it resolves.
            if let Some(offset) = self.cache.concepts.find(expression.concepts[0].code) {
                return Located::found(ExpressionContext::Reference(offset));
            }
        }
        Located::found(ExpressionContext::Complex {
            source: source.to_string(),
            expression,
        })
    }

    // ── display & designations ───────────────────────────────────────

    /// Best display for the requested language preferences, falling back to
    /// the cache default: preferred term, then any synonym in the language,
    /// then the FSN, then anything.
    pub fn display(&self, context: &ExpressionContext, langs: &[Language]) -> String {
        match context {
            ExpressionContext::Reference(offset) => self.concept_display(*offset, langs),
            ExpressionContext::Complex { expression, .. } => {
                render(&self.decorate(expression, langs), RenderMode::AsIs)
            }
        }
    }

    fn preference_order(&self, langs: &[Language]) -> Vec<Language> {
        let mut order: Vec<Language> = langs.to_vec();
        if !order.contains(&self.cache.default_language) {
            order.push(self.cache.default_language);
        }
        order
    }

    fn concept_display(&self, offset: u32, langs: &[Language]) -> String {
        let cache = &self.cache;
        let descriptions = cache.refs.read(cache.concepts.descriptions(offset));
        let synonym_kind = cache.concepts.find(SYNONYM_TYPE);
        let fsn_kind = cache.concepts.find(FSN_TYPE);

        for lang in self.preference_order(langs) {
            for desc in descriptions.iter() {
                if cache.descriptions.is_active(desc)
                    && Some(cache.descriptions.kind(desc)) == synonym_kind
                    && cache.is_preferred_term(desc, lang)
                {
                    return cache.strings.get(cache.descriptions.term(desc)).to_string();
                }
            }
        }
        for lang in self.preference_order(langs) {
            for desc in descriptions.iter() {
                if cache.descriptions.is_active(desc)
                    && Some(cache.descriptions.kind(desc)) == synonym_kind
                    && cache.descriptions.lang(desc) == lang.code()
                {
                    return cache.strings.get(cache.descriptions.term(desc)).to_string();
                }
            }
        }
        for desc in descriptions.iter() {
            if cache.descriptions.is_active(desc) && Some(cache.descriptions.kind(desc)) == fsn_kind
            {
                return cache.strings.get(cache.descriptions.term(desc)).to_string();
            }
        }
        descriptions
            .iter()
            .next()
            .map(|d| cache.strings.get(cache.descriptions.term(d)).to_string())
            .unwrap_or_default()
    }

    /// Fill in display terms for every concept mention of an expression.
    fn decorate(&self, expression: &Expression, langs: &[Language]) -> Expression {
        let mut out = expression.clone();
        for concept in &mut out.concepts {
            if concept.term.is_none() {
                concept.term = self.term_for(concept.code, langs);
            }
        }
        for refinement in &mut out.refinements {
            self.decorate_refinement(refinement, langs);
        }
        for group in &mut out.groups {
            for refinement in group {
                self.decorate_refinement(refinement, langs);
            }
        }
        out
    }

    fn decorate_refinement(&self, refinement: &mut crate::expression::Refinement, langs: &[Language]) {
        if refinement.name.term.is_none() {
            refinement.name.term = self.term_for(refinement.name.code, langs);
        }
        if let crate::expression::RefinementValue::Concept(c) = &mut refinement.value {
            if c.term.is_none() {
                c.term = self.term_for(c.code, langs);
            }
        }
    }

    fn term_for(&self, code: SctId, langs: &[Language]) -> Option<String> {
        self.cache
            .concepts
            .find(code)
            .map(|offset| self.concept_display(offset, langs))
            .filter(|term| !term.is_empty())
    }

    /// All designations: FSNs, synonyms and text definitions across
    /// languages, with per-language preference flags from language refsets.
    pub fn designations(&self, context: &ExpressionContext) -> Vec<Designation> {
        let Some(offset) = context.reference() else {
            return Vec::new();
        };
        let cache = &self.cache;
        let descriptions = cache.refs.read(cache.concepts.descriptions(offset));
        let mut out = Vec::with_capacity(descriptions.len());
        for desc in descriptions.iter() {
            let language = Language::from_code(cache.descriptions.lang(desc));
            out.push(Designation {
                language,
                use_id: cache.concepts.id(cache.descriptions.kind(desc)),
                value: cache.strings.get(cache.descriptions.term(desc)).to_string(),
                active: cache.descriptions.is_active(desc),
                preferred: cache.is_preferred_term(desc, language),
            });
        }
        out
    }

    /// The text definition, when one exists.
    pub fn definition(&self, context: &ExpressionContext) -> Option<String> {
        let offset = context.reference()?;
        let cache = &self.cache;
        let definition_kind = cache.concepts.find(TEXT_DEFINITION_TYPE)?;
        let descriptions = cache.refs.read(cache.concepts.descriptions(offset));
        descriptions
            .iter()
            .find(|&d| cache.descriptions.is_active(d) && cache.descriptions.kind(d) == definition_kind)
            .map(|d| cache.strings.get(cache.descriptions.term(d)).to_string())
    }

    /// Stored normal form, when it differs from the bare SCTID.
    pub fn normal_form(&self, context: &ExpressionContext) -> Option<String> {
        let offset = context.reference()?;
        let string_offset = self.cache.concepts.normal_form(offset);
        if string_offset == 0 {
            return None;
        }
        Some(self.cache.strings.get(string_offset).to_string())
    }

    // ── status ───────────────────────────────────────────────────────

    /// SNOMED has no abstract codes.
    pub fn is_abstract(&self, _context: &ExpressionContext) -> bool {
        false
    }

    pub fn is_inactive(&self, context: &ExpressionContext) -> bool {
        context
            .reference()
            .map(|offset| self.cache.concepts.is_inactive(offset))
            .unwrap_or(false)
    }

    /// SNOMED models retirement as inactivation, not deprecation.
    pub fn is_deprecated(&self, _context: &ExpressionContext) -> bool {
        false
    }

    pub fn get_status(&self, context: &ExpressionContext) -> &'static str {
        if self.is_inactive(context) {
            "inactive"
        } else {
            "active"
        }
    }

    // ── hierarchy ────────────────────────────────────────────────────

    /// First active parent, as a code. SNOMED is a polyhierarchy; callers
    /// needing every parent use the hierarchy API on the cache.
    pub fn parent(&self, context: &ExpressionContext) -> Option<String> {
        let offset = context.reference()?;
        self.cache
            .parents(offset)
            .first()
            .map(|&p| self.cache.concepts.id(p).to_string())
    }

    pub fn same_concept(&self, a: &ExpressionContext, b: &ExpressionContext) -> bool {
        match (a, b) {
            (ExpressionContext::Reference(x), ExpressionContext::Reference(y)) => x == y,
            (
                ExpressionContext::Complex { expression: x, .. },
                ExpressionContext::Complex { expression: y, .. },
            ) => ExpressionEngine::new(&self.cache).equivalent(x, y),
            _ => false,
        }
    }

    /// Subsumption between two codes (or expressions; expressions relate
    /// only by equivalence).
    pub fn subsumes_test(&self, code_a: &str, code_b: &str) -> Result<Subsumption> {
        let a = self.require(code_a)?;
        let b = self.require(code_b)?;
        Ok(match (&a, &b) {
            (ExpressionContext::Reference(x), ExpressionContext::Reference(y)) => {
                self.cache.subsumes(*x, *y)
            }
            _ => {
                let engine = ExpressionEngine::new(&self.cache);
                let expr_a = self.as_expression(&a);
                let expr_b = self.as_expression(&b);
                if engine.equivalent(&expr_a, &expr_b) {
                    Subsumption::Equivalent
                } else {
                    Subsumption::NotSubsumed
                }
            }
        })
    }

    fn require(&self, code: &str) -> Result<ExpressionContext> {
        self.locate(code).context.ok_or_else(|| SnomedError::NotFound {
            code: code.to_string(),
        })
    }

    fn as_expression(&self, context: &ExpressionContext) -> Expression {
        match context {
            ExpressionContext::Reference(offset) => {
                Expression::concept(self.cache.concepts.id(*offset))
            }
            ExpressionContext::Complex { expression, .. } => expression.clone(),
        }
    }

    /// Locate `code` only if it equals `parent` (when self is allowed) or
    /// is one of its descendants.
    pub fn locate_is_a(&self, code: &str, parent: &str, disallow_self: bool) -> Located {
        let located = self.locate(code);
        let Some(context) = located.context else {
            return located;
        };
        let Some(offset) = context.reference() else {
            return Located::not_found(format!(
                "'{code}' is an expression; is-a checks need a plain concept"
            ));
        };
        let Some(parent_offset) = self.locate(parent).context.and_then(|c| c.reference()) else {
            return Located::not_found(format!("concept {parent} not found in this edition"));
        };
        if offset == parent_offset {
            return if disallow_self {
                Located::not_found(format!("{code} is excluded from the set based on {parent}"))
            } else {
                Located::found(context)
            };
        }
        if self.cache.is_descendant(offset, parent_offset) {
            Located::found(context)
        } else {
            Located::not_found(format!("{code} is not subsumed by {parent}"))
        }
    }

    // ── iteration ────────────────────────────────────────────────────

    /// `None` iterates the active roots; a reference context iterates its
    /// direct children. Both yield in ascending concept-offset order.
    pub fn iterator(&self, context: Option<&ExpressionContext>) -> ConceptIterator {
        let offsets = match context {
            None => {
                let mut roots = self.cache.active_root_offsets();
                roots.sort_unstable();
                roots
            }
            Some(context) => context
                .reference()
                .map(|offset| self.cache.children(offset))
                .unwrap_or_default(),
        };
        ConceptIterator { offsets, at: 0 }
    }

    pub fn next_context(&self, iterator: &mut ConceptIterator) -> Option<ExpressionContext> {
        let offset = *iterator.offsets.get(iterator.at)?;
        iterator.at += 1;
        Some(ExpressionContext::Reference(offset))
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
