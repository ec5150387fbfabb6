//! Compositional-grammar expressions: parse, render, normalise, compare.
//!
//! ```text
//! expression := [status] concept ('+' concept)* [':' refinementSet]
//! status     := '===' | '<<<'
//! concept    := SCTID ['|' term '|']
//! refinement := concept '=' (concept | '(' expression ')')
//! ```
//!
//! Terms between pipes are carried verbatim through parse and as-is render
//! but have no semantic weight; equivalence works on normalised minimal
//! renderings only.

mod normal;
mod parser;
mod render;

pub use normal::ExpressionEngine;
pub use parser::parse;
pub use render::{RenderMode, render};

use crate::SctId;

// ─── AST ─────────────────────────────────────────────────────────────

/// Status prefix: `===` asserts equivalence (the default when absent),
/// `<<<` asserts the expression is subsumed by its definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpressionStatus {
    Equivalent,
    SubsumedBy,
}

/// A concept mention: SCTID plus the optional `|term|` caption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConceptRef {
    pub code: SctId,
    pub term: Option<String>,
}

impl ConceptRef {
    pub fn new(code: SctId) -> ConceptRef {
        ConceptRef { code, term: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefinementValue {
    Concept(ConceptRef),
    Expression(Box<Expression>),
}

/// `property = value` inside an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refinement {
    pub name: ConceptRef,
    pub value: RefinementValue,
}

/// A parsed compositional-grammar expression.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Expression {
    pub status: Option<ExpressionStatus>,
    pub concepts: Vec<ConceptRef>,
    pub refinements: Vec<Refinement>,
    pub groups: Vec<Vec<Refinement>>,
}

impl Expression {
    /// A bare single-concept expression.
    pub fn concept(code: SctId) -> Expression {
        Expression {
            concepts: vec![ConceptRef::new(code)],
            ..Expression::default()
        }
    }

    /// True when this is more than a single bare concept.
    pub fn is_composite(&self) -> bool {
        self.concepts.len() > 1 || !self.refinements.is_empty() || !self.groups.is_empty()
    }
}

// ─── Contexts ────────────────────────────────────────────────────────

/// What `locate` hands back: either a materialised reference to a concept
/// record, or a parsed complex expression with its source text.
#[derive(Debug, Clone)]
pub enum ExpressionContext {
    Reference(u32),
    Complex {
        source: String,
        expression: Expression,
    },
}

impl ExpressionContext {
    pub fn is_complex(&self) -> bool {
        matches!(self, ExpressionContext::Complex { .. })
    }

    /// The concept offset for a reference context.
    pub fn reference(&self) -> Option<u32> {
        match self {
            ExpressionContext::Reference(offset) => Some(*offset),
            ExpressionContext::Complex { .. } => None,
        }
    }
}
