//! Expression rendering.
//!
//! Minimal mode emits SCTIDs and separators only; it is the canonical form
//! used for equivalence and for stored normal forms. As-is mode keeps the
//! captured terms, reproducing the input up to whitespace normalisation.

use std::fmt::Write;

use super::{Expression, ExpressionStatus, Refinement, RefinementValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Codes only; no terms, no whitespace beyond separators.
    Minimal,
    /// Terms as captured during parse (or resolved by the caller).
    AsIs,
}

pub fn render(expression: &Expression, mode: RenderMode) -> String {
    let mut out = String::new();
    render_into(&mut out, expression, mode);
    out
}

fn render_into(out: &mut String, expression: &Expression, mode: RenderMode) {
    match expression.status {
        // Equivalence is the default reading, so minimal render drops it.
        Some(ExpressionStatus::Equivalent) if mode == RenderMode::AsIs => out.push_str("=== "),
        Some(ExpressionStatus::SubsumedBy) => {
            out.push_str(if mode == RenderMode::AsIs { "<<< " } else { "<<<" })
        }
        _ => {}
    }

    for (i, concept) in expression.concepts.iter().enumerate() {
        if i > 0 {
            out.push('+');
        }
        let _ = write!(out, "{}", concept.code);
        if mode == RenderMode::AsIs {
            if let Some(term) = &concept.term {
                let _ = write!(out, "|{term}|");
            }
        }
    }

    if expression.refinements.is_empty() && expression.groups.is_empty() {
        return;
    }
    out.push(':');
    let mut first = true;
    for refinement in &expression.refinements {
        if !first {
            out.push(',');
        }
        first = false;
        render_refinement(out, refinement, mode);
    }
    for group in &expression.groups {
        if !first {
            out.push(',');
        }
        first = false;
        out.push('{');
        for (i, refinement) in group.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            render_refinement(out, refinement, mode);
        }
        out.push('}');
    }
}

fn render_refinement(out: &mut String, refinement: &Refinement, mode: RenderMode) {
    let _ = write!(out, "{}", refinement.name.code);
    if mode == RenderMode::AsIs {
        if let Some(term) = &refinement.name.term {
            let _ = write!(out, "|{term}|");
        }
    }
    out.push('=');
    match &refinement.value {
        RefinementValue::Concept(concept) => {
            let _ = write!(out, "{}", concept.code);
            if mode == RenderMode::AsIs {
                if let Some(term) = &concept.term {
                    let _ = write!(out, "|{term}|");
                }
            }
        }
        RefinementValue::Expression(nested) => {
            out.push('(');
            render_into(out, nested, mode);
            out.push(')');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::parse;
    use super::*;

    #[test]
    fn test_minimal_drops_terms_and_whitespace() {
        let expr =
            parse("128045006 |Cellulitis| : { 363698007 |finding site| = 56459004 |foot| }")
                .unwrap();
        assert_eq!(
            render(&expr, RenderMode::Minimal),
            "128045006:{363698007=56459004}"
        );
    }

    #[test]
    fn test_as_is_keeps_terms() {
        let expr = parse("128045006|Cellulitis|:{363698007|finding site|=56459004|foot|}").unwrap();
        assert_eq!(
            render(&expr, RenderMode::AsIs),
            "128045006|Cellulitis|:{363698007|finding site|=56459004|foot|}"
        );
    }

    #[test]
    fn test_as_is_reproduces_input_up_to_whitespace() {
        for source in [
            "116680003",
            "116680003|is a|",
            "<<< 73211009:363698007=113331007",
            "421720008+7946007",
            "71388002:363702006=(386661006:246075003=50417007)",
        ] {
            let expr = parse(source).unwrap();
            assert_eq!(render(&expr, RenderMode::AsIs), source);
        }
    }

    #[test]
    fn test_minimal_is_reparseable_and_stable() {
        for source in [
            "128045006|Cellulitis|:{363698007=56459004}",
            "<<< 73211009 : 363698007 = 113331007",
            "404684003:116676008=72704001,{363698007=56459004}",
        ] {
            let minimal = render(&parse(source).unwrap(), RenderMode::Minimal);
            let again = render(&parse(&minimal).unwrap(), RenderMode::Minimal);
            assert_eq!(minimal, again);
        }
    }

    #[test]
    fn test_subsumed_status_survives_minimal() {
        let expr = parse("<<< 73211009").unwrap();
        assert_eq!(render(&expr, RenderMode::Minimal), "<<<73211009");
    }

    #[test]
    fn test_equivalent_status_dropped_in_minimal() {
        let expr = parse("=== 73211009").unwrap();
        assert_eq!(render(&expr, RenderMode::Minimal), "73211009");
    }
}
