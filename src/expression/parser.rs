//! Recursive-descent parser for compositional-grammar expressions.
//!
//! Whitespace is tolerated between all tokens. Errors carry the byte offset
//! of the failure and a short description of what was expected.

use crate::error::{Result, SnomedError};

use super::{ConceptRef, Expression, ExpressionStatus, Refinement, RefinementValue};

/// Parse a complete expression; trailing input is an error.
pub fn parse(input: &str) -> Result<Expression> {
    let mut parser = Parser {
        src: input,
        bytes: input.as_bytes(),
        pos: 0,
    };
    let expression = parser.expression()?;
    parser.skip_ws();
    if parser.pos < parser.bytes.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(expression)
}

struct Parser<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, message: &str) -> SnomedError {
        SnomedError::BadExpression {
            expression: self.src.to_string(),
            offset: self.pos,
            message: message.to_string(),
        }
    }

    fn skip_ws(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_ws();
        self.bytes.get(self.pos).copied()
    }

    /// Consume `expected` if it is next (after whitespace).
    fn eat(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: u8, what: &str) -> Result<()> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(what))
        }
    }

    // ── grammar ──────────────────────────────────────────────────────

    fn expression(&mut self) -> Result<Expression> {
        let status = self.status();
        let mut concepts = vec![self.concept()?];
        while self.eat(b'+') {
            concepts.push(self.concept()?);
        }

        let mut refinements = Vec::new();
        let mut groups = Vec::new();
        if self.eat(b':') {
            loop {
                if self.peek() == Some(b'{') {
                    groups.push(self.group()?);
                } else {
                    refinements.push(self.refinement()?);
                }
                if !self.eat(b',') {
                    break;
                }
            }
        }

        Ok(Expression {
            status,
            concepts,
            refinements,
            groups,
        })
    }

    fn status(&mut self) -> Option<ExpressionStatus> {
        self.skip_ws();
        if self.src[self.pos..].starts_with("===") {
            self.pos += 3;
            Some(ExpressionStatus::Equivalent)
        } else if self.src[self.pos..].starts_with("<<<") {
            self.pos += 3;
            Some(ExpressionStatus::SubsumedBy)
        } else {
            None
        }
    }

    fn concept(&mut self) -> Result<ConceptRef> {
        self.skip_ws();
        let start = self.pos;
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_digit() {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error("expected an SCTID"));
        }
        let digits = &self.src[start..self.pos];
        let code = digits
            .parse()
            .map_err(|_| self.error("SCTID does not fit 64 bits"))?;

        let term = if self.eat(b'|') {
            let term_start = self.pos;
            while self.pos < self.bytes.len() && self.bytes[self.pos] != b'|' {
                self.pos += 1;
            }
            if self.pos >= self.bytes.len() {
                return Err(self.error("unterminated term: expected closing '|'"));
            }
            let term = self.src[term_start..self.pos].trim().to_string();
            self.pos += 1;
            Some(term)
        } else {
            None
        };

        Ok(ConceptRef { code, term })
    }

    fn group(&mut self) -> Result<Vec<Refinement>> {
        self.expect(b'{', "expected '{'")?;
        let mut refinements = vec![self.refinement()?];
        while self.eat(b',') {
            refinements.push(self.refinement()?);
        }
        self.expect(b'}', "expected '}' to close the refinement group")?;
        Ok(refinements)
    }

    fn refinement(&mut self) -> Result<Refinement> {
        let name = self.concept()?;
        self.expect(b'=', "expected '=' in refinement")?;
        let value = if self.eat(b'(') {
            let nested = self.expression()?;
            self.expect(b')', "expected ')' to close the nested expression")?;
            RefinementValue::Expression(Box::new(nested))
        } else {
            RefinementValue::Concept(self.concept()?)
        };
        Ok(Refinement { name, value })
    }
}
