//! Hand-written recursive-descent parser for the query language.
//!
//! ```text
//! query     := condition ( "AND" condition )*
//! condition := tag "EXISTS"
//!            | tag "=" ( string | number | date | time )
//!            | tag ( "<" | "<=" | ">" | ">=" ) ( number | date | time )
//!            | tag "CONTAINS" string
//! ```

use super::{Condition, Number, Operand, Operator};
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

/// Errors produced while parsing a query string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The query contained nothing but whitespace.
    #[error("empty query")]
    Empty,

    /// Input ended while more tokens were required.
    #[error("unexpected end of query at offset {position}, expected {expected}")]
    UnexpectedEnd {
        /// Byte offset where input ended.
        position: usize,
        /// What the parser was looking for.
        expected: &'static str,
    },

    /// A token did not fit the grammar.
    #[error("unexpected {found:?} at offset {position}, expected {expected}")]
    Unexpected {
        /// Byte offset of the offending token.
        position: usize,
        /// The offending token.
        found: String,
        /// What the parser was looking for.
        expected: &'static str,
    },

    /// A string literal was opened but never closed.
    #[error("unterminated string starting at offset {0}")]
    UnterminatedString(usize),

    /// A numeric literal could not be parsed.
    #[error("invalid number {value:?} at offset {position}")]
    InvalidNumber {
        /// Byte offset of the literal.
        position: usize,
        /// The literal text.
        value: String,
    },

    /// A `DATE` operand was not `YYYY-MM-DD`.
    #[error("invalid date {value:?} at offset {position}, expected YYYY-MM-DD")]
    InvalidDate {
        /// Byte offset of the literal.
        position: usize,
        /// The literal text.
        value: String,
    },

    /// A `TIME` operand was not RFC3339.
    #[error("invalid time {value:?} at offset {position}, expected RFC3339")]
    InvalidTime {
        /// Byte offset of the literal.
        position: usize,
        /// The literal text.
        value: String,
    },
}

/// Characters that terminate a tag name.
fn is_tag_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '(' | ')' | '\'' | '"' | '=' | '<' | '>' | '\\')
}

pub(super) fn parse(input: &str) -> Result<Vec<Condition>, QueryError> {
    let mut parser = Parser { input, pos: 0 };

    parser.skip_ws();
    if parser.at_end() {
        return Err(QueryError::Empty);
    }

    let mut conditions = vec![parser.condition()?];
    loop {
        parser.skip_ws();
        if parser.at_end() {
            break;
        }
        parser.keyword("AND", "AND")?;
        parser.skip_ws();
        conditions.push(parser.condition()?);
    }

    Ok(conditions)
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn skip_ws(&mut self) {
        let rest = self.rest();
        let trimmed = rest.trim_start();
        self.pos += rest.len() - trimmed.len();
    }

    /// Next whitespace-delimited token, for diagnostics.
    fn peek_token(&self) -> String {
        self.rest()
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string()
    }

    fn unexpected(&self, expected: &'static str) -> QueryError {
        if self.at_end() {
            QueryError::UnexpectedEnd {
                position: self.pos,
                expected,
            }
        } else {
            QueryError::Unexpected {
                position: self.pos,
                found: self.peek_token(),
                expected,
            }
        }
    }

    /// Consume `word` if it appears as a whole word at the cursor.
    fn try_keyword(&mut self, word: &str) -> bool {
        let rest = self.rest();
        if !rest.starts_with(word) {
            return false;
        }
        match rest[word.len()..].chars().next() {
            Some(c) if is_tag_char(c) => false,
            _ => {
                self.pos += word.len();
                true
            }
        }
    }

    fn keyword(&mut self, word: &str, expected: &'static str) -> Result<(), QueryError> {
        if self.try_keyword(word) {
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    /// Consume a run of characters satisfying `pred`.
    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let rest = self.rest();
        let len = rest
            .char_indices()
            .find(|(_, c)| !pred(*c))
            .map_or(rest.len(), |(i, _)| i);
        self.pos += len;
        &rest[..len]
    }

    fn condition(&mut self) -> Result<Condition, QueryError> {
        let tag = self.take_while(is_tag_char);
        if tag.is_empty() {
            return Err(self.unexpected("tag"));
        }
        let tag = tag.to_string();

        self.skip_ws();
        let op = self.operator()?;

        let operand = match op {
            Operator::Exists => None,
            Operator::Contains => {
                self.skip_ws();
                Some(Operand::String(self.string()?))
            }
            Operator::Eq => {
                self.skip_ws();
                Some(self.operand(true)?)
            }
            Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge => {
                self.skip_ws();
                Some(self.operand(false)?)
            }
        };

        Ok(Condition { tag, op, operand })
    }

    fn operator(&mut self) -> Result<Operator, QueryError> {
        // Two-character symbols first so "<=" is not read as "<".
        const SYMBOLS: [(&str, Operator); 5] = [
            ("<=", Operator::Le),
            (">=", Operator::Ge),
            ("<", Operator::Lt),
            (">", Operator::Gt),
            ("=", Operator::Eq),
        ];

        for (symbol, op) in SYMBOLS {
            if self.rest().starts_with(symbol) {
                self.pos += symbol.len();
                return Ok(op);
            }
        }
        if self.try_keyword("CONTAINS") {
            return Ok(Operator::Contains);
        }
        if self.try_keyword("EXISTS") {
            return Ok(Operator::Exists);
        }

        Err(self.unexpected("operator (=, <, <=, >, >=, CONTAINS, EXISTS)"))
    }

    fn operand(&mut self, allow_string: bool) -> Result<Operand, QueryError> {
        match self.peek() {
            Some('\'') if allow_string => Ok(Operand::String(self.string()?)),
            Some(c) if c == '-' || c.is_ascii_digit() => Ok(Operand::Number(self.number()?)),
            Some(_) if self.try_keyword("DATE") => {
                self.skip_ws();
                let position = self.pos;
                let value = self.take_while(|c| !c.is_whitespace());
                NaiveDate::parse_from_str(value, "%Y-%m-%d")
                    .map(Operand::Date)
                    .map_err(|_| QueryError::InvalidDate {
                        position,
                        value: value.to_string(),
                    })
            }
            Some(_) if self.try_keyword("TIME") => {
                self.skip_ws();
                let position = self.pos;
                let value = self.take_while(|c| !c.is_whitespace());
                DateTime::parse_from_rfc3339(value)
                    .map(|t| Operand::Time(t.with_timezone(&Utc)))
                    .map_err(|_| QueryError::InvalidTime {
                        position,
                        value: value.to_string(),
                    })
            }
            _ if allow_string => Err(self.unexpected("string, number, DATE or TIME")),
            _ => Err(self.unexpected("number, DATE or TIME")),
        }
    }

    fn string(&mut self) -> Result<String, QueryError> {
        let start = self.pos;
        if self.peek() != Some('\'') {
            return Err(self.unexpected("quoted string"));
        }
        self.pos += 1;

        let rest = self.rest();
        let Some(end) = rest.find('\'') else {
            return Err(QueryError::UnterminatedString(start));
        };
        self.pos += end + 1;
        Ok(rest[..end].to_string())
    }

    fn number(&mut self) -> Result<Number, QueryError> {
        let position = self.pos;
        let literal = self.take_while(|c| !c.is_whitespace());
        let invalid = || QueryError::InvalidNumber {
            position,
            value: literal.to_string(),
        };

        let digits = literal.strip_prefix('-').unwrap_or(literal);
        let (int_part, frac_part) = match digits.split_once('.') {
            Some((int_part, frac_part)) => (int_part, Some(frac_part)),
            None => (digits, None),
        };
        let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(int_part) || frac_part.is_some_and(|f| !all_digits(f)) {
            return Err(invalid());
        }

        if frac_part.is_none() {
            if let Ok(value) = literal.parse::<i64>() {
                return Ok(Number::Int(value));
            }
        }
        literal
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Number::Float)
            .ok_or_else(invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_condition() {
        let conditions = parse("qc.event = 'NewBlock'").unwrap();
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].tag, "qc.event");
        assert_eq!(conditions[0].op, Operator::Eq);
        assert_eq!(
            conditions[0].operand,
            Some(Operand::String("NewBlock".to_string()))
        );
    }

    #[test]
    fn test_conjunction_without_spaces_around_symbols() {
        let conditions = parse("tx.height>=5 AND tx.height<10").unwrap();
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0].op, Operator::Ge);
        assert_eq!(conditions[0].operand, Some(Operand::Number(Number::Int(5))));
        assert_eq!(conditions[1].op, Operator::Lt);
    }

    #[test]
    fn test_exists_and_contains() {
        let conditions = parse("tx.hash EXISTS AND account.name CONTAINS 'igor'").unwrap();
        assert_eq!(conditions[0].op, Operator::Exists);
        assert_eq!(conditions[0].operand, None);
        assert_eq!(conditions[1].op, Operator::Contains);
    }

    #[test]
    fn test_date_and_time_operands() {
        let conditions =
            parse("tx.date > DATE 2017-01-01 AND tx.time <= TIME 2018-05-03T14:45:00Z").unwrap();
        assert!(matches!(conditions[0].operand, Some(Operand::Date(_))));
        assert!(matches!(conditions[1].operand, Some(Operand::Time(_))));
    }

    #[test]
    fn test_float_and_negative_numbers() {
        let conditions = parse("fee > 0.5 AND delta = -3").unwrap();
        assert_eq!(
            conditions[0].operand,
            Some(Operand::Number(Number::Float(0.5)))
        );
        assert_eq!(
            conditions[1].operand,
            Some(Operand::Number(Number::Int(-3)))
        );
    }

    #[test]
    fn test_empty_query() {
        assert_eq!(parse(""), Err(QueryError::Empty));
        assert_eq!(parse("   "), Err(QueryError::Empty));
    }

    #[test]
    fn test_missing_operator() {
        let err = parse("qc.event 'NewBlock'").unwrap_err();
        assert!(matches!(err, QueryError::Unexpected { position: 9, .. }));
    }

    #[test]
    fn test_missing_operand() {
        let err = parse("qc.event =").unwrap_err();
        assert!(matches!(err, QueryError::UnexpectedEnd { .. }));
    }

    #[test]
    fn test_ordering_rejects_strings() {
        let err = parse("tx.height > 'five'").unwrap_err();
        assert!(matches!(err, QueryError::Unexpected { .. }));
    }

    #[test]
    fn test_unterminated_string() {
        assert_eq!(
            parse("qc.event = 'NewBlock"),
            Err(QueryError::UnterminatedString(11))
        );
    }

    #[test]
    fn test_lowercase_keywords_rejected() {
        assert!(parse("a = 1 and b = 2").is_err());
        assert!(parse("a exists").is_err());
    }

    #[test]
    fn test_invalid_literals() {
        assert!(matches!(
            parse("a = 1.2.3"),
            Err(QueryError::InvalidNumber { .. })
        ));
        assert!(matches!(
            parse("a > DATE 2017-13-01"),
            Err(QueryError::InvalidDate { .. })
        ));
        assert!(matches!(
            parse("a > TIME yesterday"),
            Err(QueryError::InvalidTime { .. })
        ));
    }

    #[test]
    fn test_trailing_garbage() {
        let err = parse("a = 1 OR b = 2").unwrap_err();
        assert!(matches!(err, QueryError::Unexpected { expected: "AND", .. }));
    }
}
