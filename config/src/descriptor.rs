//! Range and set descriptors used inside calibration config files.
//!
//! Config values such as `output_range = "[0, 1]"` or `required = "{text, tables}"`
//! are parsed with a small hand-written grammar. Nothing is ever evaluated.
//!
//! ```text
//! descriptor := range | set
//! range      := ('[' | '(') number ',' number (']' | ')') modifier*
//! modifier   := "integer"
//! set        := '{' [ literal (',' literal)* [','] ] '}'
//! literal    := quoted | number | word
//! quoted     := '\'' ... '\'' | '"' ... '"'
//! word       := [A-Za-z_][A-Za-z0-9_.:-]*
//! number     := ['+' | '-'] digits ['.' digits] [('e' | 'E') ['+' | '-'] digits]
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use verity_types::{RangeError, ValueRange};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("descriptor error at byte {position}: {kind}")]
pub struct DescriptorError {
    pub position: usize,
    pub kind: DescriptorErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorErrorKind {
    #[error("empty descriptor")]
    Empty,
    #[error("expected {0}")]
    Expected(&'static str),
    #[error("unexpected character '{0}'")]
    Unexpected(char),
    #[error("unterminated quoted string")]
    UnterminatedString,
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    #[error("unknown modifier '{0}'")]
    UnknownModifier(String),
    #[error("modifier '{0}' given twice")]
    DuplicateModifier(String),
    #[error("lower bound {lower} is above upper bound {upper}")]
    InvertedRange { lower: String, upper: String },
    #[error("trailing input after descriptor")]
    Trailing,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bound {
    Inclusive(f64),
    Exclusive(f64),
}

impl Bound {
    #[must_use]
    pub const fn value(self) -> f64 {
        match self {
            Bound::Inclusive(v) | Bound::Exclusive(v) => v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeDescriptor {
    pub lower: Bound,
    pub upper: Bound,
    pub integer: bool,
}

impl RangeDescriptor {
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        if self.integer && value.fract() != 0.0 {
            return false;
        }
        let above = match self.lower {
            Bound::Inclusive(lo) => value >= lo,
            Bound::Exclusive(lo) => value > lo,
        };
        let below = match self.upper {
            Bound::Inclusive(hi) => value <= hi,
            Bound::Exclusive(hi) => value < hi,
        };
        above && below
    }

    /// Closed interval spanned by the bounds, ignoring exclusivity.
    pub fn to_value_range(&self) -> Result<ValueRange, RangeError> {
        ValueRange::new(self.lower.value(), self.upper.value())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetDescriptor {
    pub members: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Descriptor {
    Range(RangeDescriptor),
    Set(SetDescriptor),
}

impl Descriptor {
    pub fn parse(input: &str) -> Result<Self, DescriptorError> {
        let mut parser = Parser::new(input);
        parser.skip_ws();
        let descriptor = match parser.peek() {
            None => return Err(parser.error(DescriptorErrorKind::Empty)),
            Some('[' | '(') => Descriptor::Range(parser.range()?),
            Some('{') => Descriptor::Set(parser.set()?),
            Some(c) => return Err(parser.error(DescriptorErrorKind::Unexpected(c))),
        };
        parser.skip_ws();
        if parser.peek().is_some() {
            return Err(parser.error(DescriptorErrorKind::Trailing));
        }
        Ok(descriptor)
    }

    pub fn parse_range(input: &str) -> Result<RangeDescriptor, DescriptorError> {
        match Self::parse(input)? {
            Descriptor::Range(range) => Ok(range),
            Descriptor::Set(_) => Err(DescriptorError {
                position: 0,
                kind: DescriptorErrorKind::Expected("range descriptor"),
            }),
        }
    }

    pub fn parse_set(input: &str) -> Result<SetDescriptor, DescriptorError> {
        match Self::parse(input)? {
            Descriptor::Set(set) => Ok(set),
            Descriptor::Range(_) => Err(DescriptorError {
                position: 0,
                kind: DescriptorErrorKind::Expected("set descriptor"),
            }),
        }
    }
}

impl FromStr for Descriptor {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Descriptor::Range(range) => {
                let (open, lo) = match range.lower {
                    Bound::Inclusive(v) => ('[', v),
                    Bound::Exclusive(v) => ('(', v),
                };
                let (close, hi) = match range.upper {
                    Bound::Inclusive(v) => (']', v),
                    Bound::Exclusive(v) => (')', v),
                };
                write!(f, "{open}{lo}, {hi}{close}")?;
                if range.integer {
                    f.write_str(" integer")?;
                }
                Ok(())
            }
            Descriptor::Set(set) => {
                f.write_str("{")?;
                for (i, member) in set.members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "'{member}'")?;
                }
                f.write_str("}")
            }
        }
    }
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn error(&self, kind: DescriptorErrorKind) -> DescriptorError {
        DescriptorError {
            position: self.pos,
            kind,
        }
    }

    fn expect(&mut self, want: char, what: &'static str) -> Result<(), DescriptorError> {
        self.skip_ws();
        if self.peek() == Some(want) {
            self.bump();
            Ok(())
        } else {
            Err(self.error(DescriptorErrorKind::Expected(what)))
        }
    }

    fn range(&mut self) -> Result<RangeDescriptor, DescriptorError> {
        let inclusive_lo = self.bump() == Some('[');
        self.skip_ws();
        let (lo_text, lo) = self.number()?;
        self.expect(',', "',' between range bounds")?;
        self.skip_ws();
        let (hi_text, hi) = self.number()?;
        self.skip_ws();
        let inclusive_hi = match self.bump() {
            Some(']') => true,
            Some(')') => false,
            _ => return Err(self.error(DescriptorErrorKind::Expected("']' or ')'"))),
        };
        if lo > hi {
            return Err(self.error(DescriptorErrorKind::InvertedRange {
                lower: lo_text,
                upper: hi_text,
            }));
        }

        let mut integer = false;
        loop {
            self.skip_ws();
            if !self.peek().is_some_and(is_word_start) {
                break;
            }
            let start = self.pos;
            let word = self.word();
            match word {
                "integer" if integer => {
                    return Err(DescriptorError {
                        position: start,
                        kind: DescriptorErrorKind::DuplicateModifier(word.to_string()),
                    });
                }
                "integer" => integer = true,
                other => {
                    return Err(DescriptorError {
                        position: start,
                        kind: DescriptorErrorKind::UnknownModifier(other.to_string()),
                    });
                }
            }
        }

        let lower = if inclusive_lo {
            Bound::Inclusive(lo)
        } else {
            Bound::Exclusive(lo)
        };
        let upper = if inclusive_hi {
            Bound::Inclusive(hi)
        } else {
            Bound::Exclusive(hi)
        };
        Ok(RangeDescriptor {
            lower,
            upper,
            integer,
        })
    }

    fn set(&mut self) -> Result<SetDescriptor, DescriptorError> {
        self.bump();
        let mut members = BTreeSet::new();
        self.skip_ws();
        if self.peek() == Some('}') {
            self.bump();
            return Ok(SetDescriptor { members });
        }
        loop {
            self.skip_ws();
            members.insert(self.literal()?);
            self.skip_ws();
            match self.bump() {
                Some(',') => {
                    self.skip_ws();
                    if self.peek() == Some('}') {
                        self.bump();
                        break;
                    }
                }
                Some('}') => break,
                Some(c) => {
                    self.pos -= c.len_utf8();
                    return Err(self.error(DescriptorErrorKind::Unexpected(c)));
                }
                None => return Err(self.error(DescriptorErrorKind::Expected("'}'"))),
            }
        }
        Ok(SetDescriptor { members })
    }

    fn literal(&mut self) -> Result<String, DescriptorError> {
        match self.peek() {
            Some(quote @ ('\'' | '"')) => {
                let start = self.pos;
                self.bump();
                let body_start = self.pos;
                loop {
                    match self.bump() {
                        Some(c) if c == quote => {
                            return Ok(self.src[body_start..self.pos - 1].to_string());
                        }
                        Some(_) => {}
                        None => {
                            return Err(DescriptorError {
                                position: start,
                                kind: DescriptorErrorKind::UnterminatedString,
                            });
                        }
                    }
                }
            }
            Some(c) if is_number_start(c) => self.number().map(|(text, _)| text),
            Some(c) if is_word_start(c) => Ok(self.word().to_string()),
            Some(c) => Err(self.error(DescriptorErrorKind::Unexpected(c))),
            None => Err(self.error(DescriptorErrorKind::Expected("set member"))),
        }
    }

    fn word(&mut self) -> &'a str {
        let src = self.src;
        let start = self.pos;
        while self.peek().is_some_and(is_word_continue) {
            self.bump();
        }
        &src[start..self.pos]
    }

    fn number(&mut self) -> Result<(String, f64), DescriptorError> {
        let start = self.pos;
        if matches!(self.peek(), Some('+' | '-')) {
            self.bump();
        }
        let int_digits = self.digits();
        let mut frac_digits = 0;
        if self.peek() == Some('.') {
            self.bump();
            frac_digits = self.digits();
        }
        if int_digits + frac_digits == 0 {
            return Err(DescriptorError {
                position: start,
                kind: DescriptorErrorKind::Expected("number"),
            });
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            self.bump();
            if matches!(self.peek(), Some('+' | '-')) {
                self.bump();
            }
            if self.digits() == 0 {
                return Err(DescriptorError {
                    position: start,
                    kind: DescriptorErrorKind::InvalidNumber(self.src[start..self.pos].to_string()),
                });
            }
        }
        let text = &self.src[start..self.pos];
        match text.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok((text.to_string(), value)),
            _ => Err(DescriptorError {
                position: start,
                kind: DescriptorErrorKind::InvalidNumber(text.to_string()),
            }),
        }
    }

    fn digits(&mut self) -> usize {
        let mut count = 0;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            count += 1;
        }
        count
    }
}

fn is_number_start(c: char) -> bool {
    c.is_ascii_digit() || matches!(c, '+' | '-' | '.')
}

fn is_word_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_word_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '-')
}

#[cfg(test)]
mod tests {
    use super::{Bound, Descriptor, DescriptorErrorKind};

    #[test]
    fn parses_closed_and_half_open_ranges() {
        let range = Descriptor::parse_range("[0.0, 1.0]").unwrap();
        assert_eq!(range.lower, Bound::Inclusive(0.0));
        assert_eq!(range.upper, Bound::Inclusive(1.0));
        assert!(!range.integer);
        assert!(range.contains(0.0) && range.contains(1.0));

        let half = Descriptor::parse_range("(0, 10]").unwrap();
        assert!(!half.contains(0.0));
        assert!(half.contains(10.0));
    }

    #[test]
    fn integer_modifier_rejects_fractions() {
        let range = Descriptor::parse_range("[1, 50] integer").unwrap();
        assert!(range.integer);
        assert!(range.contains(7.0));
        assert!(!range.contains(7.5));
    }

    #[test]
    fn parses_sets_with_mixed_literals() {
        let set = Descriptor::parse_set("{text, 'tables', \"raw graph\", 3,}").unwrap();
        let members: Vec<&str> = set.members.iter().map(String::as_str).collect();
        assert_eq!(members, ["3", "raw graph", "tables", "text"]);
        assert!(Descriptor::parse_set("{}").unwrap().members.is_empty());
    }

    #[test]
    fn scientific_and_signed_numbers() {
        let range = Descriptor::parse_range("[-1e-3, +2.5E1]").unwrap();
        assert_eq!(range.lower, Bound::Inclusive(-0.001));
        assert_eq!(range.upper, Bound::Inclusive(25.0));
    }

    #[test]
    fn rejects_expression_like_input() {
        let err = Descriptor::parse("__import__('os')").unwrap_err();
        assert_eq!(err.kind, DescriptorErrorKind::Unexpected('_'));

        let err = Descriptor::parse("[0, 1 + 1]").unwrap_err();
        assert_eq!(err.kind, DescriptorErrorKind::Expected("']' or ')'"));

        let err = Descriptor::parse("{a} extra").unwrap_err();
        assert_eq!(err.kind, DescriptorErrorKind::Trailing);
    }

    #[test]
    fn rejects_inverted_ranges_and_bad_modifiers() {
        let err = Descriptor::parse("[2, 1]").unwrap_err();
        assert_eq!(
            err.kind,
            DescriptorErrorKind::InvertedRange {
                lower: "2".to_string(),
                upper: "1".to_string()
            }
        );
        let err = Descriptor::parse("[0, 1] float").unwrap_err();
        assert_eq!(
            err.kind,
            DescriptorErrorKind::UnknownModifier("float".to_string())
        );
        let err = Descriptor::parse("[0, 1] integer integer").unwrap_err();
        assert_eq!(
            err.kind,
            DescriptorErrorKind::DuplicateModifier("integer".to_string())
        );
    }

    #[test]
    fn reports_unterminated_strings_and_empty_input() {
        let err = Descriptor::parse("{'open}").unwrap_err();
        assert_eq!(err.kind, DescriptorErrorKind::UnterminatedString);
        assert_eq!(err.position, 1);
        assert_eq!(
            Descriptor::parse("   ").unwrap_err().kind,
            DescriptorErrorKind::Empty
        );
    }

    #[test]
    fn display_renders_canonical_form() {
        let d = Descriptor::parse("( 0 ,5 ) integer").unwrap();
        assert_eq!(d.to_string(), "(0, 5) integer");
        let s = Descriptor::parse("{b,a}").unwrap();
        assert_eq!(s.to_string(), "{'a', 'b'}");
    }
}
