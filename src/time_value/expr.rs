// Copyright (c) 2024 Mike Tsao

use crate::error::{Result, SchedulerError};
use core::{
    fmt::{self, Display},
    str::FromStr,
};
use serde::{Deserialize, Serialize};
use strum_macros::{Display as StrumDisplay, EnumIter, IntoStaticStr};

/// How a note value is stretched.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, EnumIter, IntoStaticStr,
)]
pub enum NoteModifier {
    /// As written.
    #[default]
    Straight,
    /// Half again as long (`"8n."`).
    Dotted,
    /// Two thirds as long (`"8t"`).
    Triplet,
}
impl NoteModifier {
    /// The factor applied to the plain note length.
    pub fn factor(&self) -> f64 {
        match self {
            NoteModifier::Straight => 1.0,
            NoteModifier::Dotted => 1.5,
            NoteModifier::Triplet => 2.0 / 3.0,
        }
    }
}

/// Musical note-length notation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Notation {
    /// A `1/divisor` note, so `divisor` 4 is a quarter note.
    Note {
        #[allow(missing_docs)]
        divisor: u32,
        #[allow(missing_docs)]
        modifier: NoteModifier,
    },
    /// Whole bars (`"2m"`), whose length depends on the time signature.
    Measures(f64),
}

/// A musical position written as `bars:beats:sixteenths`. Beats are quarter
/// notes regardless of the time signature.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TransportPosition {
    #[allow(missing_docs)]
    pub bars: f64,
    #[allow(missing_docs)]
    pub beats: f64,
    #[allow(missing_docs)]
    pub sixteenths: f64,
}
impl Display for TransportPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Three decimals of sixteenths is plenty, and it hides float noise.
        let sixteenths = (self.sixteenths * 1000.0).round() / 1000.0;
        write!(f, "{}:{}:{}", self.bars, self.beats, sixteenths)
    }
}

/// The arithmetic operators a [TimeExpr] can combine operands with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, StrumDisplay)]
pub enum Operator {
    #[allow(missing_docs)]
    #[strum(serialize = "+")]
    Add,
    #[allow(missing_docs)]
    #[strum(serialize = "-")]
    Subtract,
    #[allow(missing_docs)]
    #[strum(serialize = "*")]
    Multiply,
    #[allow(missing_docs)]
    #[strum(serialize = "/")]
    Divide,
}
impl Operator {
    fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(Self::Add),
            '-' => Some(Self::Subtract),
            '*' => Some(Self::Multiply),
            '/' => Some(Self::Divide),
            _ => None,
        }
    }
}

/// A time expression, parsed once and then resolved against a
/// [TimeContext](super::TimeContext) as many times as needed.
///
/// Parse one from a string with [str::parse()], or convert a bare number of
/// seconds with [From<f64>].
///
/// ```
/// use ensnare_scheduler::prelude::*;
///
/// let expr: TimeExpr = "2*1:2 - 1m".parse().unwrap();
/// let seconds = TimeContext::default().resolve(&expr).unwrap();
/// assert_eq!(seconds.0, 4.0);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TimeExpr {
    /// A unitless number. Alone it means seconds. As an operand of `*` or `/`
    /// it's a scale factor.
    Number(f64),
    /// Explicit seconds (`"1.5s"`).
    Seconds(f64),
    /// Ticks (`"96i"`).
    Ticks(i64),
    /// Audio sample frames (`"441samples"`).
    Samples(u64),
    /// The period of a frequency (`"2hz"` is half a second).
    Hertz(f64),
    /// Note lengths and measures.
    Notation(Notation),
    /// An absolute musical position.
    Position(TransportPosition),
    /// An offset from the context's "now" (`"+4n"`).
    Now(Box<TimeExpr>),
    /// Two operands combined by an operator. Chains are folded strictly left
    /// to right, without precedence, so `a + b * c` is `(a + b) * c`.
    Binary {
        #[allow(missing_docs)]
        op: Operator,
        #[allow(missing_docs)]
        lhs: Box<TimeExpr>,
        #[allow(missing_docs)]
        rhs: Box<TimeExpr>,
    },
}
impl From<f64> for TimeExpr {
    fn from(seconds: f64) -> Self {
        Self::Number(seconds)
    }
}
impl FromStr for TimeExpr {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if let Some(rest) = trimmed.strip_prefix('+') {
            return Ok(Self::Now(Box::new(Self::parse_chain(rest)?)));
        }
        Self::parse_chain(trimmed)
    }
}
impl Display for TimeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeExpr::Number(n) => write!(f, "{n}"),
            TimeExpr::Seconds(s) => write!(f, "{s}s"),
            TimeExpr::Ticks(t) => write!(f, "{t}i"),
            TimeExpr::Samples(s) => write!(f, "{s}samples"),
            TimeExpr::Hertz(hz) => write!(f, "{hz}hz"),
            TimeExpr::Notation(Notation::Measures(m)) => write!(f, "{m}m"),
            TimeExpr::Notation(Notation::Note { divisor, modifier }) => match modifier {
                NoteModifier::Straight => write!(f, "{divisor}n"),
                NoteModifier::Dotted => write!(f, "{divisor}n."),
                NoteModifier::Triplet => write!(f, "{divisor}t"),
            },
            TimeExpr::Position(p) => write!(f, "{p}"),
            TimeExpr::Now(offset) => write!(f, "+{offset}"),
            TimeExpr::Binary { op, lhs, rhs } => write!(f, "{lhs} {op} {rhs}"),
        }
    }
}
impl TimeExpr {
    /// Whether this expression depends on the context's "now".
    pub fn is_relative(&self) -> bool {
        match self {
            TimeExpr::Now(_) => true,
            TimeExpr::Binary { lhs, rhs, .. } => lhs.is_relative() || rhs.is_relative(),
            _ => false,
        }
    }

    fn parse_chain(s: &str) -> Result<Self> {
        let (first, rest) = Self::split_operands(s)?;
        let mut expr = Self::parse_operand(&first)?;
        for (op, operand) in rest {
            expr = TimeExpr::Binary {
                op,
                lhs: Box::new(expr),
                rhs: Box::new(Self::parse_operand(&operand)?),
            };
        }
        Ok(expr)
    }

    /// Splits on operators. A `-` that appears where an operand should start
    /// is a sign, not subtraction.
    fn split_operands(s: &str) -> Result<(String, Vec<(Operator, String)>)> {
        let mut first: Option<String> = None;
        let mut rest = Vec::default();
        let mut pending_op: Option<Operator> = None;
        let mut current = String::new();

        let mut finish = |current: &mut String,
                          pending_op: &mut Option<Operator>,
                          first: &mut Option<String>|
         -> Result<()> {
            let operand = core::mem::take(current).trim().to_string();
            if operand.is_empty() {
                return Err(SchedulerError::parse(s, "expected an operand"));
            }
            match pending_op.take() {
                Some(op) => rest.push((op, operand)),
                None => *first = Some(operand),
            }
            Ok(())
        };

        for c in s.chars() {
            match Operator::from_char(c) {
                Some(Operator::Subtract) if current.trim().is_empty() => current.push(c),
                Some(op) => {
                    if current.trim().is_empty() {
                        return Err(SchedulerError::parse(
                            c.to_string(),
                            "operator without a left operand",
                        ));
                    }
                    finish(&mut current, &mut pending_op, &mut first)?;
                    pending_op = Some(op);
                }
                None => current.push(c),
            }
        }
        finish(&mut current, &mut pending_op, &mut first)?;
        match first {
            Some(first) => Ok((first, rest)),
            None => Err(SchedulerError::parse(s, "empty time expression")),
        }
    }

    fn parse_operand(token: &str) -> Result<Self> {
        let lower = token.to_ascii_lowercase();
        if lower.contains(':') {
            return Self::parse_position(token);
        }
        if let Some(number) = lower.strip_suffix("samples") {
            return Ok(TimeExpr::Samples(Self::parse_integer(token, number)?));
        }
        if let Some(number) = lower.strip_suffix("hz") {
            return Ok(TimeExpr::Hertz(Self::parse_number(token, number)?));
        }
        if let Some(number) = lower.strip_suffix("n.") {
            return Self::parse_note(token, number, NoteModifier::Dotted);
        }
        if let Some(number) = lower.strip_suffix('n') {
            return Self::parse_note(token, number, NoteModifier::Straight);
        }
        if let Some(number) = lower.strip_suffix('t') {
            return Self::parse_note(token, number, NoteModifier::Triplet);
        }
        if let Some(number) = lower.strip_suffix('m') {
            return Ok(TimeExpr::Notation(Notation::Measures(Self::parse_number(
                token, number,
            )?)));
        }
        if let Some(number) = lower.strip_suffix('i') {
            return number
                .parse::<i64>()
                .map(TimeExpr::Ticks)
                .map_err(|_| SchedulerError::parse(token, "ticks must be a whole number"));
        }
        if let Some(number) = lower.strip_suffix('s') {
            return Ok(TimeExpr::Seconds(Self::parse_number(token, number)?));
        }
        if lower.starts_with(|c: char| c.is_ascii_digit() || c == '.' || c == '-') {
            if let Ok(n) = lower.parse::<f64>() {
                return Self::finite(token, n).map(TimeExpr::Number);
            }
            let suffix: String = lower
                .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == '-')
                .to_string();
            return Err(SchedulerError::parse(
                token,
                format!("unknown unit suffix '{suffix}'"),
            ));
        }
        Err(SchedulerError::parse(token, "not a time value"))
    }

    fn finite(token: &str, n: f64) -> Result<f64> {
        if n.is_finite() {
            Ok(n)
        } else {
            Err(SchedulerError::parse(token, "number must be finite"))
        }
    }

    fn parse_number(token: &str, number: &str) -> Result<f64> {
        let n = number
            .parse::<f64>()
            .map_err(|_| SchedulerError::parse(token, format!("'{number}' isn't a number")))?;
        Self::finite(token, n)
    }

    fn parse_integer(token: &str, number: &str) -> Result<u64> {
        number
            .parse::<u64>()
            .map_err(|_| SchedulerError::parse(token, format!("'{number}' isn't a whole number")))
    }

    fn parse_note(token: &str, number: &str, modifier: NoteModifier) -> Result<Self> {
        match number.parse::<u32>() {
            Ok(divisor) if divisor > 0 => Ok(TimeExpr::Notation(Notation::Note {
                divisor,
                modifier,
            })),
            _ => Err(SchedulerError::parse(
                token,
                "note values need a positive whole-number divisor",
            )),
        }
    }

    fn parse_position(token: &str) -> Result<Self> {
        let parts: Vec<&str> = token.split(':').map(str::trim).collect();
        if parts.len() > 3 {
            return Err(SchedulerError::parse(
                token,
                "positions have at most bars:beats:sixteenths",
            ));
        }
        let mut values = [0.0; 3];
        for (value, part) in values.iter_mut().zip(parts.iter()) {
            *value = Self::parse_number(token, part)?;
        }
        Ok(TimeExpr::Position(TransportPosition {
            bars: values[0],
            beats: values[1],
            sixteenths: values[2],
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    fn parse(s: &str) -> TimeExpr {
        s.parse()
            .unwrap_or_else(|e| panic!("'{s}' should parse, but got {e}"))
    }

    #[test]
    fn leaves() {
        for (input, expected) in [
            ("1.5", TimeExpr::Number(1.5)),
            ("-2", TimeExpr::Number(-2.0)),
            ("0.25s", TimeExpr::Seconds(0.25)),
            ("96i", TimeExpr::Ticks(96)),
            ("441samples", TimeExpr::Samples(441)),
            ("2hz", TimeExpr::Hertz(2.0)),
            ("440Hz", TimeExpr::Hertz(440.0)),
            ("1.5m", TimeExpr::Notation(Notation::Measures(1.5))),
            (
                "4n",
                TimeExpr::Notation(Notation::Note {
                    divisor: 4,
                    modifier: NoteModifier::Straight,
                }),
            ),
            (
                "8n.",
                TimeExpr::Notation(Notation::Note {
                    divisor: 8,
                    modifier: NoteModifier::Dotted,
                }),
            ),
            (
                "8t",
                TimeExpr::Notation(Notation::Note {
                    divisor: 8,
                    modifier: NoteModifier::Triplet,
                }),
            ),
            (
                "1:2",
                TimeExpr::Position(TransportPosition {
                    bars: 1.0,
                    beats: 2.0,
                    sixteenths: 0.0,
                }),
            ),
            (
                " 3:0:2 ",
                TimeExpr::Position(TransportPosition {
                    bars: 3.0,
                    beats: 0.0,
                    sixteenths: 2.0,
                }),
            ),
        ] {
            assert_eq!(parse(input), expected, "while parsing '{input}'");
        }
    }

    #[test]
    fn chains_fold_left_to_right() {
        let expr = parse("2*1:2 - 1m");
        let TimeExpr::Binary { op, lhs, rhs } = expr else {
            panic!("expected a binary expression");
        };
        assert_eq!(op, Operator::Subtract);
        assert_eq!(*rhs, TimeExpr::Notation(Notation::Measures(1.0)));
        assert!(
            matches!(*lhs, TimeExpr::Binary { op: Operator::Multiply, .. }),
            "the multiplication should be folded first"
        );

        let expr = parse("1 + 2 * 3");
        let TimeExpr::Binary { op, .. } = expr else {
            panic!("expected a binary expression");
        };
        assert_eq!(
            op,
            Operator::Multiply,
            "no precedence: the last operator is outermost"
        );
    }

    #[test]
    fn relative_expressions() {
        let expr = parse("+4n");
        assert!(expr.is_relative());
        assert!(matches!(expr, TimeExpr::Now(_)));
        assert!(!parse("4n + 1m").is_relative());
        assert_eq!(parse("+1m + 4n").to_string(), "+1m + 4n");
    }

    #[test]
    fn negative_operands() {
        let expr = parse("1m - -1");
        let TimeExpr::Binary { op, rhs, .. } = expr else {
            panic!("expected a binary expression");
        };
        assert_eq!(op, Operator::Subtract);
        assert_eq!(*rhs, TimeExpr::Number(-1.0));
    }

    #[test]
    fn malformed_input_names_the_token() {
        for (input, token) in [
            ("4q", "4q"),
            ("0n", "0n"),
            ("1.5n", "1.5n"),
            ("1:2:3:4", "1:2:3:4"),
            ("1:x", "1:x"),
            ("abc", "abc"),
            ("1.5i", "1.5i"),
        ] {
            match input.parse::<TimeExpr>() {
                Err(SchedulerError::Parse { token: t, .. }) => {
                    assert_eq!(t, token, "wrong token reported for '{input}'")
                }
                other => panic!("'{input}' should fail to parse, but got {other:?}"),
            }
        }
        assert!("".parse::<TimeExpr>().is_err());
        assert!("1 +".parse::<TimeExpr>().is_err());
        assert!("* 2".parse::<TimeExpr>().is_err());
        assert!("inf".parse::<TimeExpr>().is_err());
    }

    #[test]
    fn display_matches_notation() {
        for input in ["4n", "8n.", "8t", "2m", "96i", "2hz", "1.5s", "441samples", "1:2:0"] {
            assert_eq!(parse(input).to_string(), input);
        }
        assert_eq!(TimeExpr::from(0.5).to_string(), "0.5");
    }

    #[test]
    fn modifier_factors() {
        let factors: Vec<f64> = NoteModifier::iter().map(|m| m.factor()).collect();
        assert_eq!(factors, vec![1.0, 1.5, 2.0 / 3.0]);
    }
}
