// Copyright (c) 2024 Mike Tsao

use super::{Notation, Operator, TimeExpr, TransportPosition};
use crate::{
    error::{Result, SchedulerError},
    traits::Configurable,
    types::{SampleRate, Seconds, Tempo, TimeSignature},
};
use derivative::Derivative;

/// A snapshot of everything needed to turn a [TimeExpr] into seconds.
///
/// A [TimeContext] is a plain value. Every operand of an expression resolves
/// against the same snapshot, so a tempo change can never land halfway through
/// an evaluation.
#[derive(Clone, Copy, Debug, Derivative, PartialEq)]
#[derivative(Default)]
pub struct TimeContext {
    tempo: Tempo,
    time_signature: TimeSignature,
    #[derivative(Default(value = "192"))]
    ppq: u32,
    sample_rate: SampleRate,
    now: f64,
}

/// An intermediate result. Bare numbers stay scalars until they must become
/// seconds.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Quantity {
    Scalar(f64),
    Time(f64),
}
impl Quantity {
    fn seconds(self) -> f64 {
        match self {
            Quantity::Scalar(v) | Quantity::Time(v) => v,
        }
    }
}

impl TimeContext {
    #[allow(missing_docs)]
    pub fn new_with(tempo: Tempo, time_signature: TimeSignature, ppq: u32) -> Result<Self> {
        if ppq == 0 {
            return Err(SchedulerError::range("PPQ must be positive"));
        }
        Tempo::new_with(tempo.0)?;
        TimeSignature::new_with(time_signature.top, time_signature.bottom)?;
        Ok(Self {
            tempo,
            time_signature,
            ppq,
            ..Default::default()
        })
    }

    /// Assembles a context from settings that the caller has already
    /// validated.
    pub(crate) fn from_parts(
        tempo: Tempo,
        time_signature: TimeSignature,
        ppq: u32,
        sample_rate: SampleRate,
    ) -> Self {
        Self {
            tempo,
            time_signature,
            ppq,
            sample_rate,
            now: 0.0,
        }
    }

    /// Returns a copy whose "now" is `now` seconds.
    pub fn with_now(mut self, now: f64) -> Self {
        self.now = now;
        self
    }

    /// Returns a copy that resolves sample counts at `sample_rate`.
    pub fn with_sample_rate(mut self, sample_rate: SampleRate) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    #[allow(missing_docs)]
    pub fn now(&self) -> f64 {
        self.now
    }

    #[allow(missing_docs)]
    pub fn ppq(&self) -> u32 {
        self.ppq
    }

    #[allow(missing_docs)]
    pub fn seconds_per_quarter(&self) -> f64 {
        self.tempo.seconds_per_quarter()
    }

    #[allow(missing_docs)]
    pub fn seconds_per_tick(&self) -> f64 {
        self.seconds_per_quarter() / self.ppq as f64
    }

    #[allow(missing_docs)]
    pub fn seconds_per_bar(&self) -> f64 {
        self.time_signature.quarters_per_bar() * self.seconds_per_quarter()
    }

    #[allow(missing_docs)]
    pub fn seconds_to_ticks(&self, seconds: f64) -> f64 {
        seconds / self.seconds_per_tick()
    }

    #[allow(missing_docs)]
    pub fn ticks_to_seconds(&self, ticks: f64) -> f64 {
        ticks * self.seconds_per_tick()
    }

    /// Resolves `expr` to seconds.
    pub fn resolve(&self, expr: &TimeExpr) -> Result<Seconds> {
        Ok(Seconds(self.evaluate(expr)?.seconds()))
    }

    /// Resolves `expr` to ticks at this context's tempo and PPQ.
    pub fn to_ticks(&self, expr: &TimeExpr) -> Result<f64> {
        Ok(self.seconds_to_ticks(self.resolve(expr)?.0))
    }

    /// Expresses a duration as bars:beats:sixteenths in this context's
    /// time signature.
    pub fn seconds_to_position(&self, seconds: f64) -> TransportPosition {
        let quarters = seconds / self.seconds_per_quarter();
        let quarters_per_bar = self.time_signature.quarters_per_bar();
        let bars = (quarters / quarters_per_bar).floor();
        let remaining = quarters - bars * quarters_per_bar;
        let beats = remaining.floor();
        TransportPosition {
            bars,
            beats,
            sixteenths: (remaining - beats) * 4.0,
        }
    }

    fn evaluate(&self, expr: &TimeExpr) -> Result<Quantity> {
        let quarter = self.seconds_per_quarter();
        Ok(match expr {
            TimeExpr::Number(n) => Quantity::Scalar(*n),
            TimeExpr::Seconds(s) => Quantity::Time(*s),
            TimeExpr::Ticks(t) => Quantity::Time(*t as f64 * self.seconds_per_tick()),
            TimeExpr::Samples(s) => Quantity::Time(*s as f64 / f64::from(self.sample_rate)),
            TimeExpr::Hertz(hz) => {
                if *hz <= 0.0 {
                    return Err(SchedulerError::range(format!(
                        "a frequency of {hz}hz has no period"
                    )));
                }
                Quantity::Time(1.0 / hz)
            }
            TimeExpr::Notation(Notation::Note { divisor, modifier }) => {
                Quantity::Time(4.0 / *divisor as f64 * quarter * modifier.factor())
            }
            TimeExpr::Notation(Notation::Measures(m)) => Quantity::Time(m * self.seconds_per_bar()),
            TimeExpr::Position(p) => Quantity::Time(
                p.bars * self.seconds_per_bar() + p.beats * quarter + p.sixteenths * quarter / 4.0,
            ),
            TimeExpr::Now(offset) => Quantity::Time(self.now + self.evaluate(offset)?.seconds()),
            TimeExpr::Binary { op, lhs, rhs } => {
                Self::combine(*op, self.evaluate(lhs)?, self.evaluate(rhs)?)?
            }
        })
    }

    fn combine(op: Operator, lhs: Quantity, rhs: Quantity) -> Result<Quantity> {
        use Quantity::{Scalar, Time};
        Ok(match (op, lhs, rhs) {
            (Operator::Add, Scalar(a), Scalar(b)) => Scalar(a + b),
            (Operator::Add, a, b) => Time(a.seconds() + b.seconds()),
            (Operator::Subtract, Scalar(a), Scalar(b)) => Scalar(a - b),
            (Operator::Subtract, a, b) => Time(a.seconds() - b.seconds()),
            (Operator::Multiply, Time(_), Time(_)) => {
                return Err(SchedulerError::Unit(
                    "can't multiply a time by a time".to_string(),
                ))
            }
            (Operator::Multiply, Scalar(a), Scalar(b)) => Scalar(a * b),
            (Operator::Multiply, a, b) => Time(a.seconds() * b.seconds()),
            (Operator::Divide, _, Time(_)) => {
                return Err(SchedulerError::Unit(
                    "can't divide by a time; divisors must be plain numbers".to_string(),
                ))
            }
            (Operator::Divide, _, Scalar(b)) if b == 0.0 => {
                return Err(SchedulerError::range("division by zero"))
            }
            (Operator::Divide, Scalar(a), Scalar(b)) => Scalar(a / b),
            (Operator::Divide, Time(a), Scalar(b)) => Time(a / b),
        })
    }
}
impl Configurable for TimeContext {
    fn tempo(&self) -> Tempo {
        self.tempo
    }

    fn update_tempo(&mut self, tempo: Tempo) -> Result<()> {
        self.tempo = Tempo::new_with(tempo.0)?;
        Ok(())
    }

    fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    fn update_time_signature(&mut self, time_signature: TimeSignature) -> Result<()> {
        self.time_signature = TimeSignature::new_with(time_signature.top, time_signature.bottom)?;
        Ok(())
    }

    fn sample_rate(&self) -> SampleRate {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::approx_eq;

    fn resolve_at(context: &TimeContext, input: &str) -> f64 {
        let expr: TimeExpr = input.parse().unwrap();
        context
            .resolve(&expr)
            .unwrap_or_else(|e| panic!("'{input}' should resolve, but got {e}"))
            .0
    }

    fn context(bpm: f64) -> TimeContext {
        TimeContext::new_with(Tempo(bpm), TimeSignature::COMMON_TIME, 192).unwrap()
    }

    #[test]
    fn quarter_note_follows_tempo() {
        assert_eq!(resolve_at(&context(120.0), "4n"), 0.5);
        assert_eq!(resolve_at(&context(240.0), "4n"), 0.25);
    }

    #[test]
    fn notation_at_120_bpm() {
        let c = context(120.0);
        for (input, expected) in [
            ("1n", 2.0),
            ("2n", 1.0),
            ("8n", 0.25),
            ("8n.", 0.375),
            ("4t", 1.0 / 3.0),
            ("1m", 2.0),
            ("0.5m", 1.0),
            ("192i", 0.5),
            ("2hz", 0.5),
            ("1.25", 1.25),
            ("1.25s", 1.25),
            ("44100samples", 1.0),
            ("1:0:0", 2.0),
            ("0:1", 0.5),
            ("0:0:1", 0.125),
            ("1:2:2", 3.25),
        ] {
            let actual = resolve_at(&c, input);
            assert!(
                approx_eq!(f64, actual, expected, epsilon = 1e-12),
                "'{input}' should be {expected}s, but was {actual}s"
            );
        }
    }

    #[test]
    fn mixed_arithmetic() {
        let c = context(120.0);
        assert_eq!(resolve_at(&c, "2*1:2 - 1m"), 4.0);
        assert_eq!(resolve_at(&c, "1m + 4n"), 2.5);
        assert_eq!(resolve_at(&c, "1m / 2"), 1.0);
        assert_eq!(resolve_at(&c, "4n * 3"), 1.5);
        assert_eq!(resolve_at(&c, "3 * 2"), 6.0, "scalars alone are seconds");
        assert_eq!(
            resolve_at(&c, "1 + 4n * 2"),
            3.0,
            "left to right: (1 + 0.5) * 2 multiplies a time by a scalar"
        );
    }

    #[test]
    fn unit_errors() {
        let c = context(120.0);
        for input in ["4n * 4n", "1m / 4n", "2 / 4n", "1s * 1:0"] {
            let expr: TimeExpr = input.parse().unwrap();
            assert!(
                matches!(c.resolve(&expr), Err(SchedulerError::Unit(_))),
                "'{input}' should be a unit error"
            );
        }
        let expr: TimeExpr = "1m / 0".parse().unwrap();
        assert!(matches!(c.resolve(&expr), Err(SchedulerError::Range(_))));
        let expr: TimeExpr = "0hz".parse().unwrap();
        assert!(matches!(c.resolve(&expr), Err(SchedulerError::Range(_))));
    }

    #[test]
    fn relative_to_now() {
        let c = context(120.0).with_now(10.0);
        assert_eq!(resolve_at(&c, "+4n"), 10.5);
        assert_eq!(resolve_at(&c, "+1m + 4n"), 12.5);
        assert_eq!(resolve_at(&c, "4n"), 0.5, "absolute times ignore now");
    }

    #[test]
    fn time_signature_changes_bar_length() {
        let mut c = context(120.0);
        c.update_time_signature(TimeSignature::new_with(6, 8).unwrap())
            .unwrap();
        assert_eq!(resolve_at(&c, "1m"), 1.5);
        assert_eq!(resolve_at(&c, "1:1"), 2.0);

        assert!(c.update_tempo(Tempo(0.0)).is_err());
        assert!(c
            .update_time_signature(TimeSignature { top: 3, bottom: 3 })
            .is_err());
        assert_eq!(c.tempo(), Tempo(120.0), "failed updates change nothing");
    }

    #[test]
    fn ticks_and_positions() {
        let c = context(120.0);
        let ticks = c.to_ticks(&"1m".parse().unwrap()).unwrap();
        assert!(approx_eq!(f64, ticks, 768.0, epsilon = 1e-9));
        assert!(approx_eq!(f64, c.ticks_to_seconds(96.0), 0.25, epsilon = 1e-12));

        let p = c.seconds_to_position(3.25);
        assert_eq!(p.to_string(), "1:2:2");

        assert!(TimeContext::new_with(Tempo(120.0), TimeSignature::default(), 0).is_err());
    }
}
