// Copyright (c) 2024 Mike Tsao

//! Tempo, meter, and wall-clock units.

use crate::error::SchedulerError;
use core::fmt::{self, Display};
use derivative::Derivative;
use serde::{Deserialize, Serialize};
use synonym::Synonym;

/// Beats per minute.
#[derive(Synonym, Serialize, Deserialize, Derivative)]
#[derivative(Default)]
#[synonym(skip(Default, Display))]
#[serde(rename_all = "kebab-case")]
pub struct Tempo(#[derivative(Default(value = "120.0"))] pub f64);
impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:0.2} BPM", self.0))
    }
}
impl From<u16> for Tempo {
    fn from(value: u16) -> Self {
        Self(value as f64)
    }
}
impl Tempo {
    /// Returns a [Tempo] if `bpm` is a positive, finite number. There is no
    /// upper bound.
    pub fn new_with(bpm: f64) -> crate::Result<Self> {
        if bpm.is_finite() && bpm > 0.0 {
            Ok(Self(bpm))
        } else {
            Err(SchedulerError::range(format!(
                "tempo must be positive, but got {bpm}"
            )))
        }
    }

    /// Beats per second.
    pub fn bps(&self) -> f64 {
        self.0 / 60.0
    }

    /// The length of one quarter note.
    pub fn seconds_per_quarter(&self) -> f64 {
        60.0 / self.0
    }
}

/// [TimeSignature] represents a music [time
/// signature](https://en.wikipedia.org/wiki/Time_signature).
///
/// The top number of a time signature tells how many beats are in a measure.
/// The bottom number tells the value of a beat. For example, if the bottom
/// number is 4, then a beat is a quarter-note. And if the top number is 4, then
/// you should expect to see four beats in a measure, or four quarter-notes in a
/// measure.
///
/// Musical notation in this crate counts in quarter notes, so a bar of 6/8 is
/// three quarters long and a bar of 2/2 is four.
#[derive(Clone, Copy, Debug, Derivative, Eq, PartialEq, Serialize, Deserialize)]
#[derivative(Default)]
#[serde(rename_all = "kebab-case")]
pub struct TimeSignature {
    /// The number of beats in a measure.
    #[derivative(Default(value = "4"))]
    pub top: usize,

    /// The value of a beat. Expressed as a reciprocal; for example, if it's 4,
    /// then the beat value is 1/4 or a quarter note.
    #[derivative(Default(value = "4"))]
    pub bottom: usize,
}
impl Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{}/{}", self.top, self.bottom))
    }
}
impl TimeSignature {
    /// C time = common time = 4/4
    /// <https://en.wikipedia.org/wiki/Time_signature>
    pub const COMMON_TIME: Self = TimeSignature { top: 4, bottom: 4 };

    /// 𝄵 time = cut common time = alla breve = 2/2
    /// <https://en.wikipedia.org/wiki/Time_signature>
    pub const CUT_TIME: Self = TimeSignature { top: 2, bottom: 2 };

    /// The largest beat value we accept, a 256th note.
    pub const MAX_BOTTOM: usize = 256;

    /// Returns a validated [TimeSignature]. The top must be nonzero and the
    /// bottom a power of two no larger than [TimeSignature::MAX_BOTTOM].
    pub fn new_with(top: usize, bottom: usize) -> crate::Result<Self> {
        if top == 0 {
            Err(SchedulerError::range("time signature top can't be zero"))
        } else if !bottom.is_power_of_two() || bottom > Self::MAX_BOTTOM {
            Err(SchedulerError::range(format!(
                "time signature bottom must be a power of two up to {}, but got {bottom}",
                Self::MAX_BOTTOM
            )))
        } else {
            Ok(Self { top, bottom })
        }
    }

    /// The length of one bar, counted in quarter notes.
    pub fn quarters_per_bar(&self) -> f64 {
        self.top as f64 * 4.0 / self.bottom as f64
    }

    /// The top value.
    pub fn top(&self) -> usize {
        self.top
    }

    /// The bottom value.
    pub fn bottom(&self) -> usize {
        self.bottom
    }
}

/// Represents the [seconds](https://en.wikipedia.org/wiki/Second) unit of time.
#[derive(Synonym, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Seconds(pub f64);
impl Seconds {
    /// Zero seconds.
    pub const fn zero() -> Seconds {
        Seconds(0.0)
    }

    /// Returns the number of whole sample frames that have elapsed by this
    /// point in time.
    pub fn to_frames(&self, sample_rate: SampleRate) -> usize {
        (self.0 * f64::from(sample_rate)).floor().max(0.0) as usize
    }
}
impl From<f32> for Seconds {
    fn from(value: f32) -> Self {
        Self(value as f64)
    }
}
impl From<Seconds> for f32 {
    fn from(value: Seconds) -> Self {
        value.0 as f32
    }
}

/// Samples per second. Always a positive integer; cannot be zero.
#[derive(Synonym, Serialize, Deserialize, Derivative)]
#[derivative(Default)]
#[synonym(skip(Default))]
#[serde(rename_all = "kebab-case")]
pub struct SampleRate(#[derivative(Default(value = "44100"))] pub usize);
#[allow(missing_docs)]
impl SampleRate {
    pub const DEFAULT_SAMPLE_RATE: usize = 44100;
    pub const DEFAULT: SampleRate = SampleRate::new(Self::DEFAULT_SAMPLE_RATE);

    pub const fn new(value: usize) -> Self {
        if value != 0 {
            Self(value)
        } else {
            Self(Self::DEFAULT_SAMPLE_RATE)
        }
    }
}
impl From<SampleRate> for f64 {
    fn from(value: SampleRate) -> Self {
        value.0 as f64
    }
}
