//! Motion command types.
//!
//! A command is a 2-field motion vector: a throttle fraction and a heading in
//! whole degrees. Both fields are validated on construction and on decode;
//! out-of-range values are rejected, never clamped.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced when building a command from raw numbers.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum CommandError {
    #[error("speed {0} is outside [0, 1]")]
    SpeedOutOfRange(f64),

    #[error("angle {0} is outside [0, 360]")]
    AngleOutOfRange(u16),
}

/// Fraction of maximum throttle, in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Speed(f64);

impl Speed {
    /// Zero throttle.
    pub const STOP: Self = Self(0.0);

    pub fn new(value: f64) -> Result<Self, CommandError> {
        if value.is_finite() && (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(CommandError::SpeedOutOfRange(value))
        }
    }

    #[must_use]
    pub fn get(self) -> f64 {
        self.0
    }

    #[must_use]
    pub fn is_stop(self) -> bool {
        // Validated values are never negative.
        self.0 <= 0.0
    }
}

impl TryFrom<f64> for Speed {
    type Error = CommandError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Speed> for f64 {
    fn from(speed: Speed) -> Self {
        speed.0
    }
}

/// Heading in whole degrees, in `[0, 360]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Angle(u16);

impl Angle {
    /// Largest accepted heading.
    pub const MAX: u16 = 360;

    pub fn new(degrees: u16) -> Result<Self, CommandError> {
        if degrees <= Self::MAX {
            Ok(Self(degrees))
        } else {
            Err(CommandError::AngleOutOfRange(degrees))
        }
    }

    #[must_use]
    pub fn degrees(self) -> u16 {
        self.0
    }
}

impl TryFrom<u16> for Angle {
    type Error = CommandError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Angle> for u16 {
    fn from(angle: Angle) -> Self {
        angle.0
    }
}

/// A motion command from the operator to the robot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub speed: Speed,
    pub angle: Angle,
}

impl Command {
    /// Build a command from raw values, validating both fields.
    pub fn new(speed: f64, angle: u16) -> Result<Self, CommandError> {
        Ok(Self {
            speed: Speed::new(speed)?,
            angle: Angle::new(angle)?,
        })
    }

    /// A zero-throttle command keeping the given heading.
    #[must_use]
    pub fn stop(angle: Angle) -> Self {
        Self {
            speed: Speed::STOP,
            angle,
        }
    }

    /// Whether this command brings the robot to a halt.
    #[must_use]
    pub fn is_stop(&self) -> bool {
        self.speed.is_stop()
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "speed={:.2} angle={}", self.speed.get(), self.angle.degrees())
    }
}
