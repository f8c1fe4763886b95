//! # Ramp Profile
//!
//! Generates the triangular torque ramp driven through a motor: a linear ascent from zero to the
//! target in fixed increments, the same values back down, then a short run into the negative
//! region (the overshoot).
//!
//! The profile is a plain value, every call to [`RampProfile::iter`] starts the sequence again
//! from the first setpoint and yields the same values.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Relative tolerance used when checking that the step evenly divides the target.
const DIVIDE_TOLERANCE: f64 = 1e-9;

/// Upper bound on the number of ascending increments.
pub const MAX_STEPS: u64 = 100_000_000;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A validated ramp profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampProfile {
    step: f64,
    target: f64,
    num_steps: usize,
    overshoot_len: usize,
}

/// Iterator over the setpoints of a [`RampProfile`].
#[derive(Debug, Clone)]
pub struct RampIter {
    profile: RampProfile,
    idx: usize,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Phase of the ramp a setpoint belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampPhase {
    Ascending,
    Descending,
}

#[derive(Debug, Error, PartialEq)]
pub enum RampProfileError {
    #[error("The step must be positive and finite, got {0}")]
    InvalidStep(f64),

    #[error("The target must be positive (or zero) and finite, got {0}")]
    InvalidTarget(f64),

    #[error("The step {step} does not evenly divide the target {target}")]
    StepDoesNotDivideTarget { step: f64, target: f64 },

    #[error("A step of {step} to {target} needs more than {max} increments")]
    TooManySteps { step: f64, target: f64, max: u64 },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RampProfile {
    /// Build a profile going from zero to `target` in increments of `step`, followed by
    /// `overshoot_len` negated values.
    ///
    /// The overshoot is truncated to the length of the ascending segment.
    pub fn new(step: f64, target: f64, overshoot_len: usize) -> Result<Self, RampProfileError> {
        if !step.is_finite() || step <= 0.0 {
            return Err(RampProfileError::InvalidStep(step));
        }

        if !target.is_finite() || target < 0.0 {
            return Err(RampProfileError::InvalidTarget(target));
        }

        let ratio = (target / step).round();
        if ratio > MAX_STEPS as f64 {
            return Err(RampProfileError::TooManySteps {
                step,
                target,
                max: MAX_STEPS,
            });
        }

        if (ratio * step - target).abs() > DIVIDE_TOLERANCE * target.max(step) {
            return Err(RampProfileError::StepDoesNotDivideTarget { step, target });
        }

        let num_steps = ratio as usize;

        Ok(Self {
            step,
            target,
            num_steps,
            overshoot_len: overshoot_len.min(num_steps + 1),
        })
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    /// Number of setpoints in the ascending segment, `target / step + 1`.
    pub fn ascending_len(&self) -> usize {
        self.num_steps + 1
    }

    /// Number of negated setpoints appended after the descent.
    pub fn overshoot_len(&self) -> usize {
        self.overshoot_len
    }

    /// Total number of setpoints, and so of control loop ticks.
    pub fn len(&self) -> usize {
        2 * self.ascending_len() + self.overshoot_len
    }

    /// A profile always contains at least the zero setpoint.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The `i`th ascending value.
    ///
    /// Values are computed from the index rather than accumulated so the last one is exactly the
    /// target.
    fn ascending_value(&self, i: usize) -> f64 {
        if i >= self.num_steps {
            self.target
        } else {
            i as f64 * self.step
        }
    }

    /// Setpoint at position `idx` of the whole profile.
    pub fn get(&self, idx: usize) -> Option<(RampPhase, f64)> {
        let asc_len = self.ascending_len();

        if idx < asc_len {
            Some((RampPhase::Ascending, self.ascending_value(idx)))
        } else if idx < 2 * asc_len {
            let j = idx - asc_len;
            Some((RampPhase::Descending, self.ascending_value(asc_len - 1 - j)))
        } else if idx < self.len() {
            let k = idx - 2 * asc_len;
            Some((RampPhase::Descending, -self.ascending_value(k)))
        } else {
            None
        }
    }

    /// Iterate over the setpoints from the start.
    pub fn iter(&self) -> RampIter {
        RampIter {
            profile: *self,
            idx: 0,
        }
    }

    /// The ascending segment alone.
    pub fn ascending(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.ascending_len()).map(move |i| self.ascending_value(i))
    }

    /// The descending segment alone (reversed ascent then overshoot).
    pub fn descending(&self) -> impl Iterator<Item = f64> + '_ {
        self.iter()
            .skip_while(|(p, _)| *p == RampPhase::Ascending)
            .map(|(_, v)| v)
    }
}

impl<'a> IntoIterator for &'a RampProfile {
    type Item = (RampPhase, f64);
    type IntoIter = RampIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl Iterator for RampIter {
    type Item = (RampPhase, f64);

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.profile.get(self.idx)?;
        self.idx += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.profile.len().saturating_sub(self.idx);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for RampIter {}
