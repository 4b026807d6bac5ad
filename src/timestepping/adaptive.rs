//! Step-size control
//!
//! After every trial step the global stable-step estimate gathered by the
//! quadrature kernel is compared with the dt just taken:
//! 1. **Reject** when the estimate is smaller: halve dt and retry from the
//!    snapshot.
//! 2. **Grow** when the estimate exceeds `grow_threshold · dt`: accept and
//!    ramp dt by a small factor for the next step.
//! 3. **Accept** otherwise, keeping dt.

/// Absolute floor below which dt halving is a fatal error
pub const DT_FLOOR: f64 = 1e-38;

/// Verdict on one trial step
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepDecision {
    /// Roll back and retry with `next_dt`
    Reject { next_dt: f64 },
    /// Keep the step and continue with `next_dt`
    Accept { next_dt: f64 },
}

impl StepDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, StepDecision::Accept { .. })
    }

    pub fn next_dt(&self) -> f64 {
        match *self {
            StepDecision::Reject { next_dt } | StepDecision::Accept { next_dt } => next_dt,
        }
    }
}

/// Factors of the halve-on-reject / slow-grow policy
#[derive(Debug, Clone, Copy)]
pub struct StepController {
    pub shrink_factor: f64,
    pub grow_factor: f64,
    pub grow_threshold: f64,
    pub dt_floor: f64,
}

impl Default for StepController {
    fn default() -> Self {
        Self {
            shrink_factor: 0.5,
            grow_factor: 1.02,
            grow_threshold: 1.25,
            dt_floor: DT_FLOOR,
        }
    }
}

impl StepController {
    /// Decide on a trial step of size `dt` given the stable-step `estimate`
    ///
    /// # Examples
    /// ```ignore
    /// let ctl = StepController::default();
    /// assert_eq!(ctl.assess(1.0, 0.9), StepDecision::Reject { next_dt: 0.5 });
    /// assert_eq!(ctl.assess(1.0, 2.0), StepDecision::Accept { next_dt: 1.02 });
    /// ```
    pub fn assess(&self, dt: f64, estimate: f64) -> StepDecision {
        if estimate < dt {
            StepDecision::Reject {
                next_dt: dt * self.shrink_factor,
            }
        } else if estimate > self.grow_threshold * dt {
            StepDecision::Accept {
                next_dt: dt * self.grow_factor,
            }
        } else {
            StepDecision::Accept { next_dt: dt }
        }
    }

    /// True when a halved step has become too small to continue
    pub fn has_collapsed(&self, dt: f64) -> bool {
        dt < self.dt_floor
    }

    /// Initial step: the estimate at t = 0, or `fallback` when it is unbounded
    pub fn initial_dt(&self, estimate: f64, fallback: f64) -> f64 {
        if estimate.is_finite() && estimate > 0.0 {
            estimate
        } else {
            fallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_reject_halves() {
        let ctl = StepController::default();
        let decision = ctl.assess(2.0, 1.999);
        assert!(!decision.is_accepted());
        assert_eq!(decision.next_dt(), 1.0);
        // Inverted mesh forces a zero estimate
        assert!(!ctl.assess(1e-20, 0.0).is_accepted());
    }

    #[test]
    fn test_grow_and_keep() {
        let ctl = StepController::default();
        assert_eq!(ctl.assess(1.0, 1.0), StepDecision::Accept { next_dt: 1.0 });
        assert_eq!(ctl.assess(1.0, 1.25), StepDecision::Accept { next_dt: 1.0 });
        let grown = ctl.assess(1.0, 1.26);
        assert!(grown.is_accepted());
        assert_relative_eq!(grown.next_dt(), 1.02);
        // Unbounded estimate still grows slowly
        assert_relative_eq!(ctl.assess(1.0, f64::INFINITY).next_dt(), 1.02);
    }

    #[test]
    fn test_floor_and_initial_dt() {
        let ctl = StepController::default();
        assert!(ctl.has_collapsed(1e-39));
        assert!(!ctl.has_collapsed(1e-38));
        assert_eq!(ctl.initial_dt(f64::INFINITY, 0.1), 0.1);
        assert_eq!(ctl.initial_dt(0.0, 0.1), 0.1);
        assert_eq!(ctl.initial_dt(0.3, 0.1), 0.3);
    }
}
