//! Endstop homing: the two-pass search sequence, one parameterized routine
//! for every configured axis.

use crate::axis::{Axis, EndstopMask, EndstopSide};
use crate::config::{AxisConfig, HOMING_SWEEP_UM};
use crate::controller::MotionController;
use crate::error::MotionError;
use crate::pins::{EndstopInputs, StepOutputs};
use crate::timer::StepTimer;

/// Highest feedrate (mm/min) from which the axis can still decelerate to a
/// stop within the clearance behind the endstop.
///
/// `60 * sqrt(2 * acceleration * clearance / 1000)`; the division converts
/// the clearance from µm to mm, so this is `60 * sqrt(2 a d)`, the textbook
/// stopping-speed bound.
pub fn search_fast_feedrate(cfg: &AxisConfig) -> u32 {
    if cfg.acceleration == 0 || cfg.endstop_clearance_um == 0 {
        return 0;
    }
    let v_mm_s = libm::sqrtf(
        2.0 * cfg.acceleration as f32 * cfg.endstop_clearance_um as f32 / 1000.0,
    );
    (60.0 * v_mm_s) as u32
}

/// Runs homing sequences against a motion controller.
pub struct HomingDriver<'a, P, E, T>
where
    P: StepOutputs + 'static,
    E: EndstopInputs + 'static,
    T: StepTimer + 'static,
{
    ctrl: &'a mut MotionController<P, E, T>,
}

impl<'a, P, E, T> HomingDriver<'a, P, E, T>
where
    P: StepOutputs + 'static,
    E: EndstopInputs + 'static,
    T: StepTimer + 'static,
{
    pub fn new(ctrl: &'a mut MotionController<P, E, T>) -> Self {
        HomingDriver { ctrl }
    }

    /// Home one axis against the endstop on `side`.
    ///
    /// If the clearance-derived fast feedrate beats the configured slow one,
    /// the axis first approaches at the fast rate until the endstop
    /// triggers, then backs off at the slow rate until it releases.
    /// Otherwise a single slow approach suffices. Afterwards the axis
    /// coordinate is pinned to its configured min/max.
    pub fn home_axis(&mut self, axis: Axis, side: EndstopSide) -> Result<(), MotionError> {
        let cfg = self.ctrl.config().axes[axis.index()];
        let present = match side {
            EndstopSide::Min => cfg.has_min_endstop,
            EndstopSide::Max => cfg.has_max_endstop,
        };
        if !present {
            return Err(MotionError::NoEndstop);
        }

        let mask = EndstopMask::single(axis, side);
        let toward = match side {
            EndstopSide::Min => -HOMING_SWEEP_UM,
            EndstopSide::Max => HOMING_SWEEP_UM,
        };
        let search_slow = cfg.search_feedrate;
        let search_fast = search_fast_feedrate(&cfg);

        let mut sweep = self.ctrl.position();
        sweep[axis] += toward;

        if search_fast > search_slow {
            // Fast approach until the switch closes.
            self.ctrl.enqueue_home(sweep, search_fast, mask, true)?;
            self.ctrl.wait_idle();
            // Back off the other way until it opens again.
            let mut back = self.ctrl.position();
            back[axis] -= toward;
            self.ctrl.enqueue_home(back, search_slow, mask, false)?;
        } else {
            self.ctrl.enqueue_home(sweep, search_slow, mask, true)?;
        }
        self.ctrl.wait_idle();

        // The switch edge is the new origin for this axis.
        let mut position = self.ctrl.position();
        position[axis] = match side {
            EndstopSide::Min => cfg.min_um,
            EndstopSide::Max => cfg.max_um,
        };
        self.ctrl.set_current_position(position)
    }

    /// Home every axis that has an endstop configured, in table order.
    pub fn home_all(&mut self) -> Result<(), MotionError> {
        for axis in Axis::ALL {
            let cfg = self.ctrl.config().axes[axis.index()];
            if cfg.has_min_endstop {
                self.home_axis(axis, EndstopSide::Min)?;
            } else if cfg.has_max_endstop {
                self.home_axis(axis, EndstopSide::Max)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_CONFIG;

    #[test]
    fn fast_search_is_the_stopping_speed_bound() {
        // a = 1000 mm/s², clearance = 5 mm: v = sqrt(2*1000*5) = 100 mm/s.
        let cfg = AxisConfig {
            acceleration: 1_000,
            endstop_clearance_um: 5_000,
            ..DEFAULT_CONFIG.axes[0]
        };
        assert_eq!(search_fast_feedrate(&cfg), 6_000);
    }

    #[test]
    fn fast_search_degenerates_without_acceleration() {
        let cfg = AxisConfig {
            acceleration: 0,
            ..DEFAULT_CONFIG.axes[0]
        };
        assert_eq!(search_fast_feedrate(&cfg), 0);
    }
}
