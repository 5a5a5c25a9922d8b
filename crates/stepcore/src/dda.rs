//! Per-move DDA state: Bresenham axis coordination and the per-step
//! procedure.
//!
//! The DDA owns all mutable state of the live move; the `Move` itself is
//! never written after it leaves the planner. One invocation of [`Dda::step`]
//! emits exactly one master step (with its slaved axis pulses), samples the
//! watched endstops and reports whether the move has completed.

use crate::axis::{Axis, AxisMask, NUM_AXES};
use crate::config::ENDSTOP_DEBOUNCE_SAMPLES;
use crate::pins::{EndstopInputs, StepOutputs};
use crate::profile::{self, VelocityState};
use crate::queue::Move;

/// Runtime state of the live move. At most one exists at any instant.
#[derive(Debug)]
pub struct Dda {
    mv: Move,
    /// Master steps already emitted, `0..=total_steps`.
    step_no: u32,
    /// Bresenham error accumulators, initialized to `total_steps / 2`.
    bres: [u32; NUM_AXES],
    vs: VelocityState,
    /// Consecutive samples the watched endstop edge has held.
    endstop_hits: u8,
    /// Intervals owed after immediate (too-short) steps; paid in full by the
    /// next successful arm.
    extra_time: u32,
}

impl Dda {
    /// Begin executing `mv`. Returns the DDA and the delay before its first
    /// step; the caller latches directions and schedules the first fire.
    pub fn start(mv: Move) -> (Dda, u32) {
        let vs = VelocityState::for_move(&mv);
        let first = mv.initial_interval;
        let dda = Dda {
            bres: [mv.total_steps / 2; NUM_AXES],
            step_no: 0,
            vs,
            endstop_hits: 0,
            extra_time: 0,
            mv,
        };
        (dda, first)
    }

    pub fn the_move(&self) -> &Move {
        &self.mv
    }

    pub fn step_no(&self) -> u32 {
        self.step_no
    }

    pub fn steps_remaining(&self) -> u32 {
        self.mv.total_steps - self.step_no
    }

    /// Emit one step. Returns `true` when the move has completed, either by
    /// reaching `total_steps` or by a watched endstop edge.
    pub fn step<P, E>(
        &mut self,
        pins: &mut P,
        endstops: &mut E,
        position_steps: &mut [i32; NUM_AXES],
    ) -> bool
    where
        P: StepOutputs,
        E: EndstopInputs,
    {
        let mut fired = AxisMask::EMPTY;
        for axis in Axis::ALL {
            let i = axis.index();
            self.bres[i] += self.mv.delta[i];
            if self.bres[i] >= self.mv.total_steps {
                self.bres[i] -= self.mv.total_steps;
                fired.set(axis);
                if self.mv.direction_mask.contains(axis) {
                    position_steps[i] += 1;
                } else {
                    position_steps[i] -= 1;
                }
            }
        }
        // All STEP lines rise together; the pin layer holds them high for
        // the configured pulse width before lowering them.
        pins.step_pulse(fired);

        if !self.mv.endstop_mask.is_empty() {
            let hit = endstops.sample(self.mv.endstop_mask);
            let edge_seen = if self.mv.endstop_stop_on_trigger {
                !hit.is_empty()
            } else {
                hit.is_empty()
            };
            if edge_seen {
                self.endstop_hits += 1;
                if self.endstop_hits >= ENDSTOP_DEBOUNCE_SAMPLES {
                    // Truncate: the endstop, not the step count, ends this
                    // move.
                    self.step_no = self.mv.total_steps;
                    return true;
                }
            } else {
                self.endstop_hits = 0;
            }
        }

        self.step_no += 1;
        self.step_no >= self.mv.total_steps
    }

    /// Ticks until the step after the one just emitted.
    pub fn next_interval(&mut self) -> u32 {
        profile::next_interval(&self.mv, self.step_no, &mut self.vs)
    }

    /// Delay to request from the scheduler: the next interval plus any debt
    /// from immediate steps.
    pub fn owed_delay(&mut self) -> u32 {
        self.extra_time + self.next_interval()
    }

    /// The scheduler accepted the arm; the debt is paid.
    pub fn delay_paid(&mut self) {
        self.extra_time = 0;
    }

    /// The scheduler returned `TooShort`; the step fires immediately and the
    /// interval is carried forward.
    pub fn delay_carried(&mut self) {
        self.extra_time += self.vs.interval;
    }

    /// Per-system-tick profile bookkeeping (temporal mode only).
    #[cfg(feature = "temporal")]
    pub fn on_tick(&mut self) {
        let remaining = self.steps_remaining();
        profile::temporal::tick_update(&self.mv, remaining, &mut self.vs);
    }
}
