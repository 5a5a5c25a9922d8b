//! The virtual MCU: a free-running 16-bit counter with two compare
//! channels, recording step pins and modelling endstop switches.
//!
//! Time is a 64-bit tick count; the hardware counter the core sees is its
//! low 16 bits. Pulses are recorded with their absolute tick timestamp so
//! tests can check inter-pulse intervals exactly.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use stepcore::axis::{Axis, AxisMask, EndstopMask, EndstopSide, NUM_AXES};
use stepcore::pins::{EndstopInputs, StepOutputs};
use stepcore::timer::StepTimer;

/// One recorded step event.
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
pub struct PulseEvent {
    /// Absolute simulation time, in timer ticks.
    pub at_tick: u64,
    /// Axes pulsed together on this event.
    pub axes: u8,
    /// Direction lines at pulse time (set bit = toward positive).
    pub directions: u8,
}

/// A virtual endstop switch on one axis.
#[derive(Debug, Copy, Clone)]
pub struct EndstopModel {
    pub side: EndstopSide,
    /// Trigger boundary in steps: a min switch is closed at or below it, a
    /// max switch at or above.
    pub trigger_at_steps: i64,
}

/// Shared state of the virtual machine.
#[derive(Debug, Default)]
pub struct SimWorld {
    pub now: u64,
    pub step_compare: Option<u16>,
    pub tick_compare: Option<u16>,
    pub directions: AxisMask,
    pub drivers_enabled: bool,
    /// True machine position, in steps per axis.
    pub steps: [i64; NUM_AXES],
    pub trace: Vec<PulseEvent>,
    pub endstops: [Option<EndstopModel>; NUM_AXES],
}

impl SimWorld {
    pub fn counter(&self) -> u16 {
        (self.now & 0xFFFF) as u16
    }

    fn endstop_state(&self) -> EndstopMask {
        let mut closed = EndstopMask::EMPTY;
        for axis in Axis::ALL {
            let i = axis.index();
            if let Some(model) = self.endstops[i] {
                let hit = match model.side {
                    EndstopSide::Min => self.steps[i] <= model.trigger_at_steps,
                    EndstopSide::Max => self.steps[i] >= model.trigger_at_steps,
                };
                if hit {
                    closed.insert(EndstopMask::single(axis, model.side));
                }
            }
        }
        closed
    }
}

pub type SharedWorld = Arc<Mutex<SimWorld>>;

/// Ticks until a compare at `compare` fires, as the hardware sees it: a
/// compare equal to the current counter value is one full wrap away.
pub fn wrap_distance(compare: u16, counter: u16) -> u32 {
    u32::from(compare.wrapping_sub(counter).wrapping_sub(1)) + 1
}

/// The core's view of the virtual timer.
pub struct SimTimer(pub SharedWorld);

impl StepTimer for SimTimer {
    fn counter(&self) -> u16 {
        self.0.lock().unwrap().counter()
    }
    fn arm_step(&mut self, compare: u16) {
        self.0.lock().unwrap().step_compare = Some(compare);
    }
    fn disarm_step(&mut self) {
        self.0.lock().unwrap().step_compare = None;
    }
    fn arm_tick(&mut self, compare: u16) {
        self.0.lock().unwrap().tick_compare = Some(compare);
    }
    fn disarm_tick(&mut self) {
        self.0.lock().unwrap().tick_compare = None;
    }
}

/// The core's view of the step and direction outputs.
pub struct SimPins(pub SharedWorld);

impl StepOutputs for SimPins {
    fn set_direction(&mut self, directions: AxisMask) {
        self.0.lock().unwrap().directions = directions;
    }

    fn step_pulse(&mut self, axes: AxisMask) {
        if axes.is_empty() {
            return;
        }
        let mut world = self.0.lock().unwrap();
        for axis in Axis::ALL {
            if axes.contains(axis) {
                let i = axis.index();
                if world.directions.contains(axis) {
                    world.steps[i] += 1;
                } else {
                    world.steps[i] -= 1;
                }
            }
        }
        let event = PulseEvent {
            at_tick: world.now,
            axes: axes.bits(),
            directions: world.directions.bits(),
        };
        world.trace.push(event);
    }

    fn enable_drivers(&mut self, enabled: bool) {
        self.0.lock().unwrap().drivers_enabled = enabled;
    }
}

/// The core's view of the endstop inputs.
pub struct SimEndstops(pub SharedWorld);

impl EndstopInputs for SimEndstops {
    fn sample(&mut self, watch: EndstopMask) -> EndstopMask {
        let closed = self.0.lock().unwrap().endstop_state();
        EndstopMask::from_bits(closed.bits() & watch.bits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_distance_counts_full_wrap_for_equal_values() {
        assert_eq!(wrap_distance(100, 100), 65_536);
        assert_eq!(wrap_distance(101, 100), 1);
        assert_eq!(wrap_distance(0, 0xFFFF), 1);
        assert_eq!(wrap_distance(50, 100), 65_486);
    }

    #[test]
    fn min_endstop_closes_at_or_below_boundary() {
        let mut world = SimWorld::default();
        world.endstops[0] = Some(EndstopModel {
            side: EndstopSide::Min,
            trigger_at_steps: -10,
        });
        world.steps[0] = -9;
        assert!(world.endstop_state().is_empty());
        world.steps[0] = -10;
        assert_eq!(
            world.endstop_state(),
            EndstopMask::single(Axis::X, EndstopSide::Min)
        );
    }
}
