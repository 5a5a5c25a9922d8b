//! Compile-time constants and the per-axis machine description.
//!
//! The scalar constants are fixed at build time; the axis table is a runtime
//! value so hosts and tests can describe different machines, but the default
//! table is validated during constant evaluation and an invalid default
//! refuses to build.

use crate::axis::NUM_AXES;

/// Frequency of the free-running step timer, in Hz. All intervals handed to
/// the scheduler are counted in ticks of this clock.
pub const CPU_FREQ: u32 = 20_000_000;

/// Width of the hardware counter the step and tick compares run on.
pub const COUNTER_RANGE: u32 = 65_536;

/// Headroom band for the large-delay path. A wrap fire is never scheduled
/// closer than this to the compare that requested it.
pub const COUNTER_GUARD: u32 = 10_000;

/// Worst-case ticks the step service routine needs from compare fire to the
/// next arm. Requests shorter than elapsed-plus-this are rejected as too
/// short when the caller asks for the check.
pub const SAFE_ISR_TICKS: u32 = 200;

/// Minimum pulse-to-pulse separation. The profiler floors every interval
/// here so a step service always completes before the next compare fires.
pub const MIN_STEP_TICKS: u32 = 500;

/// STEP line high time required by the stepper drivers, in nanoseconds.
/// Driver-dependent; surfaced here rather than hard-coded in the pin layer.
pub const STEP_PULSE_NS: u32 = 2_000;

/// Ticks a direction line must settle before the first step the other way.
pub const DIR_SETUP_TICKS: u32 = 400;

/// System-tick period in counter ticks (2 ms).
pub const TICK_TIME: u32 = CPU_FREQ / 500;

/// Moves the ring buffer holds before the producer blocks.
pub const QUEUE_CAPACITY: usize = 8;

/// Consecutive per-step samples an endstop edge must survive before a homing
/// move is truncated.
pub const ENDSTOP_DEBOUNCE_SAMPLES: u8 = 4;

/// Magnitude of the open-ended homing target, in micrometers.
pub const HOMING_SWEEP_UM: i32 = 1_000_000;

/// Static description of one axis.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AxisConfig {
    /// Full steps per millimeter of travel.
    pub steps_per_mm: u32,
    /// Feedrate ceiling, mm/min.
    pub max_feedrate: u32,
    /// Acceleration in mm/s². Zero selects constant-velocity moves.
    pub acceleration: u32,
    /// Physical distance between the endstop trigger point and the hard
    /// limit, µm. Bounds the fast homing feedrate.
    pub endstop_clearance_um: u32,
    /// Slow homing feedrate, mm/min.
    pub search_feedrate: u32,
    /// Coordinate adopted after homing toward the matching endstop, µm.
    pub min_um: i32,
    pub max_um: i32,
    pub has_min_endstop: bool,
    pub has_max_endstop: bool,
}

impl AxisConfig {
    /// A disabled axis: present in the table, never homed, never moved.
    pub const UNUSED: AxisConfig = AxisConfig {
        steps_per_mm: 1,
        max_feedrate: 1,
        acceleration: 0,
        endstop_clearance_um: 0,
        search_feedrate: 0,
        min_um: 0,
        max_um: 0,
        has_min_endstop: false,
        has_max_endstop: false,
    };

    const fn valid(&self) -> bool {
        if self.steps_per_mm == 0 || self.max_feedrate == 0 {
            return false;
        }
        if self.has_min_endstop || self.has_max_endstop {
            // Homing needs both the slow feedrate and the clearance that
            // bounds the fast one.
            if self.search_feedrate == 0 || self.endstop_clearance_um == 0 {
                return false;
            }
        }
        if self.has_max_endstop && self.max_um <= self.min_um {
            return false;
        }
        true
    }
}

/// The whole machine: one descriptor per axis, indexed by [`crate::Axis`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MachineConfig {
    pub axes: [AxisConfig; NUM_AXES],
}

impl MachineConfig {
    pub const fn validate(&self) -> bool {
        let mut i = 0;
        while i < NUM_AXES {
            if !self.axes[i].valid() {
                return false;
            }
            i += 1;
        }
        true
    }
}

/// Default machine: a Cartesian i3-class printer.
pub const DEFAULT_CONFIG: MachineConfig = MachineConfig {
    axes: [
        // X
        AxisConfig {
            steps_per_mm: 80,
            max_feedrate: 12_000,
            acceleration: 1_000,
            endstop_clearance_um: 5_000,
            search_feedrate: 100,
            min_um: 0,
            max_um: 200_000,
            has_min_endstop: true,
            has_max_endstop: false,
        },
        // Y
        AxisConfig {
            steps_per_mm: 80,
            max_feedrate: 12_000,
            acceleration: 1_000,
            endstop_clearance_um: 5_000,
            search_feedrate: 100,
            min_um: 0,
            max_um: 200_000,
            has_min_endstop: true,
            has_max_endstop: false,
        },
        // Z
        AxisConfig {
            steps_per_mm: 400,
            max_feedrate: 600,
            acceleration: 100,
            endstop_clearance_um: 1_000,
            search_feedrate: 60,
            min_um: 0,
            max_um: 180_000,
            has_min_endstop: true,
            has_max_endstop: false,
        },
        // U
        AxisConfig::UNUSED,
        // E
        AxisConfig {
            steps_per_mm: 96,
            max_feedrate: 6_000,
            acceleration: 2_000,
            endstop_clearance_um: 0,
            search_feedrate: 0,
            min_um: 0,
            max_um: 0,
            has_min_endstop: false,
            has_max_endstop: false,
        },
    ],
};

// An invalid default table is a build error, not a runtime surprise.
const _: () = assert!(DEFAULT_CONFIG.validate(), "default machine config is invalid");
const _: () = assert!(MIN_STEP_TICKS > SAFE_ISR_TICKS);
const _: () = assert!(COUNTER_GUARD < COUNTER_RANGE / 2);
const _: () = assert!(TICK_TIME < COUNTER_RANGE);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(DEFAULT_CONFIG.validate());
    }

    #[test]
    fn endstop_axis_requires_search_feedrate() {
        let mut cfg = DEFAULT_CONFIG;
        cfg.axes[0].search_feedrate = 0;
        assert!(!cfg.validate());
    }

    #[test]
    fn endstop_axis_requires_clearance() {
        let mut cfg = DEFAULT_CONFIG;
        cfg.axes[1].endstop_clearance_um = 0;
        assert!(!cfg.validate());
    }

    #[test]
    fn max_endstop_requires_max_coordinate() {
        let mut cfg = DEFAULT_CONFIG;
        cfg.axes[0].has_max_endstop = true;
        cfg.axes[0].max_um = cfg.axes[0].min_um;
        assert!(!cfg.validate());
    }

    #[test]
    fn zero_steps_per_mm_is_rejected() {
        let mut cfg = DEFAULT_CONFIG;
        cfg.axes[2].steps_per_mm = 0;
        assert!(!cfg.validate());
    }
}
