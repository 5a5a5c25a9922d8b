//! Velocity profiles: the next inter-step interval as a function of DDA state.
//!
//! The default mode ramps by step count using the integer recurrence
//! `c_{n+1} = c_n - 2*c_n / (4*n + 1)` (constant acceleration to second
//! order), so the hot path is divisions and subtractions only. Deceleration
//! runs the same recurrence with a negative step index, counting steps
//! remaining to stop. The `temporal` feature replaces it with a rate that is
//! adjusted once per system tick instead of once per step, which decouples
//! velocity changes from step density.

use crate::axis::NUM_AXES;
use crate::config::{CPU_FREQ, MIN_STEP_TICKS};
use crate::queue::Move;

/// Velocity phase of the live move.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    Accel,
    Cruise,
    Decel,
}

/// Mutable profile state carried by the DDA.
#[derive(Debug, Copy, Clone)]
pub struct VelocityState {
    pub phase: Phase,
    /// Current inter-step interval in timer ticks.
    pub interval: u32,
    /// Current step rate in steps/s; only the temporal mode updates it.
    #[cfg(feature = "temporal")]
    pub rate: u32,
}

impl VelocityState {
    pub fn for_move(mv: &Move) -> VelocityState {
        VelocityState {
            phase: if mv.accel_until_step > 0 {
                Phase::Accel
            } else {
                Phase::Cruise
            },
            interval: mv.initial_interval,
            #[cfg(feature = "temporal")]
            rate: temporal::start_rate(mv),
        }
    }
}

/// One application of the step-rate recurrence. `n > 0` walks the ramp
/// forward (interval shrinks), `n < 0` walks it backward from `-n` steps
/// before standstill (interval grows).
#[inline]
pub fn ramp_interval(c: u32, n: i32) -> u32 {
    let c = i64::from(c);
    let den = 4 * i64::from(n) + 1;
    (c - 2 * c / den) as u32
}

/// First interval of a ramp starting at rest, in ticks.
///
/// `c0 = 0.676 * f * sqrt(2 / accel)`; the 0.676 factor compensates the
/// recurrence's low-n error (D. Austin's approximation).
pub fn initial_interval(accel_rate: u32) -> u32 {
    let c0 = 0.676_f32 * CPU_FREQ as f32 * libm::sqrtf(2.0 / accel_rate as f32);
    (c0 as u32).max(MIN_STEP_TICKS)
}

/// Constant interval for `rate` steps/s.
pub fn cruise_interval(rate: u32) -> u32 {
    (CPU_FREQ / rate.max(1)).max(MIN_STEP_TICKS)
}

/// Steps needed to ramp between standstill and `rate` at `accel` steps/s².
pub fn ramp_steps(rate: u32, accel: u32) -> u32 {
    if accel == 0 {
        return 0;
    }
    (u64::from(rate) * u64::from(rate) / (2 * u64::from(accel))) as u32
}

/// Trapezoidal mode: interval for the step after `step_no` emitted steps.
///
/// Monotone within each phase: non-increasing while accelerating,
/// non-decreasing while decelerating.
#[cfg(not(feature = "temporal"))]
pub fn next_interval(mv: &Move, step_no: u32, vs: &mut VelocityState) -> u32 {
    if mv.accel_rate == 0 {
        vs.phase = Phase::Cruise;
        vs.interval = mv.cruise_interval;
        return vs.interval;
    }
    if step_no < mv.accel_until_step {
        vs.phase = Phase::Accel;
        let c = ramp_interval(vs.interval, step_no as i32);
        vs.interval = c.max(mv.cruise_interval);
    } else if step_no < mv.decel_from_step {
        vs.phase = Phase::Cruise;
        vs.interval = mv.cruise_interval;
    } else {
        vs.phase = Phase::Decel;
        let remaining = mv.total_steps - step_no;
        vs.interval = ramp_interval(vs.interval, -(remaining as i32)).max(MIN_STEP_TICKS);
    }
    vs.interval
}

#[cfg(feature = "temporal")]
pub use temporal::next_interval;

/// Jerk-limited time-based mode.
#[cfg(feature = "temporal")]
pub mod temporal {
    use super::*;
    use crate::config::TICK_TIME;

    /// Rate change applied per system tick, steps/s.
    pub fn tick_rate_delta(accel_rate: u32) -> u32 {
        ((u64::from(accel_rate) * u64::from(TICK_TIME) / u64::from(CPU_FREQ)) as u32).max(1)
    }

    /// Rate the move starts at: one tick's worth of acceleration, capped at
    /// the nominal rate.
    pub fn start_rate(mv: &Move) -> u32 {
        if mv.accel_rate == 0 {
            mv.nominal_rate
        } else {
            tick_rate_delta(mv.accel_rate).min(mv.nominal_rate)
        }
    }

    /// True once the remaining steps are no longer enough to stop from the
    /// current rate at `decel_rate`.
    pub fn end_approaching(remaining: u32, rate: u32, decel_rate: u32) -> bool {
        if decel_rate == 0 {
            return false;
        }
        u64::from(remaining) * 2 * u64::from(decel_rate) <= u64::from(rate) * u64::from(rate)
    }

    /// Per-tick rate update; runs in the system tick, not per step.
    pub fn tick_update(mv: &Move, remaining: u32, vs: &mut VelocityState) {
        if mv.accel_rate == 0 {
            return;
        }
        let dv = tick_rate_delta(mv.accel_rate);
        if end_approaching(remaining, vs.rate, mv.decel_rate) {
            vs.phase = Phase::Decel;
            vs.rate = vs.rate.saturating_sub(dv).max(dv);
        } else if vs.rate < mv.nominal_rate {
            vs.phase = Phase::Accel;
            vs.rate = (vs.rate + dv).min(mv.nominal_rate);
        } else {
            vs.phase = Phase::Cruise;
        }
        vs.interval = CPU_FREQ / vs.rate.max(1);
    }

    /// Interval for the next step: constant between ticks by design. No
    /// [`MIN_STEP_TICKS`] floor here; an overdue request comes back from the
    /// scheduler as `TooShort` and the DDA steps immediately, carrying the
    /// unpaid delay forward.
    pub fn next_interval(mv: &Move, _step_no: u32, vs: &mut VelocityState) -> u32 {
        if mv.accel_rate == 0 {
            vs.interval = mv.cruise_interval;
        } else {
            vs.interval = CPU_FREQ / vs.rate.max(1);
        }
        vs.interval
    }
}

/// Euclidean path length of a move in millimeters. Foreground only.
pub(crate) fn path_length_mm(delta_um: &[i64; NUM_AXES]) -> f32 {
    let mut sum = 0.0_f32;
    let mut i = 0;
    while i < NUM_AXES {
        let mm = delta_um[i] as f32 / 1000.0;
        sum += mm * mm;
        i += 1;
    }
    libm::sqrtf(sum)
}

#[cfg(all(test, feature = "temporal"))]
mod temporal_tests {
    use super::temporal::*;
    use super::*;
    use crate::axis::Position;
    use crate::config::{DEFAULT_CONFIG, TICK_TIME};

    fn plan_x(um: i32, feedrate: u32) -> Move {
        let mut target = Position::ORIGIN;
        target.0[0] = um;
        Move::plan(&DEFAULT_CONFIG, Position::ORIGIN, target, feedrate, None)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn rate_ramps_once_per_tick_toward_nominal() {
        let mv = plan_x(50_000, 6_000);
        let mut vs = VelocityState::for_move(&mv);
        let dv = tick_rate_delta(mv.accel_rate);
        assert_eq!(dv, mv.accel_rate * TICK_TIME / CPU_FREQ);
        let before = vs.rate;
        tick_update(&mv, mv.total_steps, &mut vs);
        assert_eq!(vs.rate, (before + dv).min(mv.nominal_rate));
        // Between ticks the interval is constant regardless of step count.
        let a = next_interval(&mv, 10, &mut vs);
        let b = next_interval(&mv, 11, &mut vs);
        assert_eq!(a, b);
        assert_eq!(a, CPU_FREQ / vs.rate);
    }

    #[test]
    fn rate_caps_at_nominal() {
        let mv = plan_x(50_000, 6_000);
        let mut vs = VelocityState::for_move(&mv);
        for _ in 0..10_000 {
            tick_update(&mv, mv.total_steps, &mut vs);
        }
        assert_eq!(vs.rate, mv.nominal_rate);
        assert_eq!(vs.phase, Phase::Cruise);
    }

    #[test]
    fn end_approaching_triggers_deceleration() {
        let mv = plan_x(50_000, 6_000);
        let mut vs = VelocityState::for_move(&mv);
        for _ in 0..10_000 {
            tick_update(&mv, mv.total_steps, &mut vs);
        }
        let cruising = vs.rate;
        // Remaining steps shorter than the stopping distance: must slow.
        let short = cruising * cruising / (2 * mv.decel_rate) / 2;
        assert!(end_approaching(short, cruising, mv.decel_rate));
        tick_update(&mv, short, &mut vs);
        assert!(vs.rate < cruising);
        assert_eq!(vs.phase, Phase::Decel);
    }
}

#[cfg(all(test, not(feature = "temporal")))]
mod tests {
    use super::*;
    use crate::axis::Position;
    use crate::config::DEFAULT_CONFIG;

    fn plan_x(um: i32, feedrate: u32) -> Move {
        let mut target = Position::ORIGIN;
        target.0[0] = um;
        Move::plan(&DEFAULT_CONFIG, Position::ORIGIN, target, feedrate, None)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn recurrence_shrinks_forward_grows_backward() {
        let c = 10_000;
        assert!(ramp_interval(c, 1) < c);
        assert!(ramp_interval(c, -5) > c);
        // First ramp step drops by 2/5.
        assert_eq!(ramp_interval(10_000, 1), 6_000);
    }

    #[test]
    fn accel_phase_is_non_increasing() {
        let mv = plan_x(50_000, 6_000);
        let mut vs = VelocityState::for_move(&mv);
        let mut prev = mv.initial_interval;
        for n in 1..mv.accel_until_step {
            let c = next_interval(&mv, n, &mut vs);
            assert!(c <= prev, "interval grew during accel at step {}", n);
            prev = c;
        }
    }

    #[test]
    fn cruise_returns_constant_interval() {
        let mv = plan_x(50_000, 6_000);
        let mut vs = VelocityState::for_move(&mv);
        for n in 1..mv.total_steps {
            next_interval(&mv, n, &mut vs);
            if vs.phase == Phase::Cruise {
                assert_eq!(vs.interval, mv.cruise_interval);
            }
        }
    }

    #[test]
    fn decel_phase_is_non_decreasing() {
        let mv = plan_x(50_000, 6_000);
        let mut vs = VelocityState::for_move(&mv);
        let mut prev = 0;
        for n in 1..mv.total_steps {
            let c = next_interval(&mv, n, &mut vs);
            if vs.phase == Phase::Decel {
                assert!(c >= prev, "interval shrank during decel at step {}", n);
            }
            prev = c;
        }
    }

    #[test]
    fn interval_never_below_floor() {
        let mv = plan_x(50_000, 12_000);
        let mut vs = VelocityState::for_move(&mv);
        for n in 1..mv.total_steps {
            assert!(next_interval(&mv, n, &mut vs) >= MIN_STEP_TICKS);
        }
    }

    #[test]
    fn zero_accel_is_flat() {
        let mut cfg = DEFAULT_CONFIG;
        cfg.axes[0].acceleration = 0;
        let mut target = Position::ORIGIN;
        target.0[0] = 10_000;
        let mv = Move::plan(&cfg, Position::ORIGIN, target, 600, None)
            .unwrap()
            .unwrap();
        let mut vs = VelocityState::for_move(&mv);
        for n in 1..mv.total_steps {
            assert_eq!(next_interval(&mv, n, &mut vs), mv.cruise_interval);
        }
    }
}
