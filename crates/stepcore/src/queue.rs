//! Prepared moves and the foreground→ISR ring.
//!
//! The ring is a `heapless` single-producer single-consumer queue: the
//! producer publishes the tail with release ordering, the consumer reads it
//! with acquire ordering, and neither side ever takes a lock. The step
//! executor works on a copy of the head element and only advances the head
//! once the move has fully drained, so the producer's view of "idle" is
//! simply an empty ring.

use heapless::spsc::{Consumer, Producer, Queue};

use crate::axis::{Axis, AxisMask, EndstopMask, Position, NUM_AXES};
use crate::config::{MachineConfig, QUEUE_CAPACITY};
use crate::error::MotionError;
use crate::profile;

// heapless rings hold N-1 elements.
pub type MoveQueue = Queue<Move, { QUEUE_CAPACITY + 1 }>;
pub type MoveProducer = Producer<'static, Move, { QUEUE_CAPACITY + 1 }>;
pub type MoveConsumer = Consumer<'static, Move, { QUEUE_CAPACITY + 1 }>;

/// A fully prepared linear move. Immutable once enqueued; the DDA keeps all
/// of its mutable state separately.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Move {
    /// Unsigned step count per axis.
    pub delta: [u32; NUM_AXES],
    /// Set bit = axis travels toward positive coordinates.
    pub direction_mask: AxisMask,
    /// `max(delta)`, the Bresenham master count.
    pub total_steps: u32,
    /// Requested rate of the master axis, steps/s.
    pub nominal_rate: u32,
    /// Master-axis acceleration and deceleration, steps/s².
    pub accel_rate: u32,
    pub decel_rate: u32,
    /// Acceleration ends at this master step.
    pub accel_until_step: u32,
    /// Deceleration begins at this master step.
    pub decel_from_step: u32,
    /// First inter-step interval, ticks.
    pub initial_interval: u32,
    /// Interval at `nominal_rate`, ticks.
    pub cruise_interval: u32,
    /// Endstops sampled every step; empty for normal moves.
    pub endstop_mask: EndstopMask,
    /// Watched edge: `true` completes the move on open→triggered,
    /// `false` on triggered→open (homing back-off).
    pub endstop_stop_on_trigger: bool,
}

impl Move {
    /// Prepare a move from `from` to `to` at `feedrate_mm_min`.
    ///
    /// Returns `Ok(None)` for a move that produces no steps. The feedrate is
    /// the Euclidean path speed, clamped to the master axis ceiling; all
    /// derived fields (master count, phase boundaries, initial and cruise
    /// intervals) are computed here, in the foreground, so the step service
    /// routine never does more than the integer recurrence.
    pub fn plan(
        cfg: &MachineConfig,
        from: Position,
        to: Position,
        feedrate_mm_min: u32,
        endstop_watch: Option<(EndstopMask, bool)>,
    ) -> Result<Option<Move>, MotionError> {
        if feedrate_mm_min == 0 {
            return Err(MotionError::InvalidMove);
        }

        let mut delta = [0u32; NUM_AXES];
        let mut delta_um = [0i64; NUM_AXES];
        let mut direction_mask = AxisMask::EMPTY;
        for axis in Axis::ALL {
            let i = axis.index();
            let d_um = i64::from(to.0[i]) - i64::from(from.0[i]);
            delta_um[i] = d_um;
            let steps = (d_um.unsigned_abs() * u64::from(cfg.axes[i].steps_per_mm) + 500) / 1000;
            delta[i] = steps as u32;
            if d_um > 0 {
                direction_mask.set(axis);
            }
        }

        let (master, total_steps) = delta
            .iter()
            .copied()
            .enumerate()
            .max_by_key(|&(_, steps)| steps)
            .unwrap_or((0, 0));
        if total_steps == 0 {
            return Ok(None);
        }

        let master_cfg = &cfg.axes[master];
        let feedrate = feedrate_mm_min.min(master_cfg.max_feedrate);
        let path_mm = profile::path_length_mm(&delta_um);
        let nominal_rate =
            ((total_steps as f32 * feedrate as f32 / 60.0 / path_mm) as u32).max(1);

        let accel_rate = master_cfg.acceleration * master_cfg.steps_per_mm;
        let decel_rate = accel_rate;

        let cruise_interval = profile::cruise_interval(nominal_rate);
        let accel_steps = profile::ramp_steps(nominal_rate, accel_rate);
        let decel_steps = profile::ramp_steps(nominal_rate, decel_rate);

        let (accel_until_step, decel_from_step) = if accel_rate == 0 {
            (0, total_steps)
        } else if accel_steps + decel_steps > total_steps {
            // Triangular profile: the ramps meet before nominal rate.
            let peak = (u64::from(total_steps) * u64::from(accel_steps)
                / u64::from(accel_steps + decel_steps).max(1)) as u32;
            (peak, peak)
        } else {
            (accel_steps, total_steps - decel_steps)
        };

        let initial_interval = if accel_until_step == 0 {
            cruise_interval
        } else {
            profile::initial_interval(accel_rate).max(cruise_interval)
        };

        let (endstop_mask, endstop_stop_on_trigger) =
            endstop_watch.unwrap_or((EndstopMask::EMPTY, true));

        Ok(Some(Move {
            delta,
            direction_mask,
            total_steps,
            nominal_rate,
            accel_rate,
            decel_rate,
            accel_until_step,
            decel_from_step,
            initial_interval,
            cruise_interval,
            endstop_mask,
            endstop_stop_on_trigger,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CPU_FREQ, DEFAULT_CONFIG};

    fn target(x: i32, y: i32, z: i32) -> Position {
        let mut p = Position::ORIGIN;
        p.0[0] = x;
        p.0[1] = y;
        p.0[2] = z;
        p
    }

    #[test]
    fn ring_is_fifo_and_bounded() {
        let mut queue = MoveQueue::new();
        let (mut producer, mut consumer) = queue.split();
        let mv = Move::plan(
            &DEFAULT_CONFIG,
            Position::ORIGIN,
            target(1_000, 0, 0),
            600,
            None,
        )
        .unwrap()
        .unwrap();
        for n in 0..QUEUE_CAPACITY {
            let mut tagged = mv;
            tagged.nominal_rate = n as u32 + 1;
            producer.enqueue(tagged).unwrap();
        }
        assert!(!producer.ready());
        for n in 0..QUEUE_CAPACITY {
            assert_eq!(consumer.dequeue().unwrap().nominal_rate, n as u32 + 1);
        }
        assert!(consumer.dequeue().is_none());
    }

    #[test]
    fn plan_derives_master_and_directions() {
        // 3 mm X, -4 mm Y at 100 steps/mm-ish: X 80 steps/mm, Y 80 steps/mm.
        let mv = Move::plan(
            &DEFAULT_CONFIG,
            Position::ORIGIN,
            target(3_000, -4_000, 0),
            1_200,
            None,
        )
        .unwrap()
        .unwrap();
        assert_eq!(mv.delta[0], 240);
        assert_eq!(mv.delta[1], 320);
        assert_eq!(mv.total_steps, 320);
        assert!(mv.direction_mask.contains(Axis::X));
        assert!(!mv.direction_mask.contains(Axis::Y));
    }

    #[test]
    fn plan_zero_length_is_skipped() {
        let mv = Move::plan(&DEFAULT_CONFIG, Position::ORIGIN, Position::ORIGIN, 600, None)
            .unwrap();
        assert!(mv.is_none());
        assert_eq!(
            Move::plan(&DEFAULT_CONFIG, Position::ORIGIN, target(1, 0, 0), 0, None),
            Err(MotionError::InvalidMove)
        );
    }

    #[test]
    fn plan_nominal_rate_matches_feedrate() {
        // 10 mm pure X at 600 mm/min and 80 steps/mm is 800 steps/s.
        let mv = Move::plan(
            &DEFAULT_CONFIG,
            Position::ORIGIN,
            target(10_000, 0, 0),
            600,
            None,
        )
        .unwrap()
        .unwrap();
        assert_eq!(mv.total_steps, 800);
        assert_eq!(mv.nominal_rate, 800);
        assert_eq!(mv.cruise_interval, CPU_FREQ / 800);
    }

    #[test]
    fn plan_feedrate_clamped_to_axis_ceiling() {
        let mv = Move::plan(
            &DEFAULT_CONFIG,
            Position::ORIGIN,
            target(10_000, 0, 0),
            1_000_000,
            None,
        )
        .unwrap()
        .unwrap();
        let max = DEFAULT_CONFIG.axes[0].max_feedrate;
        assert_eq!(mv.nominal_rate, max / 60 * 80);
    }

    #[test]
    fn plan_short_move_is_triangular() {
        // 2 mm X at a feedrate whose ramp needs more than half the move.
        let mv = Move::plan(
            &DEFAULT_CONFIG,
            Position::ORIGIN,
            target(2_000, 0, 0),
            6_000,
            None,
        )
        .unwrap()
        .unwrap();
        assert_eq!(mv.total_steps, 160);
        assert_eq!(mv.accel_until_step, mv.decel_from_step);
        let mid = mv.total_steps / 2;
        assert!(mv.accel_until_step >= mid - 1 && mv.accel_until_step <= mid + 1);
    }

    #[test]
    fn plan_trapezoid_boundaries() {
        let mv = Move::plan(
            &DEFAULT_CONFIG,
            Position::ORIGIN,
            target(100_000, 0, 0),
            6_000,
            None,
        )
        .unwrap()
        .unwrap();
        // 6000 mm/min = 100 mm/s = 8000 steps/s; ramp = 8000^2 / (2*80000).
        assert_eq!(mv.nominal_rate, 8_000);
        assert_eq!(mv.accel_until_step, 400);
        assert_eq!(mv.decel_from_step, mv.total_steps - 400);
        assert!(mv.accel_until_step < mv.decel_from_step);
    }

    #[test]
    fn plan_homing_watch_is_recorded() {
        let watch = EndstopMask::single(Axis::X, crate::axis::EndstopSide::Min);
        let mv = Move::plan(
            &DEFAULT_CONFIG,
            Position::ORIGIN,
            target(-1_000_000, 0, 0),
            100,
            Some((watch, true)),
        )
        .unwrap()
        .unwrap();
        assert_eq!(mv.endstop_mask, watch);
        assert!(mv.endstop_stop_on_trigger);
        assert!(!mv.direction_mask.contains(Axis::X));
    }
}
