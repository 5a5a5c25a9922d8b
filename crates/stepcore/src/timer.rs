//! Dual-compare step timer scheduling.
//!
//! One free-running 16-bit counter carries two independent events: the next
//! step pulse and the fixed-period system tick. The step compare is always
//! armed relative to the *previous* step-compare value (the anchor), never
//! relative to "now", so the time spent inside the service routine can never
//! creep into the step period.
//!
//! Delays wider than the counter are handled by parking the compare one full
//! wrap away and burning whole wraps off a software remainder until what is
//! left fits in the counter. A request that would leave the next compare
//! within a few cycles of the current one is pulled back by
//! [`COUNTER_GUARD`] instead, with the guard added back onto the remainder,
//! so every intermediate fire has safe headroom.

use crate::config::{COUNTER_GUARD, COUNTER_RANGE, MIN_STEP_TICKS, SAFE_ISR_TICKS, TICK_TIME};

/// The hardware timer: a free-running counter with two compare channels.
///
/// `arm_step`/`arm_tick` replace any previously armed compare. Writing a
/// compare equal to the current counter value fires one full wrap later.
pub trait StepTimer {
    fn counter(&self) -> u16;
    fn arm_step(&mut self, compare: u16);
    fn disarm_step(&mut self);
    fn arm_tick(&mut self, compare: u16);
    fn disarm_tick(&mut self);
}

/// The requested delay is already due; the caller must step now.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct TooShort;

/// Outcome of servicing a step-compare fire.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum StepService {
    /// Spurious wrap fire on the way to a large delay; already re-armed.
    Wrap,
    /// The real step event.
    Fire,
}

/// Software half of the dual-compare discipline.
///
/// All methods must run with interrupts masked (in practice: behind the
/// executor's `critical_section::Mutex`); the compare write is ordered last
/// so a pending fire is deferred past the caller's return.
pub struct StepScheduler<T: StepTimer> {
    timer: T,
    /// Counter value of the previous step-compare event.
    anchor: u16,
    /// Ticks still owed beyond the currently armed compare.
    deferred: u32,
    step_armed: bool,
    tick_compare: u16,
}

impl<T: StepTimer> StepScheduler<T> {
    pub fn new(timer: T) -> Self {
        let anchor = timer.counter();
        StepScheduler {
            timer,
            anchor,
            deferred: 0,
            step_armed: false,
            tick_compare: 0,
        }
    }

    /// Start the system tick and leave the step compare disarmed.
    pub fn init(&mut self) {
        self.timer.disarm_step();
        self.step_armed = false;
        self.deferred = 0;
        self.anchor = self.timer.counter();
        self.tick_compare = self.timer.counter().wrapping_add(TICK_TIME as u16);
        self.timer.arm_tick(self.tick_compare);
    }

    /// Arm the step compare `delay` ticks after the previous step event.
    ///
    /// With `check_short` (temporal mode, called from the step service
    /// routine), a delay that has already elapsed, or would elapse before
    /// the arm takes effect, is rejected with [`TooShort`] and the anchor is
    /// left untouched.
    pub fn schedule_step_in(&mut self, delay: u32, check_short: bool) -> Result<(), TooShort> {
        if check_short {
            let elapsed = u32::from(self.timer.counter().wrapping_sub(self.anchor));
            if elapsed + SAFE_ISR_TICKS > delay {
                return Err(TooShort);
            }
        }
        self.arm_from_anchor(delay);
        Ok(())
    }

    /// Service a step-compare fire. [`StepService::Wrap`] fires have already
    /// re-armed the compare; the caller only acts on [`StepService::Fire`].
    pub fn service_step(&mut self) -> StepService {
        if self.deferred > 0 {
            let remaining = self.deferred;
            self.arm_from_anchor(remaining);
            StepService::Wrap
        } else {
            StepService::Fire
        }
    }

    /// Re-arm the system tick one period after its previous compare value.
    pub fn service_tick(&mut self) {
        self.tick_compare = self.tick_compare.wrapping_add(TICK_TIME as u16);
        self.timer.arm_tick(self.tick_compare);
    }

    /// Restart the step rhythm from the current counter value. No-op while a
    /// step compare is armed.
    pub fn kick(&mut self, delay: u32) {
        if self.step_armed {
            return;
        }
        self.anchor = self.timer.counter();
        self.arm_from_anchor(delay.max(MIN_STEP_TICKS));
    }

    /// The queue drained; stop step compares until the next kick.
    pub fn idle(&mut self) {
        self.step_armed = false;
        self.deferred = 0;
        self.timer.disarm_step();
    }

    /// Disarm both compares. Emergency stop.
    pub fn stop(&mut self) {
        self.step_armed = false;
        self.deferred = 0;
        self.timer.disarm_step();
        self.timer.disarm_tick();
    }

    pub fn is_step_armed(&self) -> bool {
        self.step_armed
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    fn arm_from_anchor(&mut self, delay: u32) {
        let (compare, deferred) = if delay < COUNTER_RANGE {
            (self.anchor.wrapping_add(delay as u16), 0)
        } else if delay < COUNTER_RANGE + COUNTER_GUARD {
            // The remainder after one wrap would land within the guard band
            // of the fire itself. Pull the compare back and owe the guard.
            (
                self.anchor.wrapping_sub(COUNTER_GUARD as u16),
                delay - (COUNTER_RANGE - COUNTER_GUARD),
            )
        } else {
            (self.anchor, delay - COUNTER_RANGE)
        };
        self.anchor = compare;
        self.deferred = deferred;
        self.step_armed = true;
        // Compare write last: a pending fire is taken after we return.
        self.timer.arm_step(compare);
    }
}
