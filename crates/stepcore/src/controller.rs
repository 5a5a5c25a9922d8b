//! The motion controller: foreground API on one side, step/tick service
//! routines on the other, with the SPSC ring in between.
//!
//! The ISR half ([`StepExecutor`]) lives in a
//! `critical_section::Mutex<RefCell<…>>`; a port's timer interrupt handlers
//! borrow it and call [`StepExecutor::on_step_compare`] /
//! [`StepExecutor::on_tick_compare`]. The foreground half
//! ([`MotionController`]) owns the ring producer and only borrows the
//! executor for short, bounded windows: kicking an idle machine,
//! repositioning while idle, and emergency stop.
//!
//! ```ignore
//! static EXECUTOR: Mutex<RefCell<Option<Executor>>> = Mutex::new(RefCell::new(None));
//!
//! #[interrupt]
//! fn TIM2() {
//!     critical_section::with(|cs| {
//!         if let Some(exec) = EXECUTOR.borrow(cs).borrow_mut().as_mut() {
//!             exec.on_step_compare();
//!         }
//!     });
//! }
//! ```

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};

use critical_section::Mutex;

use crate::axis::{Axis, AxisMask, EndstopMask, Position, NUM_AXES};
use crate::config::{MachineConfig, DIR_SETUP_TICKS, MIN_STEP_TICKS};
use crate::dda::Dda;
use crate::error::MotionError;
use crate::pins::{EndstopInputs, StepOutputs};
use crate::queue::{Move, MoveConsumer, MoveProducer};
use crate::timer::{StepScheduler, StepService, StepTimer, TooShort};

/// Flags shared between the two halves.
pub struct QueueStatus {
    estop: AtomicBool,
}

impl QueueStatus {
    pub const fn new() -> QueueStatus {
        QueueStatus {
            estop: AtomicBool::new(false),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.estop.load(Ordering::Acquire)
    }
}

impl Default for QueueStatus {
    fn default() -> Self {
        QueueStatus::new()
    }
}

/// ISR-side half: ring consumer, DDA, profiler and scheduler.
pub struct StepExecutor<P, E, T>
where
    P: StepOutputs,
    E: EndstopInputs,
    T: StepTimer,
{
    consumer: MoveConsumer,
    scheduler: StepScheduler<T>,
    pins: P,
    endstops: E,
    dda: Option<Dda>,
    position_steps: [i32; NUM_AXES],
    last_directions: AxisMask,
    tick_busy: bool,
    status: &'static QueueStatus,
}

impl<P, E, T> StepExecutor<P, E, T>
where
    P: StepOutputs,
    E: EndstopInputs,
    T: StepTimer,
{
    pub fn new(
        consumer: MoveConsumer,
        pins: P,
        endstops: E,
        timer: T,
        status: &'static QueueStatus,
    ) -> Self {
        StepExecutor {
            consumer,
            scheduler: StepScheduler::new(timer),
            pins,
            endstops,
            dda: None,
            position_steps: [0; NUM_AXES],
            last_directions: AxisMask::EMPTY,
            tick_busy: false,
            status,
        }
    }

    /// Energize the drivers and start the system tick.
    pub fn init(&mut self) {
        self.pins.enable_drivers(true);
        self.scheduler.init();
    }

    /// Step-compare service routine. Never blocks; either schedules the next
    /// fire or goes idle.
    pub fn on_step_compare(&mut self) {
        if self.status.is_stopped() {
            self.scheduler.stop();
            return;
        }
        match self.scheduler.service_step() {
            StepService::Wrap => (),
            StepService::Fire => self.advance(),
        }
    }

    /// System-tick service routine: lower priority than the step compare. A
    /// real port re-enables interrupts once the latch is taken so long tick
    /// bodies never delay a step.
    pub fn on_tick_compare(&mut self) {
        self.scheduler.service_tick();
        if self.tick_busy {
            return;
        }
        self.tick_busy = true;
        #[cfg(feature = "temporal")]
        if let Some(dda) = self.dda.as_mut() {
            dda.on_tick();
        }
        self.tick_busy = false;
    }

    /// Arm the first fire if the machine is sitting idle with work queued.
    pub fn kick(&mut self) {
        if !self.status.is_stopped() && self.consumer.peek().is_some() {
            self.scheduler.kick(MIN_STEP_TICKS);
        }
    }

    /// Emergency stop: disarm both compares, drop the live move and the
    /// ring contents, de-energize the drivers.
    pub fn halt(&mut self) {
        self.scheduler.stop();
        self.dda = None;
        while self.consumer.dequeue().is_some() {}
        self.pins.enable_drivers(false);
    }

    pub fn position_steps(&self) -> [i32; NUM_AXES] {
        self.position_steps
    }

    pub fn set_position_steps(&mut self, steps: [i32; NUM_AXES]) {
        self.position_steps = steps;
    }

    /// Run one real fire: step the live move, or activate the ring head.
    fn advance(&mut self) {
        loop {
            let Some(dda) = self.dda.as_mut() else {
                // The head stays in the ring while it runs; the producer's
                // emptiness check is therefore also the idle check.
                let Some(mv) = self.consumer.peek().copied() else {
                    self.scheduler.idle();
                    return;
                };
                let dir_change = mv.direction_mask != self.last_directions;
                self.pins.set_direction(mv.direction_mask);
                self.last_directions = mv.direction_mask;
                let (dda, first) = Dda::start(mv);
                self.dda = Some(dda);
                // Activation emits no pulse; with a direction flip the first
                // interval doubles as the DIR setup time.
                let first = if dir_change {
                    first.max(DIR_SETUP_TICKS)
                } else {
                    first
                };
                let _ = self.scheduler.schedule_step_in(first, false);
                return;
            };

            let done = dda.step(&mut self.pins, &mut self.endstops, &mut self.position_steps);
            if done {
                self.dda = None;
                let _ = self.consumer.dequeue();
                continue;
            }

            let delay = dda.owed_delay();
            let check_short = cfg!(feature = "temporal");
            match self.scheduler.schedule_step_in(delay, check_short) {
                Ok(()) => {
                    dda.delay_paid();
                    return;
                }
                Err(TooShort) => {
                    // Step immediately; the anchor stays put and the unpaid
                    // interval rides along on the next request.
                    dda.delay_carried();
                }
            }
        }
    }
}

/// Foreground half of the motion core.
pub struct MotionController<P, E, T>
where
    P: StepOutputs + 'static,
    E: EndstopInputs + 'static,
    T: StepTimer + 'static,
{
    config: MachineConfig,
    producer: MoveProducer,
    executor: &'static Mutex<RefCell<StepExecutor<P, E, T>>>,
    status: &'static QueueStatus,
    /// Planned position: where the machine ends up once the queue drains.
    startpoint: Position,
}

impl<P, E, T> MotionController<P, E, T>
where
    P: StepOutputs + 'static,
    E: EndstopInputs + 'static,
    T: StepTimer + 'static,
{
    /// Panics if `config` fails validation; the default table is checked at
    /// compile time, custom tables here.
    pub fn new(
        config: MachineConfig,
        producer: MoveProducer,
        executor: &'static Mutex<RefCell<StepExecutor<P, E, T>>>,
        status: &'static QueueStatus,
    ) -> Self {
        assert!(config.validate(), "invalid machine config");
        MotionController {
            config,
            producer,
            executor,
            status,
            startpoint: Position::ORIGIN,
        }
    }

    /// Energize drivers and start the system tick.
    pub fn init(&mut self) {
        critical_section::with(|cs| self.executor.borrow(cs).borrow_mut().init());
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// Queue a linear move to `target` at `feedrate_mm_min`. Blocks while
    /// the ring is full; returns once the move is accepted.
    pub fn enqueue(&mut self, target: Position, feedrate_mm_min: u32) -> Result<(), MotionError> {
        self.enqueue_watched(target, feedrate_mm_min, None)
    }

    /// Queue a homing move: runs until the masked endstop shows the watched
    /// edge (`stop_on_trigger`, or its release for back-off).
    pub fn enqueue_home(
        &mut self,
        target: Position,
        feedrate_mm_min: u32,
        endstop_mask: EndstopMask,
        stop_on_trigger: bool,
    ) -> Result<(), MotionError> {
        self.enqueue_watched(target, feedrate_mm_min, Some((endstop_mask, stop_on_trigger)))
    }

    fn enqueue_watched(
        &mut self,
        target: Position,
        feedrate_mm_min: u32,
        watch: Option<(EndstopMask, bool)>,
    ) -> Result<(), MotionError> {
        if self.status.is_stopped() {
            return Err(MotionError::EmergencyStopped);
        }
        let planned = Move::plan(&self.config, self.startpoint, target, feedrate_mm_min, watch)?;
        self.startpoint = target;
        if let Some(mv) = planned {
            self.push(mv)?;
        }
        Ok(())
    }

    fn push(&mut self, mv: Move) -> Result<(), MotionError> {
        // Producer blocks rather than overwrites. Interrupts keep running,
        // so the ring drains underneath us.
        while !self.producer.ready() {
            if self.status.is_stopped() {
                return Err(MotionError::EmergencyStopped);
            }
            core::hint::spin_loop();
        }
        // Cannot fail: we are the only producer and just saw a free slot.
        let _ = self.producer.enqueue(mv);
        critical_section::with(|cs| self.executor.borrow(cs).borrow_mut().kick());
        Ok(())
    }

    /// Number of moves in the ring, the live one included.
    pub fn queue_length(&self) -> usize {
        self.producer.len()
    }

    /// True when the ring is empty and no move is live.
    pub fn is_idle(&self) -> bool {
        self.producer.len() == 0
    }

    /// Block the foreground until the machine has drained.
    pub fn wait_idle(&self) {
        while !self.is_idle() {
            if self.status.is_stopped() {
                return;
            }
            core::hint::spin_loop();
        }
    }

    /// The position the queue converges to (the planner origin for the next
    /// move).
    pub fn position(&self) -> Position {
        self.startpoint
    }

    /// Adopt `position` as the current machine position. Only legal while
    /// idle; homing uses this to fix the origin after an endstop search.
    pub fn set_current_position(&mut self, position: Position) -> Result<(), MotionError> {
        if !self.is_idle() {
            return Err(MotionError::NotIdle);
        }
        self.startpoint = position;
        let mut steps = [0i32; NUM_AXES];
        for axis in Axis::ALL {
            let i = axis.index();
            let spm = i64::from(self.config.axes[i].steps_per_mm);
            steps[i] = (i64::from(position.0[i]) * spm / 1000) as i32;
        }
        critical_section::with(|cs| {
            self.executor
                .borrow(cs)
                .borrow_mut()
                .set_position_steps(steps)
        });
        Ok(())
    }

    /// Terminal stop: no further compares fire, the queue is dropped, the
    /// drivers are de-energized. [`MotionController::reset`] re-arms.
    pub fn emergency_stop(&mut self) {
        self.status.estop.store(true, Ordering::Release);
        critical_section::with(|cs| self.executor.borrow(cs).borrow_mut().halt());
    }

    /// Re-initialize after an emergency stop.
    pub fn reset(&mut self) {
        self.status.estop.store(false, Ordering::Release);
        self.init();
    }
}
