//! Simulation harness: wires the real motion core to the virtual MCU and
//! drives its compare events, either one at a time (deterministic,
//! single-threaded) or from a background thread so foreground blocking APIs
//! (`wait_idle`, full-ring pushes, the homing driver) run exactly as they
//! would against hardware.

use std::cell::RefCell;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::thread::JoinHandle;

use anyhow::Result;
use critical_section::Mutex;
use tracing::{debug, info};

use stepcore::axis::{Axis, EndstopSide, NUM_AXES};
use stepcore::config::MachineConfig;
use stepcore::controller::{MotionController, QueueStatus, StepExecutor};
use stepcore::queue::MoveQueue;

use crate::world::{
    wrap_distance, EndstopModel, PulseEvent, SharedWorld, SimEndstops, SimPins, SimTimer, SimWorld,
};

pub type SimExecutor = StepExecutor<SimPins, SimEndstops, SimTimer>;
pub type SimController = MotionController<SimPins, SimEndstops, SimTimer>;

/// Fire the next due compare event. On a tie the step compare wins and the
/// pending tick runs right after the step handler returns, as the interrupt
/// priorities dictate. Returns `false` when nothing is armed.
fn fire_event(world: &SharedWorld, executor: &'static Mutex<RefCell<SimExecutor>>) -> bool {
    critical_section::with(|cs| {
        let (fire_step, fire_tick) = {
            let mut world = world.lock().unwrap();
            let counter = world.counter();
            let step = world.step_compare.map(|c| wrap_distance(c, counter));
            let tick = world.tick_compare.map(|c| wrap_distance(c, counter));
            let (advance, fire_step, fire_tick) = match (step, tick) {
                (None, None) => return false,
                (Some(s), None) => (s, true, false),
                (None, Some(t)) => (t, false, true),
                (Some(s), Some(t)) => {
                    if s < t {
                        (s, true, false)
                    } else if t < s {
                        (t, false, true)
                    } else {
                        (s, true, true)
                    }
                }
            };
            world.now += u64::from(advance);
            (fire_step, fire_tick)
        };
        let mut executor = executor.borrow(cs).borrow_mut();
        if fire_step {
            executor.on_step_compare();
        }
        if fire_tick {
            // A handler may have disarmed the tick (emergency stop); a
            // masked interrupt cannot fire.
            let still_armed = world.lock().unwrap().tick_compare.is_some();
            if still_armed {
                executor.on_tick_compare();
            }
        }
        true
    })
}

/// A complete simulated machine. Dropping it stops the event thread.
pub struct SimMachine {
    world: SharedWorld,
    executor: &'static Mutex<RefCell<SimExecutor>>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SimMachine {
    /// Build a machine for `config` and return it with its controller. The
    /// controller is already initialized (drivers on, system tick armed).
    pub fn new(config: MachineConfig) -> (SimMachine, SimController) {
        let world: SharedWorld = Arc::new(StdMutex::new(SimWorld::default()));

        // The core expects 'static plumbing, as it would get from statics in
        // a firmware image; tests get it by leaking.
        let queue: &'static mut MoveQueue = Box::leak(Box::new(MoveQueue::new()));
        let status: &'static QueueStatus = Box::leak(Box::new(QueueStatus::new()));
        let (producer, consumer) = queue.split();

        let executor = StepExecutor::new(
            consumer,
            SimPins(world.clone()),
            SimEndstops(world.clone()),
            SimTimer(world.clone()),
            status,
        );
        let executor: &'static Mutex<RefCell<SimExecutor>> =
            Box::leak(Box::new(Mutex::new(RefCell::new(executor))));

        let mut controller = MotionController::new(config, producer, executor, status);
        controller.init();

        let machine = SimMachine {
            world,
            executor,
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        };
        (machine, controller)
    }

    /// Place a virtual endstop on `axis`, triggering at `trigger_at_steps`.
    pub fn set_endstop(&self, axis: Axis, side: EndstopSide, trigger_at_steps: i64) {
        self.world.lock().unwrap().endstops[axis.index()] = Some(EndstopModel {
            side,
            trigger_at_steps,
        });
    }

    /// Fire the next due compare event. Returns `false` when nothing is
    /// armed.
    pub fn fire_one(&self) -> bool {
        fire_event(&self.world, self.executor)
    }

    /// Single-threaded drive: fire events until the controller reports idle.
    /// Panics if `max_events` fires were not enough (a stuck machine).
    pub fn run_until_idle(&self, controller: &SimController, max_events: u64) {
        let mut fired = 0u64;
        while !controller.is_idle() {
            assert!(self.fire_one(), "machine not idle but nothing armed");
            fired += 1;
            assert!(fired <= max_events, "no idle after {} events", max_events);
        }
        debug!(fired, "machine drained");
    }

    /// Start the background event thread for tests that exercise the
    /// blocking foreground APIs.
    pub fn start(&mut self) {
        if self.thread.is_some() {
            return;
        }
        info!("starting sim event thread");
        self.running.store(true, Ordering::SeqCst);
        let world = self.world.clone();
        let executor = self.executor;
        let running = self.running.clone();
        self.thread = Some(std::thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                if !fire_event(&world, executor) {
                    std::thread::yield_now();
                }
            }
        }));
    }

    /// Stop and join the event thread.
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
            info!("sim event thread stopped");
        }
    }

    pub fn trace(&self) -> Vec<PulseEvent> {
        self.world.lock().unwrap().trace.clone()
    }

    /// Total pulses emitted per axis.
    pub fn pulses_per_axis(&self) -> [u64; NUM_AXES] {
        let mut counts = [0u64; NUM_AXES];
        for event in self.world.lock().unwrap().trace.iter() {
            for axis in Axis::ALL {
                if event.axes & (1 << axis.index()) != 0 {
                    counts[axis.index()] += 1;
                }
            }
        }
        counts
    }

    /// True machine position in steps.
    pub fn position_steps(&self) -> [i64; NUM_AXES] {
        self.world.lock().unwrap().steps
    }

    pub fn drivers_enabled(&self) -> bool {
        self.world.lock().unwrap().drivers_enabled
    }

    /// Currently armed (step, tick) compares.
    pub fn armed_compares(&self) -> (Option<u16>, Option<u16>) {
        let world = self.world.lock().unwrap();
        (world.step_compare, world.tick_compare)
    }

    /// Dump the pulse trace as JSON for offline analysis.
    pub fn dump_trace(&self, path: &Path) -> Result<()> {
        info!(path = %path.display(), "dumping pulse trace");
        let trace = self.trace();
        let mut file = File::create(path)?;
        let json = serde_json::to_string_pretty(&trace)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

impl Drop for SimMachine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
