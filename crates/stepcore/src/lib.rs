//! # Step-Pulse Scheduling Core
//!
//! A deterministic, `no_std`-friendly motion core for 3D printers and CNC
//! machines: queued Cartesian moves in, precisely timed stepper pulses out.
//!
//! The core is a single hardware-timer-driven state machine. The foreground
//! plans [`Move`]s and publishes them over a lock-free SPSC ring; the
//! step-compare service routine pops them, runs the Bresenham DDA one step
//! per fire, asks the velocity profiler for the next inter-step interval and
//! asks the [`timer::StepScheduler`] to fire that many ticks after the
//! previous compare. A fixed-period system tick on the same counter carries
//! the profiler's time-based bookkeeping.
//!
//! Hardware is reached only through the [`pins::StepOutputs`],
//! [`pins::EndstopInputs`] and [`timer::StepTimer`] traits, so the same core
//! runs on an MCU port and on the host-side simulator.
//!
//! Hot-path rules: no floating point, no allocation, no blocking. The
//! foreground may block in `enqueue` (ring full) and `wait_idle` only.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod axis;
pub mod config;
pub mod controller;
pub mod dda;
pub mod error;
pub mod homing;
pub mod pins;
pub mod profile;
pub mod queue;
pub mod timer;

pub use axis::{Axis, AxisMask, EndstopMask, EndstopSide, Position, NUM_AXES};
pub use config::{AxisConfig, MachineConfig, DEFAULT_CONFIG, QUEUE_CAPACITY};
pub use controller::{MotionController, QueueStatus, StepExecutor};
pub use dda::Dda;
pub use error::MotionError;
pub use homing::HomingDriver;
pub use pins::{EndstopInputs, StepOutputs};
pub use queue::{Move, MoveConsumer, MoveProducer, MoveQueue};
pub use timer::{StepScheduler, StepTimer};
