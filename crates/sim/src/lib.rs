//! Host-side simulation of the step-pulse scheduling core.
//!
//! A [`world::SimWorld`] stands in for the MCU: a 16-bit counter with step
//! and tick compares, recorded step/dir pins and modelled endstop switches.
//! [`harness::SimMachine`] runs the real executor against it, one compare
//! event at a time, with virtual time: traces are bit-for-bit reproducible
//! regardless of host scheduling.

pub mod harness;
pub mod world;

pub use harness::{SimController, SimMachine};
pub use world::{EndstopModel, PulseEvent, SimWorld};
