//! Hardware seams for step outputs, endstop inputs and the step timer.
//!
//! The core never touches registers. Ports implement these traits over their
//! GPIO and timer peripherals; the sim crate implements them over a virtual
//! machine. On STM32-class parts [`StepOutputs::step_pulse`] maps naturally
//! onto a BSRR-style atomic set followed by the configured hold and an atomic
//! clear.

use crate::axis::{AxisMask, EndstopMask};

/// Step and direction outputs for all axes.
pub trait StepOutputs {
    /// Latch the direction lines. A set bit drives the axis toward positive
    /// coordinates. Callers guarantee at least
    /// [`crate::config::DIR_SETUP_TICKS`] between a change and the next step
    /// on that axis.
    fn set_direction(&mut self, directions: AxisMask);

    /// Emit one step pulse on every axis in `axes`: raise the STEP lines,
    /// hold them high for [`crate::config::STEP_PULSE_NS`], lower them.
    fn step_pulse(&mut self, axes: AxisMask);

    /// Energize or de-energize the stepper drivers.
    fn enable_drivers(&mut self, enabled: bool);
}

/// Endstop switch inputs.
pub trait EndstopInputs {
    /// Sample the endstops selected by `watch` and return the subset that is
    /// currently triggered. Called from the step service routine, so it must
    /// be non-blocking; debouncing across samples is the caller's concern.
    fn sample(&mut self, watch: EndstopMask) -> EndstopMask;
}
