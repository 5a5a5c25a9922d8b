//! A `no_std` driver for step/dir/enable stepper interfaces (DRV8825,
//! A4988, TMC step/dir mode and friends).
//!
//! The bank raises every selected STEP line, holds them high for the
//! configured pulse width through [`embedded_hal::delay::DelayNs`], then
//! lowers them together, implementing [`stepcore::StepOutputs`] for the step
//! executor. Direction setup time is the core's job (it pads the interval
//! after a direction flip); polarity per axis is handled here.

#![no_std]

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use stepcore::{Axis, AxisMask, StepOutputs};
use stepcore::config::STEP_PULSE_NS;

/// STEP and DIR lines for one axis.
pub struct StepDirChannel<STEP, DIR> {
    step: STEP,
    dir: DIR,
    /// Invert the DIR line for axes wired mirror-image.
    invert_dir: bool,
}

impl<STEP, DIR> StepDirChannel<STEP, DIR> {
    pub fn new(step: STEP, dir: DIR, invert_dir: bool) -> Self {
        StepDirChannel {
            step,
            dir,
            invert_dir,
        }
    }
}

/// Channels for the first `N` axes plus a shared active-low enable line.
pub struct StepDirBank<STEP, DIR, EN, D, const N: usize> {
    channels: [StepDirChannel<STEP, DIR>; N],
    enable: EN,
    delay: D,
    pulse_ns: u32,
}

impl<STEP, DIR, EN, D, const N: usize> StepDirBank<STEP, DIR, EN, D, N>
where
    STEP: OutputPin,
    DIR: OutputPin,
    EN: OutputPin,
    D: DelayNs,
{
    /// Pulse width defaults to the core's [`STEP_PULSE_NS`].
    pub fn new(channels: [StepDirChannel<STEP, DIR>; N], enable: EN, delay: D) -> Self {
        StepDirBank {
            channels,
            enable,
            delay,
            pulse_ns: STEP_PULSE_NS,
        }
    }

    /// Override the pulse width for drivers with other datasheet minimums.
    pub fn with_pulse_ns(mut self, pulse_ns: u32) -> Self {
        self.pulse_ns = pulse_ns;
        self
    }
}

impl<STEP, DIR, EN, D, const N: usize> StepOutputs for StepDirBank<STEP, DIR, EN, D, N>
where
    STEP: OutputPin,
    DIR: OutputPin,
    EN: OutputPin,
    D: DelayNs,
{
    fn set_direction(&mut self, directions: AxisMask) {
        for (i, channel) in self.channels.iter_mut().enumerate() {
            let positive = Axis::from_index(i).is_some_and(|axis| directions.contains(axis));
            // GPIO writes on the targets this runs on cannot fail; a fallible
            // signature is not available through StepOutputs.
            if positive != channel.invert_dir {
                channel.dir.set_high().ok();
            } else {
                channel.dir.set_low().ok();
            }
        }
    }

    fn step_pulse(&mut self, axes: AxisMask) {
        if axes.is_empty() {
            return;
        }
        for (i, channel) in self.channels.iter_mut().enumerate() {
            if Axis::from_index(i).is_some_and(|axis| axes.contains(axis)) {
                channel.step.set_high().ok();
            }
        }
        self.delay.delay_ns(self.pulse_ns);
        for (i, channel) in self.channels.iter_mut().enumerate() {
            if Axis::from_index(i).is_some_and(|axis| axes.contains(axis)) {
                channel.step.set_low().ok();
            }
        }
    }

    fn enable_drivers(&mut self, enabled: bool) {
        // nENABLE: low energizes the drivers.
        if enabled {
            self.enable.set_low().ok();
        } else {
            self.enable.set_high().ok();
        }
    }
}
