//! A `no_std` driver for banks of digital endstop inputs.
//!
//! Channels are indexed by the core's endstop bit layout (bit 0 = X−,
//! bit 1 = X+, bit 2 = Y−, …). Each channel carries its own polarity, so
//! normally-closed switches wired active-low read the same as normally-open
//! ones. The bank implements [`stepcore::EndstopInputs`] for use by the step
//! executor's per-step sampling; debouncing across samples happens in the
//! core, not here.

#![no_std]

use embedded_hal::digital::InputPin;
use stepcore::{EndstopInputs, EndstopMask};

/// One endstop input and its wiring polarity.
pub struct EndstopChannel<PIN> {
    pin: PIN,
    /// `true` when the switch pulls the line low while triggered.
    active_low: bool,
}

impl<PIN> EndstopChannel<PIN> {
    pub fn new(pin: PIN, active_low: bool) -> Self {
        EndstopChannel { pin, active_low }
    }
}

/// A bank of up to `N` endstop channels; slot `i` answers for mask bit `i`.
/// Unpopulated slots always read as open.
pub struct EndstopBank<PIN, const N: usize> {
    channels: [Option<EndstopChannel<PIN>>; N],
}

impl<PIN, const N: usize> EndstopBank<PIN, N> {
    pub fn new(channels: [Option<EndstopChannel<PIN>>; N]) -> Self {
        EndstopBank { channels }
    }
}

impl<PIN, E, const N: usize> EndstopBank<PIN, N>
where
    PIN: InputPin<Error = E>,
{
    /// Sample the channels selected by `watch`; returns the triggered subset.
    pub fn try_sample(&mut self, watch: EndstopMask) -> Result<EndstopMask, E> {
        let mut triggered = EndstopMask::EMPTY;
        for (bit, slot) in self.channels.iter_mut().enumerate() {
            if watch.bits() & (1 << bit) == 0 {
                continue;
            }
            if let Some(channel) = slot {
                let high = channel.pin.is_high()?;
                if high != channel.active_low {
                    triggered.insert(EndstopMask::from_bits(1 << bit));
                }
            }
        }
        Ok(triggered)
    }

    /// Sample every populated channel.
    pub fn try_sample_all(&mut self) -> Result<EndstopMask, E> {
        self.try_sample(EndstopMask::from_bits(u16::MAX))
    }
}

impl<PIN, E, const N: usize> EndstopInputs for EndstopBank<PIN, N>
where
    PIN: InputPin<Error = E>,
{
    fn sample(&mut self, watch: EndstopMask) -> EndstopMask {
        // A failed read samples as open; the core's debounce window means a
        // transient fault cannot end a homing move on its own.
        self.try_sample(watch).unwrap_or(EndstopMask::EMPTY)
    }
}
