//! Error types for the motion core.

/// Errors surfaced by the foreground motion API.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MotionError {
    /// The requested move is impossible (e.g. zero feedrate).
    InvalidMove,
    /// The operation is only legal while the machine is idle.
    NotIdle,
    /// The axis has no endstop configured on the requested side.
    NoEndstop,
    /// The controller was emergency-stopped and needs a reset.
    EmergencyStopped,
}
