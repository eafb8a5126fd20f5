//! Monitor lifecycle state.

use core::fmt;

/// Lifecycle of an instance monitor.
///
/// States are ordered and a monitor only ever moves forward:
/// `NotStarted < Running < StopRequested < CleanedUp`. `CleanedUp` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum MonitorState {
    #[default]
    NotStarted = 0,
    Running = 1,
    StopRequested = 2,
    CleanedUp = 3,
}

impl MonitorState {
    /// Decode a state stored as its `u8` discriminant.
    ///
    /// Values above the last discriminant saturate to `CleanedUp`.
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::NotStarted,
            1 => Self::Running,
            2 => Self::StopRequested,
            _ => Self::CleanedUp,
        }
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not-started",
            Self::Running => "running",
            Self::StopRequested => "stop-requested",
            Self::CleanedUp => "cleaned-up",
        }
    }

    /// True once the monitor has released everything it owned.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::CleanedUp)
    }
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
