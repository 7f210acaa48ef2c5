// MJVM debugger type definitions
//
// Common types shared by the connection, breakpoint and stack commands

use crate::commands::status_bits;
use serde::{Deserialize, Serialize};

/// Device status bitmask as reported by READ_STATUS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus(pub u8);

impl DeviceStatus {
    /// Assumed state before the first poll: halted on a breakpoint
    pub const INITIAL: DeviceStatus =
        DeviceStatus(status_bits::STOP | status_bits::HIT_BREAKPOINT);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_stopped(self) -> bool {
        self.0 & status_bits::STOP != 0
    }

    pub fn hit_breakpoint(self) -> bool {
        self.0 & status_bits::HIT_BREAKPOINT != 0
    }

    pub fn single_step(self) -> bool {
        self.0 & status_bits::SINGLE_STEP != 0
    }
}

impl Default for DeviceStatus {
    fn default() -> Self {
        Self::INITIAL
    }
}

/// What changed between two consecutive status readings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusChange {
    /// Hit-breakpoint bit went from 0 to 1
    pub breakpoint_hit: bool,
    /// Stop bit flipped in either direction
    pub stop_toggled: bool,
    /// Cached stack frames no longer describe the device
    pub frames_stale: bool,
}

impl StatusChange {
    pub fn between(old: DeviceStatus, new: DeviceStatus) -> Self {
        let stop_toggled = old.is_stopped() != new.is_stopped();
        Self {
            breakpoint_hit: !old.hit_breakpoint() && new.hit_breakpoint(),
            stop_toggled,
            // Leaving the breakpoint while still halted also moves the frame
            frames_stale: stop_toggled || old.hit_breakpoint() != new.hit_breakpoint(),
        }
    }
}

/// A stack frame reported by the device and resolved to a source line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    pub index: u32,
    pub pc: u32,
    pub class_name: String,
    pub method_name: String,
    pub descriptor: String,
    pub source_path: String,
    pub line: u32,
}

impl StackFrame {
    /// Same source position, ignoring the instruction pointer
    pub fn same_line(&self, other: &StackFrame) -> bool {
        self.line == other.line && self.source_path == other.source_path
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Running,
    Stopped { hit_breakpoint: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connected(RunState),
}

impl ConnectionState {
    pub fn from_status(status: DeviceStatus) -> Self {
        if status.is_stopped() {
            ConnectionState::Connected(RunState::Stopped {
                hit_breakpoint: status.hit_breakpoint(),
            })
        } else {
            ConnectionState::Connected(RunState::Running)
        }
    }
}

/// Commands issued by one `set_breakpoints` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BreakpointUpdate {
    pub added: usize,
    pub removed: usize,
}
