// MJVM client library for remote debugging
//
// Two halves:
// - Class-file loading and line <-> pc resolution
// - The device protocol: connection, breakpoints, stack inspection,
//   execution control

pub mod classfile;
pub mod constant_pool;
pub mod method;
pub mod line_info;
pub mod reader;

pub mod commands;
pub mod config;
pub mod connection;
mod eventloop;
pub mod events;
pub mod gate;
pub mod protocol;
pub mod types;
pub mod vm;
pub mod breakpoints;
pub mod stackframe;

pub use classfile::{ClassFile, ClassFileError, ClassFileResult};
pub use config::DebuggerConfig;
pub use connection::MjvmDebugger;
pub use events::{DebuggerEvent, EventStream};
pub use gate::{Gate, GatePermit};
pub use line_info::{DebugLineInfo, LineResolver, ResolveError};
pub use protocol::{DebugResult, DebuggerError};
pub use types::{BreakpointUpdate, ConnectionState, DeviceStatus, RunState, StackFrame};
