// MJVM debugger command definitions
//
// Every request starts with a one-byte opcode; every reply echoes it followed
// by a status byte (0 = success).

// Command opcodes
pub mod opcodes {
    pub const READ_STATUS: u8 = 0;
    pub const READ_STACK_TRACE: u8 = 1;
    pub const ADD_BREAKPOINT: u8 = 2;
    pub const REMOVE_BREAKPOINT: u8 = 3;
    pub const REMOVE_ALL_BREAKPOINTS: u8 = 4;
    pub const RUN: u8 = 5;
    pub const STOP: u8 = 6;
    pub const SINGLE_STEP: u8 = 7;
    // Reserved by the device, never sent by this client
    pub const READ_VARIABLE: u8 = 8;
    pub const WRITE_VARIABLE: u8 = 9;

    pub fn name(opcode: u8) -> &'static str {
        match opcode {
            READ_STATUS => "READ_STATUS",
            READ_STACK_TRACE => "READ_STACK_TRACE",
            ADD_BREAKPOINT => "ADD_BREAKPOINT",
            REMOVE_BREAKPOINT => "REMOVE_BREAKPOINT",
            REMOVE_ALL_BREAKPOINTS => "REMOVE_ALL_BREAKPOINTS",
            RUN => "RUN",
            STOP => "STOP",
            SINGLE_STEP => "SINGLE_STEP",
            READ_VARIABLE => "READ_VARIABLE",
            WRITE_VARIABLE => "WRITE_VARIABLE",
            _ => "UNKNOWN",
        }
    }
}

// Bits of the status byte returned by READ_STATUS
pub mod status_bits {
    pub const STOP: u8 = 0x01;
    pub const HIT_BREAKPOINT: u8 = 0x02;
    pub const SINGLE_STEP: u8 = 0x04;
}

// Reply status codes
pub mod reply_status {
    pub const OK: u8 = 0;
}
