// Wire protocol for the Me Encoder Motor driver boards
//
// Provides:
// - Frame encoding/decoding with XOR checksum
// - Opcodes and typed motor commands

pub mod frame;

pub use frame::{
    Arg, DecodedFrame, FRAME_OVERHEAD, FrameError, MAX_SPEED_RPM, MotorCommand, Opcode, checksum,
    clamp_speed, decode, encode,
};
