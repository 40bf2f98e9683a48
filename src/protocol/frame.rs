// Me Encoder Motor frame codec
//
// Frame format:
// [0xA5, 0x01, Length (i32 LE), Slot, Opcode, Args..., Checksum, 0x5A]
//
// Length counts Slot + Opcode + Args only. Checksum is the XOR of the same bytes.

/// Frame header bytes
pub const HEADER: [u8; 2] = [0xA5, 0x01];

/// Frame terminator byte
pub const END: u8 = 0x5A;

/// Bytes surrounding the payload: header (2) + length (4) + checksum (1) + end (1)
pub const FRAME_OVERHEAD: usize = HEADER.len() + 4 + 2;

/// Speed limit of the driver board, in RPM
pub const MAX_SPEED_RPM: f32 = 200.0;

/// Opcodes understood by the driver board
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    MoveSpd = 0x05,
    Reset = 0x07,
    MoveSpdTime = 0x08,
    GetSpd = 0x09,
    MoveAgl = 0x11,
}

impl TryFrom<u8> for Opcode {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x05 => Ok(Opcode::MoveSpd),
            0x07 => Ok(Opcode::Reset),
            0x08 => Ok(Opcode::MoveSpdTime),
            0x09 => Ok(Opcode::GetSpd),
            0x11 => Ok(Opcode::MoveAgl),
            other => Err(FrameError::UnknownOpcode(other)),
        }
    }
}

/// A numeric argument with its packing format
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arg {
    /// 32-bit float (speed, angle, time)
    F32(f32),
    /// 32-bit signed integer
    I32(i32),
    /// Signed byte
    I8(i8),
}

impl Arg {
    /// Append the little-endian encoding of this argument
    fn pack_into(&self, out: &mut Vec<u8>) {
        match *self {
            Arg::F32(v) => out.extend_from_slice(&v.to_le_bytes()),
            Arg::I32(v) => out.extend_from_slice(&v.to_le_bytes()),
            Arg::I8(v) => out.extend_from_slice(&v.to_le_bytes()),
        }
    }

    pub fn packed_len(&self) -> usize {
        match self {
            Arg::F32(_) | Arg::I32(_) => 4,
            Arg::I8(_) => 1,
        }
    }
}

/// Errors found while decoding a frame
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrameError {
    #[error("Frame too short: {len} bytes")]
    TooShort { len: usize },

    #[error("Invalid header: {0:02X?}")]
    InvalidHeader([u8; 2]),

    #[error("Invalid terminator: 0x{0:02X}")]
    InvalidTerminator(u8),

    #[error("Length field says {declared} payload bytes, frame carries {actual}")]
    LengthMismatch { declared: i32, actual: usize },

    #[error("Checksum mismatch: computed 0x{computed:02X}, received 0x{received:02X}")]
    ChecksumMismatch { computed: u8, received: u8 },

    #[error("Unknown opcode 0x{0:02X}")]
    UnknownOpcode(u8),
}

/// A command for one motor slot
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotorCommand {
    RunAtSpeed { speed: f32 },
    /// `time` in seconds
    RunAtSpeedForTime { speed: f32, time: f32 },
    /// `angle` in degrees
    RotateByAngle { angle: f32, speed: f32 },
    Stop,
    QuerySpeed,
}

impl MotorCommand {
    pub fn opcode(&self) -> Opcode {
        match self {
            MotorCommand::RunAtSpeed { .. } => Opcode::MoveSpd,
            MotorCommand::RunAtSpeedForTime { .. } => Opcode::MoveSpdTime,
            MotorCommand::RotateByAngle { .. } => Opcode::MoveAgl,
            MotorCommand::Stop => Opcode::Reset,
            MotorCommand::QuerySpeed => Opcode::GetSpd,
        }
    }

    /// Arguments in wire order. Speeds are clamped here so that an
    /// out-of-range value can never be encoded.
    pub fn args(&self) -> Vec<Arg> {
        match *self {
            MotorCommand::RunAtSpeed { speed } => vec![Arg::F32(clamp_speed(speed))],
            MotorCommand::RunAtSpeedForTime { speed, time } => {
                vec![Arg::F32(clamp_speed(speed)), Arg::F32(time.max(0.0))]
            }
            MotorCommand::RotateByAngle { angle, speed } => {
                vec![Arg::F32(angle), Arg::F32(clamp_speed(speed))]
            }
            MotorCommand::Stop | MotorCommand::QuerySpeed => Vec::new(),
        }
    }

    /// Encode this command for the given 0-based slot
    pub fn encode(&self, slot: u8) -> Vec<u8> {
        encode(slot, self.opcode(), &self.args())
    }
}

/// Clamp a speed to the driver's [-200, 200] RPM range. NaN becomes 0.
pub fn clamp_speed(speed: f32) -> f32 {
    if speed.is_nan() {
        return 0.0;
    }
    speed.clamp(-MAX_SPEED_RPM, MAX_SPEED_RPM)
}

/// XOR-fold of every byte (longitudinal redundancy check)
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |lrc, &b| lrc ^ b)
}

/// Build a complete frame for `slot`, `opcode` and packed `args`
pub fn encode(slot: u8, opcode: Opcode, args: &[Arg]) -> Vec<u8> {
    let args_len: usize = args.iter().map(Arg::packed_len).sum();

    let mut payload = Vec::with_capacity(2 + args_len);
    Arg::I8(slot as i8).pack_into(&mut payload);
    payload.push(opcode as u8);
    for arg in args {
        arg.pack_into(&mut payload);
    }

    let mut frame = Vec::with_capacity(FRAME_OVERHEAD + payload.len());
    frame.extend_from_slice(&HEADER);
    Arg::I32(payload.len() as i32).pack_into(&mut frame);
    frame.extend_from_slice(&payload);
    frame.push(checksum(&payload));
    frame.push(END);

    frame
}

/// A frame whose envelope and checksum have been validated
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub slot: u8,
    pub opcode: u8,
    pub args: Vec<u8>,
    pub checksum: u8,
}

impl DecodedFrame {
    /// Read the `index`-th 4-byte float argument
    pub fn f32_arg(&self, index: usize) -> Option<f32> {
        let start = index * 4;
        let bytes = self.args.get(start..start + 4)?;
        Some(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

/// Validate and split a frame. `bytes` must contain exactly one frame.
pub fn decode(bytes: &[u8]) -> Result<DecodedFrame, FrameError> {
    if bytes.len() < FRAME_OVERHEAD + 2 {
        return Err(FrameError::TooShort { len: bytes.len() });
    }

    let header = [bytes[0], bytes[1]];
    if header != HEADER {
        return Err(FrameError::InvalidHeader(header));
    }

    let declared = i32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
    let actual = bytes.len() - FRAME_OVERHEAD;
    if declared < 2 || declared as usize != actual {
        return Err(FrameError::LengthMismatch { declared, actual });
    }

    let payload = &bytes[6..6 + actual];
    let received = bytes[6 + actual];
    let computed = checksum(payload);
    if computed != received {
        return Err(FrameError::ChecksumMismatch { computed, received });
    }

    let terminator = bytes[bytes.len() - 1];
    if terminator != END {
        return Err(FrameError::InvalidTerminator(terminator));
    }

    Ok(DecodedFrame {
        slot: payload[0],
        opcode: payload[1],
        args: payload[2..].to_vec(),
        checksum: received,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_at_speed_frame_bytes() {
        let frame = MotorCommand::RunAtSpeed { speed: 100.0 }.encode(0);
        // 100.0f32 = 0x42C80000, checksum = 0x00 ^ 0x05 ^ 0xC8 ^ 0x42 = 0x8F
        assert_eq!(
            frame,
            vec![
                0xA5, 0x01, 0x06, 0x00, 0x00, 0x00, 0x00, 0x05, 0x00, 0x00, 0xC8, 0x42, 0x8F, 0x5A
            ]
        );
    }

    #[test]
    fn test_stop_frame_bytes() {
        let frame = MotorCommand::Stop.encode(1);
        assert_eq!(
            frame,
            vec![0xA5, 0x01, 0x02, 0x00, 0x00, 0x00, 0x01, 0x07, 0x06, 0x5A]
        );
    }

    #[test]
    fn test_encode_is_deterministic() {
        let cmd = MotorCommand::RotateByAngle {
            angle: -37.5,
            speed: 80.0,
        };
        assert_eq!(cmd.encode(1), cmd.encode(1));
    }

    #[test]
    fn test_clamp_speed_range_and_idempotence() {
        let samples = [
            -1.0e9,
            -200.5,
            -200.0,
            -13.25,
            0.0,
            42.0,
            199.99,
            200.0,
            1000.0,
            f32::INFINITY,
            f32::NEG_INFINITY,
            f32::NAN,
        ];
        for s in samples {
            let c = clamp_speed(s);
            assert!((-200.0..=200.0).contains(&c), "clamp({}) = {}", s, c);
            assert_eq!(clamp_speed(c), c);
        }
    }

    #[test]
    fn test_unclamped_speed_never_reaches_wire() {
        let frame = MotorCommand::RunAtSpeedForTime {
            speed: -350.0,
            time: 1.5,
        }
        .encode(0);
        let decoded = decode(&frame).unwrap();
        assert_eq!(decoded.opcode, Opcode::MoveSpdTime as u8);
        assert_eq!(decoded.f32_arg(0), Some(-200.0));
        assert_eq!(decoded.f32_arg(1), Some(1.5));
    }

    #[test]
    fn test_length_field_and_checksum_round_trip() {
        let commands = [
            MotorCommand::RunAtSpeed { speed: -12.5 },
            MotorCommand::RunAtSpeedForTime {
                speed: 150.0,
                time: 0.6,
            },
            MotorCommand::RotateByAngle {
                angle: 90.0,
                speed: 30.0,
            },
            MotorCommand::Stop,
            MotorCommand::QuerySpeed,
        ];

        for (slot, cmd) in commands.iter().flat_map(|c| [(0u8, c), (1u8, c)]) {
            let frame = cmd.encode(slot);
            let declared = i32::from_le_bytes([frame[2], frame[3], frame[4], frame[5]]);
            let args_len: usize = cmd.args().iter().map(Arg::packed_len).sum();
            assert_eq!(declared as usize, 2 + args_len);

            let decoded = decode(&frame).unwrap();
            assert_eq!(decoded.slot, slot);
            assert_eq!(Opcode::try_from(decoded.opcode).unwrap(), cmd.opcode());

            let mut region = vec![decoded.slot, decoded.opcode];
            region.extend_from_slice(&decoded.args);
            assert_eq!(checksum(&region), decoded.checksum);
        }
    }

    #[test]
    fn test_single_bit_flip_is_detected() {
        let frame = MotorCommand::RotateByAngle {
            angle: 12.0,
            speed: 50.0,
        }
        .encode(1);
        let checksum_index = frame.len() - 2;

        for i in 6..checksum_index {
            for bit in 0..8 {
                let mut corrupted = frame.clone();
                corrupted[i] ^= 1 << bit;
                assert_ne!(
                    checksum(&corrupted[6..checksum_index]),
                    frame[checksum_index],
                    "flip of byte {} bit {} went undetected",
                    i,
                    bit
                );
                assert!(matches!(
                    decode(&corrupted),
                    Err(FrameError::ChecksumMismatch { .. })
                ));
            }
        }
    }

    #[test]
    fn test_decode_rejects_bad_envelope() {
        let frame = MotorCommand::Stop.encode(0);

        assert_eq!(
            decode(&frame[..5]),
            Err(FrameError::TooShort { len: 5 })
        );

        let mut bad_header = frame.clone();
        bad_header[0] = 0xFF;
        assert!(matches!(
            decode(&bad_header),
            Err(FrameError::InvalidHeader(_))
        ));

        let mut bad_end = frame.clone();
        *bad_end.last_mut().unwrap() = 0x00;
        assert_eq!(decode(&bad_end), Err(FrameError::InvalidTerminator(0x00)));

        let mut bad_len = frame;
        bad_len[2] = 7;
        assert!(matches!(
            decode(&bad_len),
            Err(FrameError::LengthMismatch { declared: 7, .. })
        ));
    }
}
