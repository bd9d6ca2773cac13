mod checksum;
mod error;
mod frame;
mod reassembler;

pub use checksum::{ECOWATTI_CRC_8, checksum};
pub use error::{ParseResult, ProtocolError};
pub use frame::{Decoded, Frame, Measurement, MeasurementPacket, RequestPacket};
pub use reassembler::{Drain, StreamReassembler};

// frame structure : marker(1) + communicator id(1) + declared size(1) + payload(declared size)

pub const FRAME_MARKER: u8 = 0xA3;
pub const FRAME_HEADER_SIZE: usize = 3;
pub const MAX_PAYLOAD_SIZE: usize = u8::MAX as usize;

/// Payload prefix of a register read request.
pub const READ_REQUEST: [u8; 3] = [0xA2, 0x81, 0x81];
/// Payload prefix of a measurement response.
pub const MEASUREMENT_RESPONSE: [u8; 3] = [0xA2, 0x80, 0x83];
/// Byte between the destination id and the memory address in a read request.
pub const REQUEST_SEPARATOR: u8 = 0xAA;

/// Declared size of a read request: six request bytes plus the trailing checksum.
pub const REQUEST_DECLARED_SIZE: u8 = 0x07;
pub const REQUEST_FRAME_SIZE: usize = FRAME_HEADER_SIZE + REQUEST_DECLARED_SIZE as usize;

/// Offset of the little-endian value within a measurement payload.
pub const MEASUREMENT_VALUE_OFFSET: usize = 6;

/// Raw reading reported for a register with no sensor attached (3276.7).
pub const SENSOR_DISCONNECTED: i16 = i16::MAX;
