use super::{error::ParseResult, error::ProtocolError, *};

/// One frame as observed on the bus.
///
/// Inbound frames are never checksum-verified; when a frame carries a
/// checksum (outbound requests do) it is the last byte of `payload`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub communicator_id: u8,
    pub payload: Vec<u8>,
}

/// Outcome of decoding a window that starts at a frame marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// The window ends before the declared frame does.
    Incomplete { needed: usize, available: usize },
    /// A zero-size frame. Nothing to interpret, but `consumed` bytes are used up.
    Ignored { consumed: usize },
    /// A complete frame spanning the first `consumed` bytes of the window.
    Frame { frame: Frame, consumed: usize },
}

impl Frame {
    pub fn new(communicator_id: u8, payload: impl Into<Vec<u8>>) -> ParseResult<Self> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        Ok(Self {
            communicator_id,
            payload,
        })
    }

    pub fn declared_size(&self) -> u8 {
        self.payload.len() as u8
    }

    /// Decode the frame at the start of `window`.
    ///
    /// Bytes after the declared frame are left alone; callers advance by the
    /// returned `consumed` count.
    pub fn decode(window: &[u8]) -> ParseResult<Decoded> {
        if let Some(&first) = window.first() {
            if first != FRAME_MARKER {
                return Err(ProtocolError::InvalidMarker(first));
            }
        }

        if window.len() < FRAME_HEADER_SIZE {
            return Ok(Decoded::Incomplete {
                needed: FRAME_HEADER_SIZE,
                available: window.len(),
            });
        }

        let declared_size = window[2] as usize;
        if declared_size == 0 {
            return Ok(Decoded::Ignored {
                consumed: FRAME_HEADER_SIZE,
            });
        }

        let total_len = FRAME_HEADER_SIZE + declared_size;
        if window.len() < total_len {
            return Ok(Decoded::Incomplete {
                needed: total_len,
                available: window.len(),
            });
        }

        Ok(Decoded::Frame {
            frame: Frame {
                communicator_id: window[1],
                payload: window[FRAME_HEADER_SIZE..total_len].to_vec(),
            },
            consumed: total_len,
        })
    }

    /// Wire form: marker, communicator id, declared size, payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(FRAME_HEADER_SIZE + self.payload.len());
        bytes.push(FRAME_MARKER);
        bytes.push(self.communicator_id);
        bytes.push(self.declared_size());
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    pub fn is_request(&self) -> bool {
        self.payload.starts_with(&READ_REQUEST)
    }

    pub fn is_measurement(&self) -> bool {
        self.payload.starts_with(&MEASUREMENT_RESPONSE)
    }

    /// The reading carried by a measurement response, if this is one.
    pub fn measurement(&self) -> Option<Measurement> {
        if !self.is_measurement() {
            return None;
        }

        let value = self
            .payload
            .get(MEASUREMENT_VALUE_OFFSET..MEASUREMENT_VALUE_OFFSET + 2)?;

        Some(Measurement {
            raw: i16::from_le_bytes([value[0], value[1]]),
        })
    }

    /// The swept id byte, present in requests and in most responses.
    pub fn packet_id(&self) -> Option<u8> {
        self.payload.get(READ_REQUEST.len()).copied()
    }
}

/// A register read request addressed to one candidate transmitter id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestPacket {
    pub sender: u8,
    pub destination_id: u8,
    pub memory_address: u8,
}

impl RequestPacket {
    pub fn new(sender: u8, destination_id: u8, memory_address: u8) -> Self {
        Self {
            sender,
            destination_id,
            memory_address,
        }
    }

    /// Encode the request including its trailing checksum.
    pub fn encode(&self) -> [u8; REQUEST_FRAME_SIZE] {
        let mut bytes = [0u8; REQUEST_FRAME_SIZE];

        bytes[0] = FRAME_MARKER;
        bytes[1] = self.sender;
        bytes[2] = REQUEST_DECLARED_SIZE;
        bytes[3..6].copy_from_slice(&READ_REQUEST);
        bytes[6] = self.destination_id;
        bytes[7] = REQUEST_SEPARATOR;
        bytes[8] = self.memory_address;
        bytes[9] = checksum(&bytes[..REQUEST_FRAME_SIZE - 1]);

        bytes
    }

    /// Recover a request from a decoded frame. The checksum byte is not checked.
    pub fn from_frame(frame: &Frame) -> Option<Self> {
        if !frame.is_request() || frame.payload.len() < READ_REQUEST.len() + 3 {
            return None;
        }

        let addressing = &frame.payload[READ_REQUEST.len()..];
        if addressing[1] != REQUEST_SEPARATOR {
            return None;
        }

        Some(Self {
            sender: frame.communicator_id,
            destination_id: addressing[0],
            memory_address: addressing[2],
        })
    }
}

/// Raw measurement, ten times the physical value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measurement {
    pub raw: i16,
}

impl Measurement {
    pub fn value(&self) -> f64 {
        f64::from(self.raw) / 10.0
    }

    /// Whether the controller reported the register as having no sensor.
    pub fn is_disconnected(&self) -> bool {
        self.raw == SENSOR_DISCONNECTED
    }
}

/// A measurement response as the controller emits it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasurementPacket {
    pub communicator_id: u8,
    pub destination_id: u8,
    pub memory_address: u8,
    pub measurement: Measurement,
}

impl MeasurementPacket {
    pub fn to_frame(&self) -> Frame {
        let mut payload = Vec::with_capacity(MEASUREMENT_VALUE_OFFSET + 2);
        payload.extend_from_slice(&MEASUREMENT_RESPONSE);
        payload.push(self.destination_id);
        payload.push(REQUEST_SEPARATOR);
        payload.push(self.memory_address);
        payload.extend_from_slice(&self.measurement.raw.to_le_bytes());

        Frame {
            communicator_id: self.communicator_id,
            payload,
        }
    }
}
