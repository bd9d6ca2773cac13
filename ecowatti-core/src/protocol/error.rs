pub type ParseResult<T> = core::result::Result<T, ProtocolError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("window does not start at a frame marker (found {0:#04X})")]
    InvalidMarker(u8),
    #[error("payload of {size} bytes does not fit the size field (max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}
