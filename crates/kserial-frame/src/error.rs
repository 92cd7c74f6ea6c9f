/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame does not start with the magic bytes.
    #[error("invalid frame magic (expected 0x4B53 \"KS\")")]
    InvalidMagic,

    /// The header checksum does not match the header bytes.
    #[error("header checksum mismatch (expected 0x{expected:02X}, found 0x{found:02X})")]
    ChecksumMismatch { expected: u8, found: u8 },

    /// Fewer bytes are available than the frame requires.
    #[error("truncated frame ({available} bytes available, {needed} needed)")]
    Truncated { needed: usize, available: usize },

    /// The byte after the payload is not the `'\r'` terminator.
    #[error("missing frame terminator (found 0x{found:02X})")]
    MissingTerminator { found: u8 },

    /// The payload exceeds the 12-bit length field.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The supplied payload does not match the declared element count.
    #[error("payload length mismatch ({actual} bytes supplied, {expected} declared)")]
    PayloadLength { expected: usize, actual: usize },

    /// The payload is not a whole number of elements.
    #[error("payload of {bytes} bytes is not a multiple of element width {width}")]
    UnalignedPayload { bytes: usize, width: usize },

    /// Typed access asked for a different element type than the frame carries.
    #[error("data type mismatch (requested {expected}, frame carries {found})")]
    TypeMismatch {
        expected: crate::types::DataType,
        found: crate::types::DataType,
    },

    /// The reassembly buffer cannot take more bytes.
    #[error("receive buffer overflow ({needed} bytes offered, {spare} spare)")]
    BufferOverflow { needed: usize, spare: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The byte source closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

/// Coarse classification of [`FrameError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad magic or checksum.
    MalformedHeader,
    /// Terminator missing or not enough bytes.
    TruncatedFrame,
    /// Buffer capacity exceeded.
    Unrecoverable,
    /// The caller asked for a frame the wire format cannot carry.
    Encoding,
    /// Transport failure or end of stream.
    Io,
}

impl FrameError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            FrameError::InvalidMagic | FrameError::ChecksumMismatch { .. } => {
                ErrorCategory::MalformedHeader
            }
            FrameError::Truncated { .. } | FrameError::MissingTerminator { .. } => {
                ErrorCategory::TruncatedFrame
            }
            FrameError::BufferOverflow { .. } => ErrorCategory::Unrecoverable,
            FrameError::PayloadTooLarge { .. }
            | FrameError::PayloadLength { .. }
            | FrameError::UnalignedPayload { .. }
            | FrameError::TypeMismatch { .. } => ErrorCategory::Encoding,
            FrameError::Io(_) | FrameError::ConnectionClosed => ErrorCategory::Io,
        }
    }

    /// Decode failures a scanner recovers from by skipping ahead.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::MalformedHeader | ErrorCategory::TruncatedFrame
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
