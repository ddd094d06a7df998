//! Error types for the protocol layer.

/// Why an audio buffer could not be turned back into a token.
///
/// Every variant surfaces upstream as a `RejectedUnknownToken` outcome. The
/// decoder never returns a partially decoded token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// No window in the buffer matched the frame preamble.
    #[error("no preamble found in audio buffer")]
    NoPreamble,

    /// The CRC carried by the frame does not match its payload.
    #[error("checksum mismatch: frame carried {expected:#06x}, payload hashes to {actual:#06x}")]
    ChecksumMismatch {
        /// CRC transmitted in the frame.
        expected: u16,
        /// CRC computed over the received payload.
        actual: u16,
    },

    /// The buffer ended before the frame did.
    #[error("frame truncated: needed {needed}, had {available}")]
    Truncated {
        /// Samples (or bytes) required to finish the frame.
        needed: usize,
        /// Samples (or bytes) actually present.
        available: usize,
    },

    /// The buffer was captured at a rate the codec was not built for.
    #[error("sample rate mismatch: codec runs at {expected} Hz, buffer is {actual} Hz")]
    SampleRateMismatch {
        /// Rate the codec is configured for.
        expected: u32,
        /// Rate of the supplied buffer.
        actual: u32,
    },
}

/// Errors raised while setting up the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The codec configuration cannot produce a decodable signal.
    #[error("invalid codec config: {0}")]
    InvalidConfig(String),
}
