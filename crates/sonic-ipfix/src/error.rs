//! Error types for IPFIX decoding.

use thiserror::Error;

/// Result type alias for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;

/// Errors raised while decoding an IPFIX message or data set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Ran out of bytes while reading a structure.
    #[error("truncated message: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    /// Header version is not IPFIX.
    #[error("unsupported version {0} (expected 10)")]
    UnsupportedVersion(u16),

    /// Header length disagrees with the datagram.
    #[error("invalid message length {declared} for datagram of {available} bytes")]
    InvalidLength { declared: usize, available: usize },

    /// Set header length is shorter than a set header or overruns the message.
    #[error("invalid set {set_id} with length {length}")]
    InvalidSet { set_id: u16, length: usize },

    /// Template record announces an id in the reserved range.
    #[error("invalid template id {0}")]
    InvalidTemplateId(u16),

    /// Options template whose scope field count is zero or exceeds its field count.
    #[error("options template {template_id} has scope count {scope_count} for {field_count} fields")]
    InvalidScopeCount {
        template_id: u16,
        scope_count: u16,
        field_count: u16,
    },

    /// A data record ended before all template fields were read.
    #[error("data record for template {template_id} is too short")]
    RecordTooShort { template_id: u16 },
}
