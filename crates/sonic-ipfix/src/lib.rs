//! Minimal IPFIX (RFC 7011) codec.
//!
//! Splits an IPFIX message into its header, template records and raw data
//! sets. Data sets are only decoded into records once the caller has found
//! the matching template, since the record layout is defined out-of-band:
//!
//! ```text
//! datagram ──decode()──▶ Packet { header, templates, data_sets }
//!                                              │
//!              TemplateRecord::decode_records(payload)
//!                                              ▼
//!                                     Vec<DataRecord>
//! ```
//!
//! Field values are handed out in codec order: scalar fields keep their
//! big-endian wire order, address-typed fields are reversed (see
//! [`fields::is_address`]). Consumers restore addresses to network order.
//!
//! The [`encode`] module builds well-formed messages for tests and load
//! generators.

mod decode;
pub mod encode;
mod error;
pub mod fields;
mod packet;

pub use decode::decode;
pub use error::{CodecError, Result};
pub use packet::{DataRecord, DataSet, FieldSpecifier, Header, Packet, TemplateRecord};

/// IPFIX protocol version carried in every message header.
pub const IPFIX_VERSION: u16 = 10;

/// Size of the fixed message header in octets.
pub const HEADER_LEN: usize = 16;

/// Size of a set header (set id + length) in octets.
pub const SET_HEADER_LEN: usize = 4;

/// Set id of a template set.
pub const TEMPLATE_SET_ID: u16 = 2;

/// Set id of an options template set.
pub const OPTIONS_TEMPLATE_SET_ID: u16 = 3;

/// Lowest set id that denotes a data set (and lowest valid template id).
pub const MIN_DATA_SET_ID: u16 = 256;

/// Field length marking a variable-length information element.
pub const VARIABLE_LENGTH: u16 = 65535;
