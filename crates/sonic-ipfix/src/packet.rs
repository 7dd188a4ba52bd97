//! Decoded IPFIX message structures.

use crate::decode::Reader;
use crate::error::{CodecError, Result};
use crate::fields;
use crate::VARIABLE_LENGTH;
use std::net::Ipv4Addr;

/// IPFIX message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u16,
    /// Total message length in octets, header included
    pub length: u16,
    /// Export time in seconds since the epoch
    pub export_time: u32,
    pub sequence_number: u32,
    /// Observation domain id
    pub domain_id: u32,
}

/// One field specifier of a template record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldSpecifier {
    /// Information element id, enterprise bit cleared
    pub id: u16,
    /// Field length in octets, [`VARIABLE_LENGTH`] for variable-length fields
    pub length: u16,
    /// Private enterprise number for enterprise-specific elements
    pub enterprise: Option<u32>,
}

impl FieldSpecifier {
    /// Creates an IANA (non-enterprise) field specifier.
    pub const fn iana(id: u16, length: u16) -> Self {
        Self {
            id,
            length,
            enterprise: None,
        }
    }

    pub const fn is_variable_length(&self) -> bool {
        self.length == VARIABLE_LENGTH
    }

    /// Returns true if the codec reverses this field's octets.
    pub const fn is_address(&self) -> bool {
        self.enterprise.is_none() && fields::is_address(self.id)
    }
}

/// A template record: the field layout of the data sets that reference it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemplateRecord {
    pub template_id: u16,
    pub fields: Vec<FieldSpecifier>,
}

impl TemplateRecord {
    pub fn new(template_id: u16, fields: Vec<FieldSpecifier>) -> Self {
        Self {
            template_id,
            fields,
        }
    }

    /// Smallest number of octets a record of this template can occupy.
    ///
    /// Variable-length fields contribute their one-octet length prefix.
    pub fn min_record_len(&self) -> usize {
        self.fields
            .iter()
            .map(|f| {
                if f.is_variable_length() {
                    1
                } else {
                    usize::from(f.length)
                }
            })
            .sum()
    }

    /// Decodes the records of a data set laid out by this template.
    ///
    /// Decoding stops once fewer octets than [`min_record_len`] remain; the
    /// rest is set padding. For templates with variable-length fields, whose
    /// minimum is only one octet per such field, a zero-filled tail shorter
    /// than the 4-octet set alignment is padding as well.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::RecordTooShort`] if a variable-length field
    /// announces more octets than the set holds.
    ///
    /// [`min_record_len`]: TemplateRecord::min_record_len
    pub fn decode_records(&self, payload: &[u8]) -> Result<Vec<DataRecord>> {
        let min_len = self.min_record_len();
        if min_len == 0 {
            return Ok(Vec::new());
        }

        let too_short = |_| CodecError::RecordTooShort {
            template_id: self.template_id,
        };

        let variable = self.fields.iter().any(FieldSpecifier::is_variable_length);
        let mut reader = Reader::new(payload);
        let mut records = Vec::with_capacity(payload.len() / min_len);

        while reader.remaining() >= min_len {
            if variable && is_alignment_padding(reader.rest()) {
                break;
            }
            let mut values = Vec::with_capacity(self.fields.len());
            for field in &self.fields {
                let len = if field.is_variable_length() {
                    match reader.u8().map_err(too_short)? {
                        255 => usize::from(reader.u16().map_err(too_short)?),
                        short => usize::from(short),
                    }
                } else {
                    usize::from(field.length)
                };

                let mut value = reader.take(len).map_err(too_short)?.to_vec();
                if field.is_address() {
                    value.reverse();
                }
                values.push(value);
            }
            records.push(DataRecord { values });
        }

        Ok(records)
    }
}

const SET_ALIGNMENT: usize = 4;

fn is_alignment_padding(tail: &[u8]) -> bool {
    tail.len() < SET_ALIGNMENT && tail.iter().all(|&b| b == 0)
}

/// A data set whose records still need their template to be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSet {
    /// Template id (the set id of the data set)
    pub template_id: u16,
    /// Set body without the set header
    pub payload: Vec<u8>,
}

/// One decoded data record: one value per template field, in template order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRecord {
    pub values: Vec<Vec<u8>>,
}

/// A decoded IPFIX message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Address the datagram was received from
    pub exporter: Ipv4Addr,
    pub header: Header,
    pub templates: Vec<TemplateRecord>,
    pub data_sets: Vec<DataSet>,
}
