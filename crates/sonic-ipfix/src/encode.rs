//! IPFIX message builder.
//!
//! Produces wire-format messages from templates and records. Record values
//! are given in wire order (addresses in network byte order, scalars
//! big-endian) and written verbatim; variable-length fields get their length
//! prefix.
//!
//! ```
//! use sonic_ipfix::encode::MessageBuilder;
//! use sonic_ipfix::fields::{OCTET_DELTA_COUNT, SOURCE_IPV4_ADDRESS};
//! use sonic_ipfix::{FieldSpecifier, TemplateRecord};
//!
//! let template = TemplateRecord::new(
//!     256,
//!     vec![
//!         FieldSpecifier::iana(SOURCE_IPV4_ADDRESS, 4),
//!         FieldSpecifier::iana(OCTET_DELTA_COUNT, 4),
//!     ],
//! );
//! let datagram = MessageBuilder::new(1)
//!     .template_set(&[template.clone()])
//!     .data_set(&template, &[vec![vec![10, 0, 0, 1], 1500u32.to_be_bytes().to_vec()]])
//!     .build();
//!
//! let packet = sonic_ipfix::decode(&datagram, "192.0.2.1".parse().unwrap()).unwrap();
//! assert_eq!(packet.templates, vec![template]);
//! assert_eq!(packet.data_sets.len(), 1);
//! ```

use crate::packet::TemplateRecord;
use crate::{HEADER_LEN, IPFIX_VERSION, SET_HEADER_LEN, TEMPLATE_SET_ID};

const ENTERPRISE_BIT: u16 = 0x8000;

/// Builder for a single IPFIX message.
///
/// # Panics
///
/// Building panics if a set, the message or a variable-length value grows
/// past 65535 octets.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    domain_id: u32,
    export_time: u32,
    sequence_number: u32,
    sets: Vec<u8>,
}

impl MessageBuilder {
    /// Starts a message for the given observation domain.
    pub fn new(domain_id: u32) -> Self {
        Self {
            domain_id,
            export_time: 0,
            sequence_number: 0,
            sets: Vec::new(),
        }
    }

    pub fn export_time(mut self, export_time: u32) -> Self {
        self.export_time = export_time;
        self
    }

    pub fn sequence_number(mut self, sequence_number: u32) -> Self {
        self.sequence_number = sequence_number;
        self
    }

    /// Appends one template set carrying all `templates`.
    pub fn template_set(mut self, templates: &[TemplateRecord]) -> Self {
        let mut body = Vec::new();
        for template in templates {
            put_u16(&mut body, template.template_id);
            put_u16(&mut body, wire_len(template.fields.len(), "field count"));
            for field in &template.fields {
                match field.enterprise {
                    Some(pen) => {
                        put_u16(&mut body, field.id | ENTERPRISE_BIT);
                        put_u16(&mut body, field.length);
                        body.extend_from_slice(&pen.to_be_bytes());
                    }
                    None => {
                        put_u16(&mut body, field.id);
                        put_u16(&mut body, field.length);
                    }
                }
            }
        }
        self.push_set(TEMPLATE_SET_ID, &body);
        self
    }

    /// Appends one data set of `template` holding `records`.
    ///
    /// Each record is a list of field values in template order.
    pub fn data_set(mut self, template: &TemplateRecord, records: &[Vec<Vec<u8>>]) -> Self {
        let mut body = Vec::new();
        for record in records {
            for (field, value) in template.fields.iter().zip(record) {
                if field.is_variable_length() {
                    if value.len() < 255 {
                        body.push(value.len() as u8);
                    } else {
                        body.push(255);
                        put_u16(&mut body, wire_len(value.len(), "variable-length value"));
                    }
                }
                body.extend_from_slice(value);
            }
        }
        self.push_set(template.template_id, &body);
        self
    }

    /// Appends a set with an arbitrary id and body.
    pub fn raw_set(mut self, set_id: u16, body: &[u8]) -> Self {
        self.push_set(set_id, body);
        self
    }

    /// Serializes the message.
    pub fn build(self) -> Vec<u8> {
        let length = HEADER_LEN + self.sets.len();
        let mut buf = Vec::with_capacity(length);
        put_u16(&mut buf, IPFIX_VERSION);
        put_u16(&mut buf, wire_len(length, "message"));
        buf.extend_from_slice(&self.export_time.to_be_bytes());
        buf.extend_from_slice(&self.sequence_number.to_be_bytes());
        buf.extend_from_slice(&self.domain_id.to_be_bytes());
        buf.extend_from_slice(&self.sets);
        buf
    }

    fn push_set(&mut self, set_id: u16, body: &[u8]) {
        put_u16(&mut self.sets, set_id);
        put_u16(&mut self.sets, wire_len(SET_HEADER_LEN + body.len(), "set"));
        self.sets.extend_from_slice(body);
    }
}

/// Panics on lengths the 16-bit wire fields cannot carry.
fn wire_len(len: usize, what: &str) -> u16 {
    match u16::try_from(len) {
        Ok(len) => len,
        Err(_) => panic!("{} length {} does not fit an IPFIX length field", what, len),
    }
}

fn put_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::FieldSpecifier;
    use crate::VARIABLE_LENGTH;

    #[test]
    fn test_long_variable_value_uses_three_octet_prefix() {
        let template = TemplateRecord::new(300, vec![FieldSpecifier::iana(400, VARIABLE_LENGTH)]);
        let datagram = MessageBuilder::new(1)
            .data_set(&template, &[vec![vec![b'x'; 300]]])
            .build();

        // header, set header, then 255 followed by the 16-bit length
        assert_eq!(&datagram[HEADER_LEN + SET_HEADER_LEN..][..3], &[255, 0x01, 0x2c]);
        assert_eq!(datagram.len(), HEADER_LEN + SET_HEADER_LEN + 3 + 300);
    }

    #[test]
    #[should_panic(expected = "set length 65540 does not fit an IPFIX length field")]
    fn test_oversized_set_panics() {
        MessageBuilder::new(1).raw_set(256, &[0u8; 65536]);
    }

    #[test]
    #[should_panic(expected = "message length")]
    fn test_oversized_message_panics() {
        let body = vec![0u8; 40_000];
        MessageBuilder::new(1)
            .raw_set(256, &body)
            .raw_set(257, &body)
            .build();
    }
}
