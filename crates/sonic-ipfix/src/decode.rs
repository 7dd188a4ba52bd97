//! IPFIX message decoding.

use crate::error::{CodecError, Result};
use crate::packet::{DataSet, FieldSpecifier, Header, Packet, TemplateRecord};
use crate::{
    HEADER_LEN, IPFIX_VERSION, MIN_DATA_SET_ID, OPTIONS_TEMPLATE_SET_ID, SET_HEADER_LEN,
    TEMPLATE_SET_ID,
};
use byteorder::{BigEndian, ByteOrder};
use std::net::Ipv4Addr;

/// Enterprise bit of a field specifier's element id.
const ENTERPRISE_BIT: u16 = 0x8000;

/// Bounds-checked big-endian reader over a byte slice.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub(crate) fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    pub(crate) fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(CodecError::Truncated {
                needed: len,
                available: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16> {
        Ok(BigEndian::read_u16(self.take(2)?))
    }

    pub(crate) fn u32(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u32(self.take(4)?))
    }
}

/// Decodes one IPFIX message received from `exporter`.
///
/// Template sets are parsed into [`TemplateRecord`]s and data sets are kept
/// as raw payloads. Options template sets are checked for framing and then
/// dropped; reserved set ids are skipped.
/// Bytes past the header's message length are ignored.
///
/// # Errors
///
/// Any framing problem (short header, wrong version, inconsistent message or
/// set length, malformed template record) fails the whole message.
pub fn decode(datagram: &[u8], exporter: Ipv4Addr) -> Result<Packet> {
    if datagram.len() < HEADER_LEN {
        return Err(CodecError::Truncated {
            needed: HEADER_LEN,
            available: datagram.len(),
        });
    }

    let mut reader = Reader::new(datagram);
    let version = reader.u16()?;
    if version != IPFIX_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }

    let length = usize::from(reader.u16()?);
    if length < HEADER_LEN || length > datagram.len() {
        return Err(CodecError::InvalidLength {
            declared: length,
            available: datagram.len(),
        });
    }

    let header = Header {
        version,
        length: length as u16,
        export_time: reader.u32()?,
        sequence_number: reader.u32()?,
        domain_id: reader.u32()?,
    };

    let mut packet = Packet {
        exporter,
        header,
        templates: Vec::new(),
        data_sets: Vec::new(),
    };

    let mut sets = Reader::new(&datagram[HEADER_LEN..length]);
    while sets.remaining() >= SET_HEADER_LEN {
        let set_id = sets.u16()?;
        let set_len = usize::from(sets.u16()?);
        if set_len < SET_HEADER_LEN || set_len - SET_HEADER_LEN > sets.remaining() {
            return Err(CodecError::InvalidSet {
                set_id,
                length: set_len,
            });
        }
        let body = sets.take(set_len - SET_HEADER_LEN)?;

        match set_id {
            TEMPLATE_SET_ID => decode_template_set(body, &mut packet.templates)?,
            OPTIONS_TEMPLATE_SET_ID => skip_options_template_set(body)?,
            id if id >= MIN_DATA_SET_ID => packet.data_sets.push(DataSet {
                template_id: id,
                payload: body.to_vec(),
            }),
            _ => {}
        }
    }

    Ok(packet)
}

fn decode_template_set(body: &[u8], templates: &mut Vec<TemplateRecord>) -> Result<()> {
    let mut reader = Reader::new(body);

    while reader.remaining() >= 4 {
        let template_id = reader.u16()?;
        let field_count = reader.u16()?;

        // Zero-filled padding at the end of the set
        if template_id == 0 && field_count == 0 {
            break;
        }
        // Withdrawal, including the all-templates form with id 2; the cache
        // has no eviction so there is nothing to apply
        if field_count == 0 {
            continue;
        }
        if template_id < MIN_DATA_SET_ID {
            return Err(CodecError::InvalidTemplateId(template_id));
        }

        let fields = read_field_specifiers(&mut reader, field_count)?;
        templates.push(TemplateRecord {
            template_id,
            fields,
        });
    }

    Ok(())
}

/// Walks an options template set without keeping its records.
fn skip_options_template_set(body: &[u8]) -> Result<()> {
    let mut reader = Reader::new(body);

    while reader.remaining() >= 4 {
        let template_id = reader.u16()?;
        let field_count = reader.u16()?;

        if template_id == 0 && field_count == 0 {
            break;
        }
        // Withdrawals carry no scope count
        if field_count == 0 {
            continue;
        }
        if template_id < MIN_DATA_SET_ID {
            return Err(CodecError::InvalidTemplateId(template_id));
        }

        let scope_count = reader.u16()?;
        if scope_count == 0 || scope_count > field_count {
            return Err(CodecError::InvalidScopeCount {
                template_id,
                scope_count,
                field_count,
            });
        }
        read_field_specifiers(&mut reader, field_count)?;
    }

    Ok(())
}

fn read_field_specifiers(reader: &mut Reader<'_>, count: u16) -> Result<Vec<FieldSpecifier>> {
    let mut fields = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let raw_id = reader.u16()?;
        let length = reader.u16()?;
        let enterprise = if raw_id & ENTERPRISE_BIT != 0 {
            Some(reader.u32()?)
        } else {
            None
        };
        fields.push(FieldSpecifier {
            id: raw_id & !ENTERPRISE_BIT,
            length,
            enterprise,
        });
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const EXPORTER: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 1);

    fn header(length: u16) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_LEN];
        BigEndian::write_u16(&mut buf[0..2], IPFIX_VERSION);
        BigEndian::write_u16(&mut buf[2..4], length);
        BigEndian::write_u32(&mut buf[4..8], 1_700_000_000);
        BigEndian::write_u32(&mut buf[8..12], 7);
        BigEndian::write_u32(&mut buf[12..16], 42);
        buf
    }

    #[test]
    fn test_header_only_message() {
        let packet = decode(&header(16), EXPORTER).unwrap();
        assert_eq!(packet.exporter, EXPORTER);
        assert_eq!(packet.header.export_time, 1_700_000_000);
        assert_eq!(packet.header.sequence_number, 7);
        assert_eq!(packet.header.domain_id, 42);
        assert!(packet.templates.is_empty());
        assert!(packet.data_sets.is_empty());
    }

    #[test]
    fn test_short_datagram() {
        assert_eq!(
            decode(&[0u8; 10], EXPORTER),
            Err(CodecError::Truncated {
                needed: 16,
                available: 10
            })
        );
    }

    #[test]
    fn test_wrong_version() {
        let mut buf = header(16);
        BigEndian::write_u16(&mut buf[0..2], 9);
        assert_eq!(decode(&buf, EXPORTER), Err(CodecError::UnsupportedVersion(9)));
    }

    #[test]
    fn test_length_exceeds_datagram() {
        let buf = header(64);
        assert_eq!(
            decode(&buf, EXPORTER),
            Err(CodecError::InvalidLength {
                declared: 64,
                available: 16
            })
        );
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let mut buf = header(16);
        buf.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        assert!(decode(&buf, EXPORTER).is_ok());
    }

    #[test]
    fn test_set_length_overrun() {
        let mut buf = header(24);
        buf.extend_from_slice(&[0x01, 0x00, 0x00, 0x40, 0, 0, 0, 0]);
        assert_eq!(
            decode(&buf, EXPORTER),
            Err(CodecError::InvalidSet {
                set_id: 256,
                length: 64
            })
        );
    }

    #[test]
    fn test_reserved_template_id_rejected() {
        let mut buf = header(28);
        // template set, length 12: template id 5, one field (8, 4)
        buf.extend_from_slice(&[0, 2, 0, 12, 0, 5, 0, 1, 0, 8, 0, 4]);
        assert_eq!(decode(&buf, EXPORTER), Err(CodecError::InvalidTemplateId(5)));
    }

    #[test]
    fn test_enterprise_field() {
        let mut buf = header(36);
        // template set, length 20: template 256, 2 fields
        buf.extend_from_slice(&[0, 2, 0, 20, 1, 0, 0, 2]);
        // enterprise element 0x8001 len 4, PEN 9
        buf.extend_from_slice(&[0x80, 0x01, 0, 4, 0, 0, 0, 9]);
        // plain element 8 len 4
        buf.extend_from_slice(&[0, 8, 0, 4]);

        let packet = decode(&buf, EXPORTER).unwrap();
        assert_eq!(packet.templates.len(), 1);
        let fields = &packet.templates[0].fields;
        assert_eq!(
            fields[0],
            FieldSpecifier {
                id: 1,
                length: 4,
                enterprise: Some(9)
            }
        );
        assert_eq!(
            fields[1],
            FieldSpecifier {
                id: 8,
                length: 4,
                enterprise: None
            }
        );
    }

    #[test]
    fn test_withdrawal_and_padding_skipped() {
        let mut buf = header(32);
        // template set, length 16: withdrawal of 300 then 8 bytes of padding
        buf.extend_from_slice(&[0, 2, 0, 16, 0x01, 0x2c, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        let packet = decode(&buf, EXPORTER).unwrap();
        assert!(packet.templates.is_empty());
    }

    #[test]
    fn test_all_templates_withdrawal_ignored() {
        let mut buf = header(40);
        // template set, length 8: withdrawal of every template (id 2)
        buf.extend_from_slice(&[0, 2, 0, 8, 0, 2, 0, 0]);
        // data set 256 with four bytes that still belongs to the message
        buf.extend_from_slice(&[1, 0, 0, 8, 10, 0, 0, 1]);
        // options withdrawal of every options template (id 3)
        buf.extend_from_slice(&[0, 3, 0, 8, 0, 3, 0, 0]);

        let packet = decode(&buf, EXPORTER).unwrap();
        assert!(packet.templates.is_empty());
        assert_eq!(
            packet.data_sets,
            vec![DataSet {
                template_id: 256,
                payload: vec![10, 0, 0, 1],
            }]
        );
    }

    #[test]
    fn test_options_template_bad_scope_count() {
        let mut buf = header(30);
        // options template 257, one field, scope count 2
        buf.extend_from_slice(&[0, 3, 0, 14, 1, 1, 0, 1, 0, 2, 0, 10, 0, 4]);
        assert_eq!(
            decode(&buf, EXPORTER),
            Err(CodecError::InvalidScopeCount {
                template_id: 257,
                scope_count: 2,
                field_count: 1,
            })
        );
    }

    #[test]
    fn test_options_template_truncated_fields() {
        let mut buf = header(30);
        // options template 257 announces two fields but carries one
        buf.extend_from_slice(&[0, 3, 0, 14, 1, 1, 0, 2, 0, 1, 0, 10, 0, 4]);
        assert!(matches!(
            decode(&buf, EXPORTER),
            Err(CodecError::Truncated { .. })
        ));
    }

    #[test]
    fn test_options_template_set_ignored() {
        let mut buf = header(30);
        buf.extend_from_slice(&[0, 3, 0, 14, 1, 1, 0, 1, 0, 1, 0, 10, 0, 4]);
        let packet = decode(&buf, EXPORTER).unwrap();
        assert!(packet.templates.is_empty());
        assert!(packet.data_sets.is_empty());
    }
}
