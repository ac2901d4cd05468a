//! BER-TLV helpers on top of [iso7816_tlv].
//!
//! Every tag used by the protocol is a single byte, so lookups take the raw tag value.

use iso7816_tlv::ber::{Tag, Tlv, Value};

use crate::error::{Error, Result};

/// Parse a buffer holding a sequence of TLV objects.
pub fn parse_all(data: &[u8]) -> Result<Vec<Tlv>> {
    let mut tlvs = Vec::new();
    let mut remaining = data;
    while !remaining.is_empty() {
        let (tlv, rest) = Tlv::parse(remaining);
        tlvs.push(tlv?);
        remaining = rest;
    }
    Ok(tlvs)
}

pub fn encode(tlvs: &[Tlv]) -> Vec<u8> {
    tlvs.iter().flat_map(Tlv::to_vec).collect()
}

pub fn primitive(tag: u8, value: impl Into<Vec<u8>>) -> Result<Tlv> {
    Ok(Tlv::new(Tag::try_from(tag)?, Value::Primitive(value.into()))?)
}

pub fn constructed(tag: u8, children: Vec<Tlv>) -> Result<Tlv> {
    Ok(Tlv::new(Tag::try_from(tag)?, Value::Constructed(children))?)
}

fn has_tag(tlv: &Tlv, tag: u8) -> bool {
    Tag::try_from(tag).is_ok_and(|tag| tlv.tag() == &tag)
}

/// Tag lookups over a list of sibling TLV objects.
pub trait TlvLookup {
    /// The first object carrying `tag`, if any.
    fn optional(&self, tag: u8) -> Option<&Tlv>;

    /// The first object carrying `tag`, failing with [Error::MissingTag] when absent.
    fn require(&self, tag: u8) -> Result<&Tlv> {
        self.optional(tag).ok_or(Error::MissingTag(tag))
    }
}

impl TlvLookup for [Tlv] {
    fn optional(&self, tag: u8) -> Option<&Tlv> {
        self.iter().find(|tlv| has_tag(tlv, tag))
    }
}

impl TlvLookup for Vec<Tlv> {
    fn optional(&self, tag: u8) -> Option<&Tlv> {
        self.as_slice().optional(tag)
    }
}

impl TlvLookup for Tlv {
    fn optional(&self, tag: u8) -> Option<&Tlv> {
        match self.value() {
            Value::Constructed(children) => children.optional(tag),
            Value::Primitive(_) => None,
        }
    }
}

/// Typed access to the value of a single TLV object.
pub trait TlvValue {
    fn bytes(&self) -> Result<&[u8]>;

    fn first_byte(&self, field: &'static str) -> Result<u8> {
        self.bytes()?
            .first()
            .copied()
            .ok_or(Error::EmptyTlvValue(field))
    }

    fn fixed<const N: usize>(&self, field: &'static str) -> Result<[u8; N]> {
        let bytes = self.bytes()?;
        bytes.try_into().map_err(|_| Error::InvalidLength {
            field,
            expected: N,
            actual: bytes.len(),
        })
    }
}

impl TlvValue for Tlv {
    fn bytes(&self) -> Result<&[u8]> {
        match self.value() {
            Value::Primitive(bytes) => Ok(bytes.as_slice()),
            Value::Constructed(_) => Err(Error::UnexpectedTlvValue),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn nested_lookup() {
        let tlvs = parse_all(&hex!("6f0c8402aabba506800200008100")).unwrap();
        let fci = tlvs.require(0x6F).unwrap();
        assert_eq!(fci.require(0x84).unwrap().bytes().unwrap(), hex!("aabb"));
        let versions = fci.require(0xA5).unwrap();
        assert_eq!(versions.require(0x80).unwrap().fixed::<2>("type").unwrap(), [0, 0]);
        assert!(versions.require(0x81).unwrap().bytes().unwrap().is_empty());
        assert!(versions.optional(0x82).is_none());
        assert!(matches!(fci.require(0x99), Err(Error::MissingTag(0x99))));
        assert!(matches!(fci.bytes(), Err(Error::UnexpectedTlvValue)));
    }

    #[test]
    fn build_and_encode() {
        let tlvs = vec![
            primitive(0x41, vec![0x01]).unwrap(),
            constructed(0xA5, vec![primitive(0x80, vec![0x00, 0x00]).unwrap()]).unwrap(),
        ];
        assert_eq!(encode(&tlvs), hex!("410101a50480020000"));
        assert_eq!(encode(&parse_all(&encode(&tlvs)).unwrap()), encode(&tlvs));
    }

    #[test]
    fn wrong_length() {
        let tlvs = parse_all(&hex!("4c03010203")).unwrap();
        let err = tlvs.require(0x4C).unwrap().fixed::<16>("transaction identifier");
        assert!(matches!(
            err,
            Err(Error::InvalidLength {
                expected: 16,
                actual: 3,
                ..
            })
        ));
    }

    #[test]
    fn empty_single_byte_value() {
        let tlvs = parse_all(&hex!("41004201ef")).unwrap();
        assert!(matches!(
            tlvs.require(0x41).unwrap().first_byte("command parameters"),
            Err(Error::EmptyTlvValue("command parameters"))
        ));
        assert_eq!(tlvs.require(0x42).unwrap().first_byte("transaction code").unwrap(), 0xEF);
    }

    #[test]
    fn truncated() {
        assert!(parse_all(&hex!("4c0501")).is_err());
    }
}
