//! Byte-level codecs shared by messages and persisted data
//!
//! Transport payloads are a 4-byte big-endian length followed by the body.
//! Persisted objects (shares, PVE bundles) are lists of byte strings, each
//! framed the same way.

use crate::params::MAX_MESSAGE_BYTES;
use crate::{Error, Result};

/// Prefix `payload` with its 32-bit big-endian length
pub fn frame(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_MESSAGE_BYTES {
        return Err(Error::invalid_argument(
            "wire",
            format!("message of {} bytes exceeds limit", payload.len()),
        ));
    }
    let mut out = Vec::with_capacity(4 + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Strip the length prefix, checking it against the actual payload
pub fn unframe(bytes: &[u8]) -> Result<&[u8]> {
    let mut reader = Reader::new(bytes);
    let body = reader.take_framed()?;
    reader.finish()?;
    Ok(body)
}

/// Concatenate length-prefixed parts
pub fn encode_parts<B: AsRef<[u8]>>(parts: &[B]) -> Vec<u8> {
    let total = parts.iter().map(|p| 4 + p.as_ref().len()).sum();
    let mut out = Vec::with_capacity(total);
    for part in parts {
        let part = part.as_ref();
        out.extend_from_slice(&(part.len() as u32).to_be_bytes());
        out.extend_from_slice(part);
    }
    out
}

/// Split a concatenation produced by [`encode_parts`]
pub fn decode_parts(bytes: &[u8]) -> Result<Vec<Vec<u8>>> {
    let mut reader = Reader::new(bytes);
    let mut parts = Vec::new();
    while !reader.is_empty() {
        parts.push(reader.take_framed()?.to_vec());
    }
    Ok(parts)
}

/// Cursor over untrusted bytes
pub struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos == self.bytes.len()
    }

    pub fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| Error::protocol("wire", "truncated input"))?;
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    pub fn take_u32(&mut self) -> Result<u32> {
        let raw = self.take(4)?;
        Ok(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    pub fn take_framed(&mut self) -> Result<&'a [u8]> {
        let len = self.take_u32()? as usize;
        if len > MAX_MESSAGE_BYTES {
            return Err(Error::protocol("wire", "length prefix exceeds limit"));
        }
        self.take(len)
    }

    /// Fail if any bytes remain
    pub fn finish(self) -> Result<()> {
        if !self.is_empty() {
            return Err(Error::protocol("wire", "trailing bytes"));
        }
        Ok(())
    }
}

/// Serde adapter writing `Vec<u8>` fields as hex strings
pub mod serde_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for `Vec<Vec<u8>>` as a list of hex strings
pub mod serde_hex_vec {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(items: &[Vec<u8>], s: S) -> Result<S::Ok, S::Error> {
        items
            .iter()
            .map(hex::encode)
            .collect::<Vec<_>>()
            .serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Vec<u8>>, D::Error> {
        Vec::<String>::deserialize(d)?
            .into_iter()
            .map(|s| hex::decode(s).map_err(serde::de::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_and_unframe() {
        let framed = frame(b"abc").unwrap();
        assert_eq!(framed, vec![0, 0, 0, 3, b'a', b'b', b'c']);
        assert_eq!(unframe(&framed).unwrap(), b"abc");

        // length mismatch in either direction
        assert!(unframe(&framed[..5]).is_err());
        let mut longer = framed.clone();
        longer.push(0);
        assert!(unframe(&longer).is_err());
    }

    #[test]
    fn test_rejects_oversized() {
        let big = vec![0u8; MAX_MESSAGE_BYTES + 1];
        assert!(frame(&big).is_err());

        let mut header = ((MAX_MESSAGE_BYTES + 1) as u32).to_be_bytes().to_vec();
        header.extend_from_slice(&[0u8; 8]);
        assert!(unframe(&header).is_err());
    }

    #[test]
    fn test_parts() {
        let parts = vec![vec![1u8, 2], vec![], vec![3u8]];
        let encoded = encode_parts(&parts);
        assert_eq!(decode_parts(&encoded).unwrap(), parts);
        assert!(decode_parts(&encoded[..encoded.len() - 1]).is_err());
    }
}
