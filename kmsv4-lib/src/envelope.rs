//! # V4 envelope codec
//!
//! Both peers wrap their payload in the same record:
//!
//! ```text
//! request:  bodyLength1 (LE u32) | bodyLength2 (LE u32)                     | payload | tag (16) | padding
//! response: bodyLength1 (LE u32) | 0x00000200 (BE u32) | bodyLength2 (LE u32) | payload | tag (16) | padding
//! ```
//!
//! Both length fields hold `len(payload) + 16`. The zero padding is never
//! stored; its length (4..=7 bytes) follows from `bodyLength1` so that the
//! body plus padding is a multiple of 4.

use crate::constants::{MIN_PADDING_SIZE, REQUEST_PREFIX_SIZE, RESPONSE_MARKER, RESPONSE_PREFIX_SIZE, TAG_SIZE};
use crate::error::KmsError;
use crate::hash::{Tag, generate_hash, verify_hash};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

/// Which of the two record layouts an envelope uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Shape {
    #[strum(serialize = "request")]
    Request,
    #[strum(serialize = "response")]
    Response,
}

impl Shape {
    /// Number of bytes before the payload
    pub const fn prefix_size(self) -> usize {
        match self {
            Shape::Request => REQUEST_PREFIX_SIZE,
            Shape::Response => RESPONSE_PREFIX_SIZE,
        }
    }
}

/// Value written to both length fields for a payload of `payload_len` bytes
pub fn body_length(payload_len: usize) -> Result<u32, KmsError> {
    payload_len
        .checked_add(TAG_SIZE)
        .and_then(|len| u32::try_from(len).ok())
        .ok_or(KmsError::PayloadTooLarge(payload_len))
}

/// Number of zero bytes following the tag: always 4..=7, aligning the record to 4 bytes
pub const fn padding_len(body_length: u32) -> usize {
    MIN_PADDING_SIZE + ((4 - (body_length % 4) as usize) % 4)
}

/// Full on-wire size of a record whose length fields hold `body_length`
pub const fn record_len(shape: Shape, body_length: u32) -> usize {
    shape.prefix_size() + body_length as usize + padding_len(body_length)
}

/// A decoded or ready-to-encode V4 envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    shape: Shape,
    body_length: u32,
    payload: Bytes,
    tag: Tag,
}

impl Envelope {
    /// Wrap `payload` with an already computed tag
    pub fn new(shape: Shape, payload: Bytes, tag: Tag) -> Result<Self, KmsError> {
        let body_length = body_length(payload.len())?;
        Ok(Self {
            shape,
            body_length,
            payload,
            tag,
        })
    }

    /// Wrap `payload` and tag it with the V4 hash
    pub fn seal(shape: Shape, payload: Bytes) -> Result<Self, KmsError> {
        let tag = generate_hash(&payload);
        Self::new(shape, payload, tag)
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    /// Value of both length fields
    pub fn body_length(&self) -> u32 {
        self.body_length
    }

    pub fn padding_len(&self) -> usize {
        padding_len(self.body_length)
    }

    /// Size of the encoded record in bytes
    pub fn encoded_len(&self) -> usize {
        record_len(self.shape, self.body_length)
    }

    /// Check the tag against the payload
    pub fn verify(&self) -> Result<(), KmsError> {
        verify_hash(&self.payload, &self.tag)
    }

    /// Serialize to wire bytes
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u32_le(self.body_length);
        if self.shape == Shape::Response {
            buf.put_u32(RESPONSE_MARKER);
        }
        buf.put_u32_le(self.body_length);
        buf.put_slice(&self.payload);
        buf.put_slice(self.tag.as_bytes());
        buf.put_bytes(0, self.padding_len());
        buf.freeze()
    }

    /// Hex string of the full wire bytes
    pub fn to_hex(&self) -> String {
        hex::encode(self.encode())
    }

    /// Decode a buffer that holds exactly one record
    pub fn decode(bytes: &[u8], shape: Shape) -> Result<Self, KmsError> {
        let body_length = read_prefix(bytes, shape)?;
        let expected = record_len(shape, body_length);
        if bytes.len() != expected {
            return Err(KmsError::DeclaredLengthMismatch {
                expected,
                actual: bytes.len(),
            });
        }
        let mut buf = Bytes::copy_from_slice(bytes);
        Self::take_record(&mut buf, shape, body_length)
    }

    /// Decode one record from the front of `buf`, leaving any following bytes in place
    pub fn decode_from(buf: &mut Bytes, shape: Shape) -> Result<Self, KmsError> {
        let body_length = read_prefix(buf, shape)?;
        let expected = record_len(shape, body_length);
        if buf.remaining() < expected {
            return Err(KmsError::InsufficientData {
                expected,
                actual: buf.remaining(),
            });
        }
        Self::take_record(buf, shape, body_length)
    }

    /// Full record length announced by the prefix at the start of `prefix`.
    ///
    /// Returns `Ok(None)` while fewer than the prefix bytes are available.
    pub fn frame_len(prefix: &[u8], shape: Shape) -> Result<Option<usize>, KmsError> {
        if prefix.len() < shape.prefix_size() {
            return Ok(None);
        }
        let body_length = read_prefix(prefix, shape)?;
        Ok(Some(record_len(shape, body_length)))
    }

    /// Consume a record whose prefix has already been validated and whose bytes are all present
    fn take_record(buf: &mut Bytes, shape: Shape, body_length: u32) -> Result<Self, KmsError> {
        buf.advance(shape.prefix_size());
        let payload_len = body_length as usize - TAG_SIZE;
        let payload = buf.split_to(payload_len);
        let tag = Tag::from_slice(&buf.split_to(TAG_SIZE))?;
        // padding content is filler; only its length matters
        buf.advance(padding_len(body_length));
        Ok(Self {
            shape,
            body_length,
            payload,
            tag,
        })
    }
}

/// Validate the length prefix (and marker) and return the body length
fn read_prefix(mut bytes: &[u8], shape: Shape) -> Result<u32, KmsError> {
    if bytes.len() < shape.prefix_size() {
        return Err(KmsError::InsufficientData {
            expected: shape.prefix_size(),
            actual: bytes.len(),
        });
    }

    let first = bytes.get_u32_le();
    if shape == Shape::Response {
        let marker = bytes.get_u32();
        if marker != RESPONSE_MARKER {
            return Err(KmsError::InvalidMarker(marker));
        }
    }
    let second = bytes.get_u32_le();

    if first != second {
        return Err(KmsError::LengthMismatch { first, second });
    }
    if (first as usize) < TAG_SIZE {
        return Err(KmsError::BodyTooShort(first));
    }
    Ok(first)
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "V4 {} envelope", self.shape)?;
        writeln!(f, "  bodyLength1: {}", self.body_length)?;
        if self.shape == Shape::Response {
            writeln!(f, "  marker:      {:#010x}", RESPONSE_MARKER)?;
        }
        writeln!(f, "  bodyLength2: {}", self.body_length)?;
        writeln!(f, "  payload:     {} bytes {}", self.payload.len(), hex::encode(&self.payload))?;
        writeln!(f, "  hash:        {}", self.tag)?;
        write!(f, "  padding:     {} bytes", self.padding_len())
    }
}

impl From<Envelope> for Bytes {
    fn from(envelope: Envelope) -> Self {
        envelope.encode()
    }
}
