//! The V4 hash
//!
//! A CMAC-like tag over the V4 cipher keyed with [`V4_KEY`]. It differs from
//! textbook CMAC in two ways, both required by the deployed peer:
//!
//! - the final block is never XORed with a derived subkey;
//! - the `0x80` padding block is always processed, even when the message
//!   length is an exact multiple of the block size.
//!
//! A message of `j` full blocks therefore costs exactly `j + 1` cipher calls.
//!
//! [`V4_KEY`]: crate::constants::V4_KEY

use crate::cipher::{V4_SCHEDULE, xor_into};
use crate::constants::{BLOCK_SIZE, HASH_PAD_BYTE, TAG_SIZE};
use crate::error::KmsError;
use std::fmt;

/// 16-byte authentication tag carried at the end of every envelope body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Tag([u8; TAG_SIZE]);

impl Tag {
    pub const fn new(bytes: [u8; TAG_SIZE]) -> Self {
        Self(bytes)
    }

    /// Build a tag from a slice, which must be exactly 16 bytes long
    pub fn from_slice(bytes: &[u8]) -> Result<Self, KmsError> {
        let bytes: [u8; TAG_SIZE] = bytes.try_into().map_err(|_| KmsError::ContractViolation {
            what: "tag",
            expected: TAG_SIZE,
            actual: bytes.len(),
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; TAG_SIZE] {
        &self.0
    }
}

impl From<[u8; TAG_SIZE]> for Tag {
    fn from(bytes: [u8; TAG_SIZE]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Tag {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Compute the V4 hash of `message`
pub fn generate_hash(message: &[u8]) -> Tag {
    Tag(hash_with(message, |block| V4_SCHEDULE.encrypt_block(block)))
}

/// Recompute the tag of `message` and compare it with `tag`
pub fn verify_hash(message: &[u8], tag: &Tag) -> Result<(), KmsError> {
    if generate_hash(message) == *tag {
        Ok(())
    } else {
        Err(KmsError::TagMismatch)
    }
}

/// Chaining and padding of the V4 hash over an arbitrary block transform
fn hash_with<F>(message: &[u8], mut encrypt: F) -> [u8; BLOCK_SIZE]
where
    F: FnMut(&[u8; BLOCK_SIZE]) -> [u8; BLOCK_SIZE],
{
    let mut hash_buffer = [0u8; BLOCK_SIZE];

    let mut blocks = message.chunks_exact(BLOCK_SIZE);
    for block in &mut blocks {
        for (h, m) in hash_buffer.iter_mut().zip(block) {
            *h ^= m;
        }
        hash_buffer = encrypt(&hash_buffer);
    }

    // Bit padding; runs even when the remainder is empty
    let remainder = blocks.remainder();
    let mut last_block = [0u8; BLOCK_SIZE];
    last_block[..remainder.len()].copy_from_slice(remainder);
    last_block[remainder.len()] = HASH_PAD_BYTE;

    xor_into(&mut hash_buffer, &last_block);
    encrypt(&hash_buffer)
}
