//! Block cipher underlying the V4 hash
//!
//! This is Rijndael with a 128-bit block and a 160-bit key. The key schedule
//! is the regular Rijndael expansion run with Nk = 5, which yields 12 round
//! keys (192 bytes), and encryption runs 11 rounds. Nothing else differs
//! from AES.
//!
//! The middle rounds are delegated to the `aes` crate's hazmat round function.
//! Only the key expansion and the final round (which skips MixColumns) are
//! implemented here.

use crate::constants::{BLOCK_SIZE, V4_KEY, V4_KEY_SIZE, V4_ROUND_KEYS};
use crate::error::KmsError;
use aes::Block;
use aes::hazmat::cipher_round;

/// A single 16-byte round key
pub type RoundKey = [u8; BLOCK_SIZE];

/// Expanded schedule of the fixed V4 key, evaluated at compile time
pub const V4_SCHEDULE: V4KeySchedule = KeySchedule::expand(&V4_KEY);

/// Key schedule for the V4 cipher (160-bit key, 11 rounds)
pub type V4KeySchedule = KeySchedule<V4_ROUND_KEYS>;

const SBOX: [u8; 256] = [
    0x63, 0x7c, 0x77, 0x7b, 0xf2, 0x6b, 0x6f, 0xc5, 0x30, 0x01, 0x67, 0x2b, 0xfe, 0xd7, 0xab, 0x76,
    0xca, 0x82, 0xc9, 0x7d, 0xfa, 0x59, 0x47, 0xf0, 0xad, 0xd4, 0xa2, 0xaf, 0x9c, 0xa4, 0x72, 0xc0,
    0xb7, 0xfd, 0x93, 0x26, 0x36, 0x3f, 0xf7, 0xcc, 0x34, 0xa5, 0xe5, 0xf1, 0x71, 0xd8, 0x31, 0x15,
    0x04, 0xc7, 0x23, 0xc3, 0x18, 0x96, 0x05, 0x9a, 0x07, 0x12, 0x80, 0xe2, 0xeb, 0x27, 0xb2, 0x75,
    0x09, 0x83, 0x2c, 0x1a, 0x1b, 0x6e, 0x5a, 0xa0, 0x52, 0x3b, 0xd6, 0xb3, 0x29, 0xe3, 0x2f, 0x84,
    0x53, 0xd1, 0x00, 0xed, 0x20, 0xfc, 0xb1, 0x5b, 0x6a, 0xcb, 0xbe, 0x39, 0x4a, 0x4c, 0x58, 0xcf,
    0xd0, 0xef, 0xaa, 0xfb, 0x43, 0x4d, 0x33, 0x85, 0x45, 0xf9, 0x02, 0x7f, 0x50, 0x3c, 0x9f, 0xa8,
    0x51, 0xa3, 0x40, 0x8f, 0x92, 0x9d, 0x38, 0xf5, 0xbc, 0xb6, 0xda, 0x21, 0x10, 0xff, 0xf3, 0xd2,
    0xcd, 0x0c, 0x13, 0xec, 0x5f, 0x97, 0x44, 0x17, 0xc4, 0xa7, 0x7e, 0x3d, 0x64, 0x5d, 0x19, 0x73,
    0x60, 0x81, 0x4f, 0xdc, 0x22, 0x2a, 0x90, 0x88, 0x46, 0xee, 0xb8, 0x14, 0xde, 0x5e, 0x0b, 0xdb,
    0xe0, 0x32, 0x3a, 0x0a, 0x49, 0x06, 0x24, 0x5c, 0xc2, 0xd3, 0xac, 0x62, 0x91, 0x95, 0xe4, 0x79,
    0xe7, 0xc8, 0x37, 0x6d, 0x8d, 0xd5, 0x4e, 0xa9, 0x6c, 0x56, 0xf4, 0xea, 0x65, 0x7a, 0xae, 0x08,
    0xba, 0x78, 0x25, 0x2e, 0x1c, 0xa6, 0xb4, 0xc6, 0xe8, 0xdd, 0x74, 0x1f, 0x4b, 0xbd, 0x8b, 0x8a,
    0x70, 0x3e, 0xb5, 0x66, 0x48, 0x03, 0xf6, 0x0e, 0x61, 0x35, 0x57, 0xb9, 0x86, 0xc1, 0x1d, 0x9e,
    0xe1, 0xf8, 0x98, 0x11, 0x69, 0xd9, 0x8e, 0x94, 0x9b, 0x1e, 0x87, 0xe9, 0xce, 0x55, 0x28, 0xdf,
    0x8c, 0xa1, 0x89, 0x0d, 0xbf, 0xe6, 0x42, 0x68, 0x41, 0x99, 0x2d, 0x0f, 0xb0, 0x54, 0xbb, 0x16,
];

/// Rijndael key schedule holding `N` round keys; the cipher runs `N - 1` rounds.
#[derive(Clone, PartialEq, Eq)]
pub struct KeySchedule<const N: usize> {
    round_keys: [RoundKey; N],
}

impl<const N: usize> KeySchedule<N> {
    /// Expand a 16..=32 byte key into `N` round keys.
    ///
    /// Panics (at compile time when used in a `const`) if the key length is
    /// not a multiple of 4 in the Rijndael range.
    pub const fn expand(key: &[u8]) -> Self {
        assert!(N >= 2, "schedule needs at least one round");
        assert!(
            key.len() % 4 == 0 && key.len() >= 16 && key.len() <= 32,
            "Rijndael keys are 16 to 32 bytes in steps of 4"
        );
        assert!(key.len() <= N * BLOCK_SIZE, "key longer than schedule");

        let nk = key.len() / 4;
        let total_words = N * 4;
        let mut round_keys = [[0u8; BLOCK_SIZE]; N];

        let mut pos = 0;
        while pos < key.len() {
            round_keys[pos / BLOCK_SIZE][pos % BLOCK_SIZE] = key[pos];
            pos += 1;
        }

        let mut rcon: u8 = 0x01;
        let mut word = nk;
        while word < total_words {
            let prev = (word - 1) * 4;
            let mut t = [
                schedule_byte(&round_keys, prev),
                schedule_byte(&round_keys, prev + 1),
                schedule_byte(&round_keys, prev + 2),
                schedule_byte(&round_keys, prev + 3),
            ];
            if word % nk == 0 {
                // RotWord + SubWord + Rcon
                t = [
                    SBOX[t[1] as usize] ^ rcon,
                    SBOX[t[2] as usize],
                    SBOX[t[3] as usize],
                    SBOX[t[0] as usize],
                ];
                rcon = xtime(rcon);
            } else if nk > 6 && word % nk == 4 {
                t = [
                    SBOX[t[0] as usize],
                    SBOX[t[1] as usize],
                    SBOX[t[2] as usize],
                    SBOX[t[3] as usize],
                ];
            }

            let mut m = 0;
            while m < 4 {
                let pos = word * 4 + m;
                round_keys[pos / BLOCK_SIZE][pos % BLOCK_SIZE] = schedule_byte(&round_keys, pos - nk * 4) ^ t[m];
                m += 1;
            }
            word += 1;
        }

        Self { round_keys }
    }

    /// Number of cipher rounds performed with this schedule
    pub const fn rounds(&self) -> usize {
        N - 1
    }

    /// Round key at `index` (0 is the initial whitening key)
    pub fn round_key(&self, index: usize) -> Option<&RoundKey> {
        self.round_keys.get(index)
    }

    /// Encrypt a single 16-byte block.
    pub fn encrypt_block(&self, block: &[u8; BLOCK_SIZE]) -> [u8; BLOCK_SIZE] {
        let last = N - 1;

        let mut whitened = *block;
        xor_into(&mut whitened, &self.round_keys[0]);

        let mut state = Block::clone_from_slice(&whitened);
        for round_key in &self.round_keys[1..last] {
            cipher_round(&mut state, &Block::clone_from_slice(round_key));
        }

        let mut output = [0u8; BLOCK_SIZE];
        output.copy_from_slice(state.as_slice());
        final_round(&output, &self.round_keys[last])
    }
}

/// Encrypt one block under an arbitrary 20-byte key.
pub fn encrypt(block: &[u8; BLOCK_SIZE], key: &[u8; V4_KEY_SIZE]) -> [u8; BLOCK_SIZE] {
    V4KeySchedule::expand(key).encrypt_block(block)
}

/// Slice variant of [`encrypt`] that reports wrong lengths instead of relying on the type system
pub fn encrypt_slice(block: &[u8], key: &[u8]) -> Result<[u8; BLOCK_SIZE], KmsError> {
    let block: &[u8; BLOCK_SIZE] = block.try_into().map_err(|_| KmsError::ContractViolation {
        what: "cipher block",
        expected: BLOCK_SIZE,
        actual: block.len(),
    })?;
    let key: &[u8; V4_KEY_SIZE] = key.try_into().map_err(|_| KmsError::ContractViolation {
        what: "cipher key",
        expected: V4_KEY_SIZE,
        actual: key.len(),
    })?;
    Ok(encrypt(block, key))
}

/// XOR `src` into `dst` byte-wise
pub(crate) fn xor_into(dst: &mut [u8; BLOCK_SIZE], src: &[u8; BLOCK_SIZE]) {
    for (d, s) in dst.iter_mut().zip(src.iter()) {
        *d ^= s;
    }
}

/// SubBytes + ShiftRows + AddRoundKey, without MixColumns
fn final_round(state: &[u8; BLOCK_SIZE], round_key: &RoundKey) -> [u8; BLOCK_SIZE] {
    let mut output = [0u8; BLOCK_SIZE];
    for (i, out) in output.iter_mut().enumerate() {
        // state is column-major: byte i sits in row i % 4, column i / 4
        let row = i % 4;
        let col = i / 4;
        let src = row + 4 * ((col + row) % 4);
        *out = SBOX[state[src] as usize] ^ round_key[i];
    }
    output
}

const fn schedule_byte<const N: usize>(round_keys: &[RoundKey; N], pos: usize) -> u8 {
    round_keys[pos / BLOCK_SIZE][pos % BLOCK_SIZE]
}

const fn xtime(b: u8) -> u8 {
    let shifted = b << 1;
    if b & 0x80 != 0 { shifted ^ 0x1b } else { shifted }
}
