// Protocol constants for KMS V4

/// Size of a cipher block and of the authentication tag (16 bytes)
pub const BLOCK_SIZE: usize = 16;

/// Size of the authentication tag appended to every payload (16 bytes)
pub const TAG_SIZE: usize = BLOCK_SIZE;

/// Size of the V4 cipher key (20 bytes, 160 bits)
pub const V4_KEY_SIZE: usize = 20;

/// Number of cipher rounds for a 160-bit key
pub const V4_ROUNDS: usize = 11;

/// Number of round keys in the expanded schedule (whitening key + one per round)
pub const V4_ROUND_KEYS: usize = V4_ROUNDS + 1;

/// Fixed key used by the V4 hash
pub const V4_KEY: [u8; V4_KEY_SIZE] = [
    0x05, 0x3D, 0x83, 0x07, 0xF9, 0xE5, 0xF0, 0x88, 0xEB, 0x5E, 0xA6, 0x68, 0x6C, 0xF0, 0x37, 0xC7, 0xE4, 0xEF, 0xD2,
    0xD6,
];

/// Bit-padding byte placed after the message remainder in the final hash block
pub const HASH_PAD_BYTE: u8 = 0x80;

/// Marker written between the two length fields of a response envelope (big-endian)
pub const RESPONSE_MARKER: u32 = 0x0000_0200;

/// Size of a single length field (u32)
pub const LENGTH_FIELD_SIZE: usize = 4;

/// Request prefix: bodyLength1 + bodyLength2
pub const REQUEST_PREFIX_SIZE: usize = 2 * LENGTH_FIELD_SIZE;

/// Response prefix: bodyLength1 + marker + bodyLength2
pub const RESPONSE_PREFIX_SIZE: usize = 3 * LENGTH_FIELD_SIZE;

/// Smallest padding ever appended after the tag
pub const MIN_PADDING_SIZE: usize = 4;

/// Largest request record the server will buffer from a peer (64 KiB)
pub const MAX_RECORD_SIZE: usize = 64 * 1024;

/// Delay applied before a response is handed back to the transport
pub const DEFAULT_RESPONSE_DELAY_MS: u64 = 1000;

/// Well-known TCP port of the activation service
pub const DEFAULT_PORT: u16 = 1688;
