//! Common test utilities and shared imports

// Allow unused imports and dead code since this is a shared module
// used across multiple test files - not all items are used in every test file
#[allow(unused_imports)]
pub use bytes::Bytes;
#[allow(unused_imports)]
pub use hex;
#[allow(unused_imports)]
pub use kmsv4_lib::constants::{TAG_SIZE, V4_KEY};
#[allow(unused_imports)]
pub use kmsv4_lib::envelope::{Envelope, Shape, padding_len};
#[allow(unused_imports)]
pub use kmsv4_lib::error::{BoxError, KmsError};
#[allow(unused_imports)]
pub use kmsv4_lib::handler::{HandlerConfig, KmsV4Handler};
#[allow(unused_imports)]
pub use kmsv4_lib::hash::{Tag, generate_hash};
#[allow(unused_imports)]
pub use kmsv4_lib::policy::{EchoPolicy, Policy, StaticPolicy};

/// Decode hex string to bytes for testing
#[allow(dead_code)]
pub fn hex_to_bytes(hex_data: &str) -> Bytes {
    Bytes::from(hex::decode(hex_data).expect("Failed to decode hex"))
}

/// The 16-byte payload `01 02 .. 10`
#[allow(dead_code)]
pub fn sequential_payload() -> Bytes {
    Bytes::from((1u8..=16).collect::<Vec<u8>>())
}

/// V4 hash reference values: (message hex, tag hex)
#[allow(dead_code)]
pub const HASH_VECTORS: &[(&str, &str)] = &[
    ("", "d144963029e2bd12f9970c9f52b27f09"),
    ("0102030405060708090a0b0c0d0e0f10", "d02e1dfb48fdcf2c6e3f0da9ac4096f6"),
    (
        "0000000000000000000000000000000000000000000000000000000000000000",
        "1c3cb37a2a7283b1f2158220eb321c46",
    ),
    ("616263", "10f66610f4142804d2bcf7d8ab1826cf"),
    (
        "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f2021222324252627",
        "1e6e8b88f821a3496774d439675e904d",
    ),
];
