pub mod cipher;
pub mod constants;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod hash;
pub mod policy;

// Re-export the handler and the pieces most callers need
pub use envelope::{Envelope, Shape};
pub use error::KmsError;
pub use handler::{HandlerConfig, KmsV4Handler};
pub use hash::{Tag, generate_hash};
