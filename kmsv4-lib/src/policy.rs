//! Seam between the envelope layer and the activation business logic.
//!
//! The handler never looks inside payloads: it hands the request payload to
//! a [`Policy`] and wraps whatever comes back.

use crate::error::BoxError;
use bytes::Bytes;
use std::future::{Future, ready};

/// Decides the response payload for a decoded request payload
pub trait Policy: Send + Sync {
    fn respond(&self, request: Bytes) -> impl Future<Output = Result<Bytes, BoxError>> + Send;
}

/// Plain functions and closures act as synchronous policies
impl<F> Policy for F
where
    F: Fn(Bytes) -> Result<Bytes, BoxError> + Send + Sync,
{
    fn respond(&self, request: Bytes) -> impl Future<Output = Result<Bytes, BoxError>> + Send {
        ready(self(request))
    }
}

/// Answers every request with the same payload
#[derive(Debug, Clone)]
pub struct StaticPolicy {
    response: Bytes,
}

impl StaticPolicy {
    pub fn new(response: impl Into<Bytes>) -> Self {
        Self {
            response: response.into(),
        }
    }
}

impl Policy for StaticPolicy {
    fn respond(&self, _request: Bytes) -> impl Future<Output = Result<Bytes, BoxError>> + Send {
        ready(Ok(self.response.clone()))
    }
}

/// Sends the request payload straight back; handy for exercising a peer's codec
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoPolicy;

impl Policy for EchoPolicy {
    fn respond(&self, request: Bytes) -> impl Future<Output = Result<Bytes, BoxError>> + Send {
        ready(Ok(request))
    }
}
