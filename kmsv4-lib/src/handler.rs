use crate::constants::DEFAULT_RESPONSE_DELAY_MS;
use crate::envelope::{Envelope, Shape};
use crate::error::KmsError;
use crate::policy::Policy;
use bytes::Bytes;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Runtime knobs for [`KmsV4Handler`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerConfig {
    /// Pause before a response is returned; older clients reject faster replies
    pub response_delay: Duration,
    /// Log every envelope with its field dump and wire hex
    pub debug: bool,
    /// Reject envelopes whose tag does not match their payload
    pub verify_tags: bool,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            response_delay: Duration::from_millis(DEFAULT_RESPONSE_DELAY_MS),
            debug: false,
            verify_tags: false,
        }
    }
}

/// Request/response cycle of the V4 protocol
pub struct KmsV4Handler<P> {
    policy: P,
    config: HandlerConfig,
}

impl<P> KmsV4Handler<P> {
    pub fn new(policy: P) -> Self {
        Self::with_config(policy, HandlerConfig::default())
    }

    pub fn with_config(policy: P, config: HandlerConfig) -> Self {
        Self { policy, config }
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Hash `payload` and wrap it in a response envelope
    pub fn generate_response(&self, payload: Bytes) -> Result<Envelope, KmsError> {
        let response = Envelope::seal(Shape::Response, payload)?;
        self.dump("KMS V4 Response", &response);
        Ok(response)
    }

    /// Client side: hash `payload` and encode it as a request envelope
    pub fn build_request(&self, payload: Bytes) -> Result<Bytes, KmsError> {
        let request = Envelope::seal(Shape::Request, payload)?;
        self.dump("Request V4", &request);
        Ok(request.encode())
    }

    /// Client side: decode a response envelope and return its payload
    pub fn parse_response(&self, raw: &[u8]) -> Result<Bytes, KmsError> {
        let response = Envelope::decode(raw, Shape::Response)?;
        self.dump("KMS V4 Response", &response);
        if self.config.verify_tags {
            response.verify()?;
        }
        Ok(response.into_payload())
    }

    fn dump(&self, label: &str, envelope: &Envelope) {
        if self.config.debug {
            info!("{}:\n{}", label, envelope);
            info!("{} Bytes: {}", label, envelope.to_hex());
        }
    }
}

impl<P: Policy> KmsV4Handler<P> {
    /// Decode a request, ask the policy for a response and encode it.
    ///
    /// Always waits `response_delay` before returning a successful response.
    pub async fn handle_request(&self, raw: &[u8]) -> Result<Bytes, KmsError> {
        let request = Envelope::decode(raw, Shape::Request).inspect_err(|e| warn!("Malformed V4 request: {}", e))?;
        self.dump("KMS V4 Request", &request);
        if self.config.verify_tags {
            request.verify().inspect_err(|_| warn!("V4 request tag mismatch"))?;
        }
        debug!(payload_len = request.payload().len(), "Decoded V4 request");

        let response_payload = self
            .policy
            .respond(request.into_payload())
            .await
            .map_err(KmsError::Policy)?;

        let response = self.generate_response(response_payload)?.encode();
        debug!(
            response_len = response.len(),
            delay = ?self.config.response_delay,
            "Encoded V4 response"
        );

        tokio::time::sleep(self.config.response_delay).await;
        Ok(response)
    }
}
