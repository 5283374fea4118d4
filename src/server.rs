//! TCP transport for the V4 handler.
//!
//! Every connection may carry several request envelopes back to back. The
//! length prefix tells us how many bytes make up each record, so requests are
//! read whole, answered in order, and the loop ends when the peer closes.
//! A prefix announcing more than `MAX_RECORD_SIZE` bytes drops the connection
//! before anything past the prefix is buffered.

use anyhow::{Context, Result, bail};
use bytes::BytesMut;
use kmsv4_lib::constants::MAX_RECORD_SIZE;
use kmsv4_lib::policy::Policy;
use kmsv4_lib::{Envelope, KmsError, KmsV4Handler, Shape};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

const READ_BUFFER_SIZE: usize = 4096;

/// Accept connections forever, one task per connection
pub async fn serve<P: Policy + 'static>(bind: SocketAddr, handler: Arc<KmsV4Handler<P>>) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!(%bind, "Listening for V4 requests");

    loop {
        let (stream, peer) = listener.accept().await.context("Failed to accept connection")?;
        debug!(%peer, "Connection accepted");
        let handler = Arc::clone(&handler);
        tokio::spawn(async move {
            match handle_connection(stream, &handler).await {
                Ok(served) => debug!(%peer, served, "Connection closed"),
                Err(e) => warn!(%peer, "Connection dropped: {:#}", e),
            }
        });
    }
}

/// Serve requests from one peer until it disconnects; returns the number answered
pub async fn handle_connection<S, P>(mut stream: S, handler: &KmsV4Handler<P>) -> Result<usize>
where
    S: AsyncRead + AsyncWrite + Unpin,
    P: Policy,
{
    let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
    let mut served = 0;

    loop {
        let frame = loop {
            if let Some(len) = Envelope::frame_len(&buf, Shape::Request)? {
                if len > MAX_RECORD_SIZE {
                    return Err(KmsError::RecordTooLarge {
                        declared: len,
                        limit: MAX_RECORD_SIZE,
                    }
                    .into());
                }
                if buf.len() >= len {
                    break buf.split_to(len).freeze();
                }
            }
            if stream.read_buf(&mut buf).await.context("Failed to read request")? == 0 {
                if buf.is_empty() {
                    return Ok(served);
                }
                bail!("peer closed mid-record with {} bytes buffered", buf.len());
            }
        };

        let response = handler.handle_request(&frame).await?;
        stream.write_all(&response).await.context("Failed to write response")?;
        served += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use kmsv4_lib::HandlerConfig;
    use kmsv4_lib::policy::EchoPolicy;
    use std::time::Duration;

    fn instant_handler() -> KmsV4Handler<EchoPolicy> {
        KmsV4Handler::with_config(
            EchoPolicy,
            HandlerConfig {
                response_delay: Duration::ZERO,
                ..HandlerConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn test_two_requests_on_one_connection() {
        let handler = instant_handler();
        let first = handler.build_request(Bytes::from_static(b"one")).unwrap();
        let second = handler.build_request(Bytes::from_static(b"second")).unwrap();

        let (mut client, server) = tokio::io::duplex(1024);
        let serving = tokio::spawn(async move { handle_connection(server, &instant_handler()).await });

        // split the first record across two writes
        client.write_all(&first[..5]).await.unwrap();
        client.write_all(&first[5..]).await.unwrap();
        client.write_all(&second).await.unwrap();

        let expected_first = handler.generate_response(Bytes::from_static(b"one")).unwrap().encode();
        let expected_second = handler.generate_response(Bytes::from_static(b"second")).unwrap().encode();
        let mut received = vec![0u8; expected_first.len() + expected_second.len()];
        client.read_exact(&mut received).await.unwrap();
        assert_eq!(&received[..expected_first.len()], expected_first.as_ref());
        assert_eq!(&received[expected_first.len()..], expected_second.as_ref());

        drop(client);
        assert_eq!(serving.await.unwrap().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_malformed_prefix_drops_connection() {
        let (mut client, server) = tokio::io::duplex(64);
        client.write_all(&[20, 0, 0, 0, 21, 0, 0, 0]).await.unwrap();
        let err = handle_connection(server, &instant_handler()).await.unwrap_err();
        assert!(err.to_string().contains("Length fields disagree"), "{:#}", err);
    }

    #[tokio::test]
    async fn test_oversized_record_dropped_after_prefix() {
        let huge = 0xFFFF_FFF0u32.to_le_bytes();
        let just_over = (MAX_RECORD_SIZE as u32).to_le_bytes();

        for length in [huge, just_over] {
            let (mut client, server) = tokio::io::duplex(64);
            client.write_all(&length).await.unwrap();
            client.write_all(&length).await.unwrap();

            // the client keeps the connection open; the server must give up on its own
            let err = handle_connection(server, &instant_handler()).await.unwrap_err();
            match err.downcast_ref::<KmsError>() {
                Some(KmsError::RecordTooLarge { declared, limit }) => {
                    assert!(declared > limit);
                    assert_eq!(*limit, MAX_RECORD_SIZE);
                }
                other => panic!("Expected RecordTooLarge, got {:?}", other),
            }
            assert!(err.downcast_ref::<KmsError>().is_some_and(KmsError::is_format_error));
        }
    }

    #[tokio::test]
    async fn test_policy_error_message_printed_once() {
        let policy = |_: Bytes| -> Result<Bytes, kmsv4_lib::error::BoxError> { Err("license not found".into()) };
        let handler = KmsV4Handler::with_config(
            policy,
            HandlerConfig {
                response_delay: Duration::ZERO,
                ..HandlerConfig::default()
            },
        );
        let request = handler.build_request(Bytes::from_static(b"abc")).unwrap();

        let (mut client, server) = tokio::io::duplex(256);
        client.write_all(&request).await.unwrap();
        let err = handle_connection(server, &handler).await.unwrap_err();
        let chain = format!("{:#}", err);
        assert_eq!(chain, "Policy error: license not found");
        assert_eq!(chain.matches("license not found").count(), 1);
    }
}
