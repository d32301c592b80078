//! Authentication handshake
//!
//! Challenge/response over the shared-secret cipher. The server encrypts a
//! random token; the client proves knowledge of the secret by decrypting it
//! and sending it back encrypted under a fresh nonce. Authenticated
//! decryption failure is the sole rejection signal, so wrong keys and
//! malformed requests are indistinguishable to the peer and no secret
//! material ever crosses the wire.

use anyhow::Result;
use rand::RngCore;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

use crate::crypto::PayloadCipher;
use crate::error::ShareError;
use crate::protocol::message::Message;
use crate::protocol::wire::{expect_message, write_message};

/// Length of the random challenge token
pub const CHALLENGE_TOKEN_SIZE: usize = 16;

/// Bound on each handshake step
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Server side: challenge the peer and verify its response
///
/// On any failure a generic authentication error frame is sent (best
/// effort) and `AuthenticationFailed` is returned; the caller closes the
/// connection. A single attempt is allowed, bounded by `AUTH_TIMEOUT`.
pub async fn issue_challenge<S>(stream: &mut S, cipher: &PayloadCipher) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut token = [0u8; CHALLENGE_TOKEN_SIZE];
    rand::thread_rng().fill_bytes(&mut token);

    let (nonce, payload) = cipher.encrypt(&token)?;
    write_message(stream, &Message::Challenge { nonce, payload }).await?;
    debug!("Challenge issued");

    let verified = verify_response(stream, cipher, &token).await;
    match verified {
        Ok(()) => {
            write_message(stream, &Message::AuthOk).await?;
            debug!("Peer authenticated");
            Ok(())
        }
        Err(_) => {
            // Never reveal whether the key was wrong or the request malformed
            let err = ShareError::authentication_failed("authentication failed");
            let _ = write_message(stream, &Message::error_frame(&err)).await;
            warn!("Peer failed authentication");
            Err(err.into())
        }
    }
}

async fn verify_response<S>(stream: &mut S, cipher: &PayloadCipher, token: &[u8]) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let response = timeout(AUTH_TIMEOUT, expect_message(stream)).await??;
    let Message::ChallengeResponse { nonce, payload } = response else {
        return Err(ShareError::protocol_error("Expected challenge response").into());
    };

    let echoed = cipher.decrypt(&nonce, &payload)?;
    if echoed != token {
        return Err(ShareError::authentication_failed("challenge token mismatch").into());
    }
    Ok(())
}

/// Client side: answer the server's challenge
///
/// A wrong shared secret surfaces as `AuthenticationFailed` when the
/// challenge fails to decrypt, before anything is sent back.
pub async fn answer_challenge<S>(stream: &mut S, cipher: &PayloadCipher) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let challenge = timeout(AUTH_TIMEOUT, expect_message(stream)).await??;
    let Message::Challenge { nonce, payload } = challenge else {
        return Err(ShareError::protocol_error("Expected challenge").into());
    };

    // Decryption failure here means our secret differs from the node's
    let token = cipher.decrypt(&nonce, &payload)?;

    let (nonce, payload) = cipher.encrypt(&token)?;
    write_message(stream, &Message::ChallengeResponse { nonce, payload }).await?;

    let reply = timeout(AUTH_TIMEOUT, expect_message(stream)).await??;
    match reply {
        Message::AuthOk => {
            debug!("Authenticated with node");
            Ok(())
        }
        Message::Error { kind, message } => Err(ShareError::from_kind(&kind, message).into()),
        other => Err(ShareError::protocol_error_with_source(
            "Unexpected reply to challenge response",
            format!("{:?}", other.message_id()),
        )
        .into()),
    }
}
