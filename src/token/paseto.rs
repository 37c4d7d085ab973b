//! Local (symmetric) encrypted tokens
//!
//! Format: `sb1.local.<base64url(nonce || ciphertext)>`. The payload is JSON,
//! sealed with XChaCha20-Poly1305; the header is bound as associated data.
//! The layout follows PASETO `local` tokens, but the version tag is our own:
//! there is no BLAKE2b nonce derivation or PAE, so PASETO libraries reject these.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chacha20poly1305::aead::{Aead, KeyInit, Payload as AeadPayload};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use chrono::Duration;
use rand::RngCore;
use rand::rngs::OsRng;

use super::{Payload, TokenError, TokenMaker};

const HEADER: &str = "sb1.local.";
const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 24;
const TAG_SIZE: usize = 16;

pub struct PasetoMaker {
    cipher: XChaCha20Poly1305,
}

impl PasetoMaker {
    pub fn new(symmetric_key: &str) -> Result<Self, TokenError> {
        let key = symmetric_key.as_bytes();
        if key.len() != KEY_SIZE {
            return Err(TokenError::InvalidKeySize {
                expected: KEY_SIZE,
                actual: key.len(),
            });
        }
        let cipher =
            XChaCha20Poly1305::new_from_slice(key).map_err(|_| TokenError::InvalidKeySize {
                expected: KEY_SIZE,
                actual: key.len(),
            })?;
        Ok(Self { cipher })
    }
}

impl TokenMaker for PasetoMaker {
    fn create_token(
        &self,
        username: &str,
        duration: Duration,
    ) -> Result<(String, Payload), TokenError> {
        let payload = Payload::new(username, duration);
        let message = serde_json::to_vec(&payload).map_err(|e| TokenError::Create(e.to_string()))?;

        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(
                XNonce::from_slice(&nonce),
                AeadPayload {
                    msg: &message,
                    aad: HEADER.as_bytes(),
                },
            )
            .map_err(|e| TokenError::Create(e.to_string()))?;

        let mut body = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        body.extend_from_slice(&nonce);
        body.extend_from_slice(&ciphertext);

        Ok((format!("{HEADER}{}", URL_SAFE_NO_PAD.encode(body)), payload))
    }

    fn verify_token(&self, token: &str) -> Result<Payload, TokenError> {
        let encoded = token.strip_prefix(HEADER).ok_or(TokenError::Invalid)?;
        let body = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| TokenError::Invalid)?;
        if body.len() < NONCE_SIZE + TAG_SIZE {
            return Err(TokenError::Invalid);
        }

        let (nonce, ciphertext) = body.split_at(NONCE_SIZE);
        let message = self
            .cipher
            .decrypt(
                XNonce::from_slice(nonce),
                AeadPayload {
                    msg: ciphertext,
                    aad: HEADER.as_bytes(),
                },
            )
            .map_err(|_| TokenError::Invalid)?;

        let payload: Payload = serde_json::from_slice(&message).map_err(|_| TokenError::Invalid)?;
        payload.valid()?;
        Ok(payload)
    }
}
