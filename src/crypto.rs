// src/crypto.rs

//! Encrypted property envelopes
//!
//! Properties flagged `encrypt` are persisted as AES-256-GCM envelopes: the
//! JSON-encoded plaintext value is sealed with a key derived from the
//! registry's encryption passphrase (SHA-256), and transported as
//! base64(nonce || ciphertext || tag). Decryption with the right passphrase
//! reproduces the original value exactly; without the passphrase the caller
//! gets an error and the reloaded property surfaces as null.

use crate::error::{Error, Result};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::Value;
use sha2::{Digest, Sha256};

const NONCE_LEN: usize = 12;

fn derive_key(passphrase: &str) -> Key<Aes256Gcm> {
    let mut hasher = Sha256::new();
    hasher.update(passphrase.as_bytes());
    let digest = hasher.finalize();
    *Key::<Aes256Gcm>::from_slice(&digest)
}

/// Seal a property value into a transport envelope
pub fn encrypt_value(value: &Value, passphrase: &str) -> Result<String> {
    let key = derive_key(passphrase);
    let cipher = Aes256Gcm::new(&key);

    let nonce_bytes: [u8; NONCE_LEN] = rand::random();
    let nonce = Nonce::from_slice(&nonce_bytes);

    let plaintext = serde_json::to_vec(value)?;
    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_slice())
        .map_err(|_| Error::Crypto("failed to encrypt property value".to_string()))?;

    let mut envelope = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    envelope.extend_from_slice(&nonce_bytes);
    envelope.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(envelope))
}

/// Open a transport envelope back into the original property value
pub fn decrypt_value(envelope: &str, passphrase: &str) -> Result<Value> {
    let raw = BASE64
        .decode(envelope)
        .map_err(|e| Error::Crypto(format!("malformed encrypted envelope: {}", e)))?;
    if raw.len() <= NONCE_LEN {
        return Err(Error::Crypto(
            "malformed encrypted envelope: too short".to_string(),
        ));
    }
    let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);

    let key = derive_key(passphrase);
    let cipher = Aes256Gcm::new(&key);
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| Error::Crypto("failed to decrypt property value".to_string()))?;

    Ok(serde_json::from_slice(&plaintext)?)
}
