//! Decryption of the media provider's info payload.
//!
//! The payload is base64 of a 16 byte IV followed by AES-128-CBC ciphertext of
//! a PKCS#7 padded JSON document.

use aes::cipher::{BlockDecryptMut, KeyIvInit, block_padding::NoPadding};
use base64::{Engine, prelude::BASE64_STANDARD};
use thiserror::Error;

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

pub const BLOCK_SIZE: usize = 16;

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("data too short")]
    TooShort,
    #[error("ciphertext length {0} is not a multiple of the block size")]
    InvalidLength(usize),
    #[error("invalid padding")]
    InvalidPadding,
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("secret key must be {expected} hex characters, got {found}")]
    InvalidKey { expected: usize, found: usize },
    #[error("invalid hex key: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// Parses a 32 character hex string into an AES-128 key.
pub fn parse_key(encoded: &str) -> Result<[u8; BLOCK_SIZE], CipherError> {
    let encoded = encoded.trim();
    if encoded.len() != BLOCK_SIZE * 2 {
        return Err(CipherError::InvalidKey {
            expected: BLOCK_SIZE * 2,
            found: encoded.len(),
        });
    }

    let mut key = [0u8; BLOCK_SIZE];
    hex::decode_to_slice(encoded, &mut key)?;
    Ok(key)
}

pub fn decrypt_payload(
    encoded: &str,
    key: &[u8; BLOCK_SIZE],
) -> Result<serde_json::Value, CipherError> {
    let data = BASE64_STANDARD.decode(encoded.trim())?;
    if data.len() < BLOCK_SIZE {
        return Err(CipherError::TooShort);
    }

    let (iv, content) = data.split_at(BLOCK_SIZE);
    if content.is_empty() || content.len() % BLOCK_SIZE != 0 {
        return Err(CipherError::InvalidLength(content.len()));
    }
    let iv: [u8; BLOCK_SIZE] = iv.try_into().map_err(|_| CipherError::TooShort)?;

    let mut buf = content.to_vec();
    let decryptor = Aes128CbcDec::new(key.into(), (&iv).into());
    let decrypted = decryptor
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|_| CipherError::InvalidLength(content.len()))?;

    let plaintext = strip_pkcs7(decrypted)?;
    Ok(serde_json::from_slice(plaintext)?)
}

/// Only the final byte is inspected, matching what the provider's own client accepts.
fn strip_pkcs7(decrypted: &[u8]) -> Result<&[u8], CipherError> {
    let padding = decrypted
        .last()
        .copied()
        .map(usize::from)
        .ok_or(CipherError::InvalidPadding)?;

    if padding == 0 || padding > decrypted.len() {
        return Err(CipherError::InvalidPadding);
    }

    Ok(&decrypted[..decrypted.len() - padding])
}
