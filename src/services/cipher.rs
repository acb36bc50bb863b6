// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Symmetric encryption for OAuth tokens at rest.
//!
//! Keys are derived once from the configured secret: PBKDF2-HMAC-SHA256
//! produces a master key, which HKDF splits into an AES-256 key and an
//! HMAC-SHA256 key. Tokens are AES-256-CBC with a random IV, then
//! authenticated (encrypt-then-MAC), encoded as
//! `hex(iv):hex(ciphertext):hex(tag)`.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::Sha256;
use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

const KDF_SALT: &[u8] = b"impute-portal/token-cipher/v1";
const PBKDF2_ITERATIONS: NonZeroU32 = match NonZeroU32::new(100_000) {
    Some(n) => n,
    None => unreachable!(),
};
const IV_LEN: usize = 16;
const KEY_LEN: usize = 32;
const TAG_LEN: usize = 32;
const DELIMITER: char = ':';

/// Token encryption errors.
///
/// Decryption failures carry no detail about which check failed.
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("Encryption secret must not be empty")]
    EmptySecret,

    #[error("Encryption failed")]
    Encryption,

    #[error("Decryption failed")]
    Decryption,
}

struct Keys {
    enc: [u8; KEY_LEN],
    mac: [u8; KEY_LEN],
}

/// Encrypts and decrypts token strings with keys derived at construction.
#[derive(Clone)]
pub struct TokenCipher {
    keys: Arc<Keys>,
    rng: SystemRandom,
}

impl fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCipher").finish_non_exhaustive()
    }
}

impl TokenCipher {
    /// Derive keys from a secret. PBKDF2 is slow; call once at startup.
    pub fn from_secret(secret: &str) -> Result<Self, CipherError> {
        if secret.is_empty() {
            return Err(CipherError::EmptySecret);
        }

        let mut master = [0u8; KEY_LEN];
        ring::pbkdf2::derive(
            ring::pbkdf2::PBKDF2_HMAC_SHA256,
            PBKDF2_ITERATIONS,
            KDF_SALT,
            secret.as_bytes(),
            &mut master,
        );

        let hk = Hkdf::<Sha256>::new(None, &master);
        let mut enc = [0u8; KEY_LEN];
        let mut mac = [0u8; KEY_LEN];
        hk.expand(b"aes-256-cbc", &mut enc)
            .map_err(|_| CipherError::Encryption)?;
        hk.expand(b"hmac-sha256", &mut mac)
            .map_err(|_| CipherError::Encryption)?;

        Ok(Self {
            keys: Arc::new(Keys { enc, mac }),
            rng: SystemRandom::new(),
        })
    }

    /// Encrypt a string. Every call uses a fresh IV, so equal inputs
    /// produce different tokens.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let mut iv = [0u8; IV_LEN];
        self.rng
            .fill(&mut iv)
            .map_err(|_| CipherError::Encryption)?;

        let ciphertext = Aes256CbcEnc::new_from_slices(&self.keys.enc, &iv)
            .map_err(|_| CipherError::Encryption)?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        let tag = self.tag(&iv, &ciphertext)?.finalize().into_bytes();

        Ok(format!(
            "{}{DELIMITER}{}{DELIMITER}{}",
            hex::encode(iv),
            hex::encode(&ciphertext),
            hex::encode(tag)
        ))
    }

    /// Decrypt a token produced by [`TokenCipher::encrypt`].
    pub fn decrypt(&self, token: &str) -> Result<String, CipherError> {
        let mut parts = token.split(DELIMITER);
        let (Some(iv_hex), Some(ct_hex), Some(tag_hex), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(CipherError::Decryption);
        };

        let iv = hex::decode(iv_hex).map_err(|_| CipherError::Decryption)?;
        let ciphertext = hex::decode(ct_hex).map_err(|_| CipherError::Decryption)?;
        let tag = hex::decode(tag_hex).map_err(|_| CipherError::Decryption)?;

        if iv.len() != IV_LEN || tag.len() != TAG_LEN || ciphertext.is_empty() {
            return Err(CipherError::Decryption);
        }

        // Constant-time comparison
        self.tag(&iv, &ciphertext)?
            .verify_slice(&tag)
            .map_err(|_| CipherError::Decryption)?;

        let plaintext = Aes256CbcDec::new_from_slices(&self.keys.enc, &iv)
            .map_err(|_| CipherError::Decryption)?
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| CipherError::Decryption)?;

        String::from_utf8(plaintext).map_err(|_| CipherError::Decryption)
    }

    fn tag(&self, iv: &[u8], ciphertext: &[u8]) -> Result<HmacSha256, CipherError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.keys.mac).map_err(|_| CipherError::Encryption)?;
        mac.update(iv);
        mac.update(ciphertext);
        Ok(mac)
    }
}

/// Helper to encrypt OAuth tokens before storing.
///
/// The refresh token is optional because Google omits it on repeat consent.
pub fn encrypt_tokens(
    cipher: &TokenCipher,
    access_token: &str,
    refresh_token: Option<&str>,
) -> Result<(String, Option<String>), CipherError> {
    let encrypted_access = cipher.encrypt(access_token)?;
    let encrypted_refresh = refresh_token.map(|t| cipher.encrypt(t)).transpose()?;
    Ok((encrypted_access, encrypted_refresh))
}

/// Helper to decrypt OAuth tokens after retrieval.
pub fn decrypt_tokens(
    cipher: &TokenCipher,
    encrypted_access: &str,
    encrypted_refresh: Option<&str>,
) -> Result<(String, Option<String>), CipherError> {
    let access_token = cipher.decrypt(encrypted_access)?;
    let refresh_token = encrypted_refresh
        .map(|t| cipher.decrypt(t))
        .transpose()?;
    Ok((access_token, refresh_token))
}
