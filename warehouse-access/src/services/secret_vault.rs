//! Encrypted storage for third-party provider credentials.
//!
//! Secrets are sealed with AES-256-GCM under a key derived once per process
//! from `ENCRYPTION_KEY`. The stored form is `iv_hex:ciphertext_hex:tag_hex`
//! with a fresh 16-byte IV per call, so the same plaintext never produces the
//! same envelope twice.
//!
//! The derivation salt is a fixed constant. Changing it (or the KDF
//! parameters) makes every stored envelope undecryptable.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce, Tag};
use argon2::Argon2;
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, Secret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use service_core::utils::{constant_time_eq, sha256_hex};
use std::fmt;

use super::error::VaultError;

/// AES-256-GCM with a 16-byte IV.
type Aes256Gcm16 = AesGcm<Aes256, U16>;

pub const ENCRYPTION_KEY_ENV: &str = "ENCRYPTION_KEY";
pub const MIN_KEY_MATERIAL_CHARS: usize = 32;
pub const IV_LEN: usize = 16;
pub const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;
// Envelopes carry no scheme marker: this salt plus argon2 defaults is the only
// scheme, and it cannot read ciphertexts sealed by the earlier scrypt-derived
// key. Re-encrypt those before switching readers over.
const KEY_DERIVATION_SALT: &[u8] = b"warehouse-secret-vault-salt";
const MASK_PLACEHOLDER: &str = "****";
const MASK_MAX_STARS: usize = 20;

/// 32-byte key derived from operator-supplied material.
pub struct DerivedKey(Secret<[u8; KEY_LEN]>);

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey([REDACTED])")
    }
}

/// Derive the vault key from `secret_material`.
///
/// Deliberately slow; call once per process.
pub fn derive_key(secret_material: Option<&str>) -> Result<DerivedKey, VaultError> {
    let material = secret_material
        .filter(|m| !m.is_empty())
        .ok_or_else(|| VaultError::KeyConfigError(format!("{} is not set", ENCRYPTION_KEY_ENV)))?;

    let length = material.chars().count();
    if length < MIN_KEY_MATERIAL_CHARS {
        return Err(VaultError::KeyConfigError(format!(
            "{} must be at least {} characters (got {})",
            ENCRYPTION_KEY_ENV, MIN_KEY_MATERIAL_CHARS, length
        )));
    }

    let mut key = [0u8; KEY_LEN];
    Argon2::default()
        .hash_password_into(material.as_bytes(), KEY_DERIVATION_SALT, &mut key)
        .map_err(|e| VaultError::KeyConfigError(format!("key derivation failed: {}", e)))?;

    Ok(DerivedKey(Secret::new(key)))
}

/// Stored envelope `iv_hex:ciphertext_hex:tag_hex`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct EncryptedSecret(String);

impl EncryptedSecret {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<String> for EncryptedSecret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for EncryptedSecret {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EncryptedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

struct Envelope {
    iv: [u8; IV_LEN],
    ciphertext: Vec<u8>,
    tag: [u8; TAG_LEN],
}

impl Envelope {
    fn parse(raw: &str) -> Result<Self, VaultError> {
        let mut parts = raw.split(':');
        let (Some(iv), Some(ciphertext), Some(tag), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(VaultError::MalformedEnvelope);
        };

        let iv: [u8; IV_LEN] = decode_fixed(iv)?;
        let tag: [u8; TAG_LEN] = decode_fixed(tag)?;
        let ciphertext = hex::decode(ciphertext).map_err(|_| VaultError::MalformedEnvelope)?;

        Ok(Self {
            iv,
            ciphertext,
            tag,
        })
    }

    fn encode(&self) -> EncryptedSecret {
        EncryptedSecret(format!(
            "{}:{}:{}",
            hex::encode(self.iv),
            hex::encode(&self.ciphertext),
            hex::encode(self.tag)
        ))
    }
}

fn decode_fixed<const N: usize>(segment: &str) -> Result<[u8; N], VaultError> {
    hex::decode(segment)
        .ok()
        .and_then(|bytes| <[u8; N]>::try_from(bytes.as_slice()).ok())
        .ok_or(VaultError::MalformedEnvelope)
}

/// Authenticated encryption of small secrets.
pub struct SecretVault {
    cipher: Aes256Gcm16,
}

impl fmt::Debug for SecretVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretVault")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl SecretVault {
    pub fn from_key(key: &DerivedKey) -> Result<Self, VaultError> {
        let cipher = Aes256Gcm16::new_from_slice(key.0.expose_secret())
            .map_err(|_| VaultError::KeyConfigError("derived key has wrong length".to_string()))?;
        Ok(Self { cipher })
    }

    /// Derive the key from raw material and build the vault.
    pub fn from_material(secret_material: Option<&str>) -> Result<Self, VaultError> {
        Self::from_key(&derive_key(secret_material)?)
    }

    pub fn from_secret(secret_material: Option<&SecretString>) -> Result<Self, VaultError> {
        Self::from_material(secret_material.map(|s| s.expose_secret().as_str()))
    }

    /// Seal `plaintext`. Empty input yields `None`.
    pub fn encrypt(&self, plaintext: &str) -> Result<Option<EncryptedSecret>, VaultError> {
        if plaintext.is_empty() {
            return Ok(None);
        }

        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let mut buffer = plaintext.as_bytes().to_vec();
        let tag = self
            .cipher
            .encrypt_in_place_detached(Nonce::<U16>::from_slice(&iv), b"", &mut buffer)
            .map_err(|_| VaultError::EncryptionFailed)?;

        let mut tag_bytes = [0u8; TAG_LEN];
        tag_bytes.copy_from_slice(tag.as_slice());

        Ok(Some(
            Envelope {
                iv,
                ciphertext: buffer,
                tag: tag_bytes,
            }
            .encode(),
        ))
    }

    /// Open an envelope. Empty input yields `None`.
    pub fn decrypt(&self, envelope: &str) -> Result<Option<String>, VaultError> {
        if envelope.is_empty() {
            return Ok(None);
        }

        let Envelope {
            iv,
            mut ciphertext,
            tag,
        } = Envelope::parse(envelope)?;

        self.cipher
            .decrypt_in_place_detached(
                Nonce::<U16>::from_slice(&iv),
                b"",
                &mut ciphertext,
                Tag::<U16>::from_slice(&tag),
            )
            .map_err(|_| VaultError::AuthenticationFailed)?;

        String::from_utf8(ciphertext)
            .map(Some)
            .map_err(|_| VaultError::AuthenticationFailed)
    }

    /// Serialize `value` to JSON and seal it.
    pub fn encrypt_object<T: Serialize + ?Sized>(
        &self,
        value: &T,
    ) -> Result<Option<EncryptedSecret>, VaultError> {
        let json = serde_json::to_string(value).map_err(|_| VaultError::Serialization)?;
        self.encrypt(&json)
    }

    /// Open an envelope produced by [`encrypt_object`](Self::encrypt_object).
    pub fn decrypt_object<T: DeserializeOwned>(
        &self,
        envelope: &str,
    ) -> Result<Option<T>, VaultError> {
        match self.decrypt(envelope)? {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|_| VaultError::Serialization),
            None => Ok(None),
        }
    }

    /// Display form of a secret: first 4 and last 4 characters around up to
    /// 20 stars. Absent or shorter-than-8 input masks to `****`.
    pub fn mask(secret: Option<&str>) -> String {
        let chars: Vec<char> = match secret {
            Some(s) => s.chars().collect(),
            None => return MASK_PLACEHOLDER.to_string(),
        };
        if chars.len() < 8 {
            return MASK_PLACEHOLDER.to_string();
        }

        let stars = (chars.len() - 8).min(MASK_MAX_STARS);
        let mut masked = String::with_capacity(8 + stars);
        masked.extend(&chars[..4]);
        masked.push_str(&"*".repeat(stars));
        masked.extend(&chars[chars.len() - 4..]);
        masked
    }

    /// SHA-256 hex digest for cache keys. Not for secrets.
    pub fn hash(text: &str) -> String {
        sha256_hex(text.as_bytes())
    }

    /// Timing-safe equality; `false` when either side is absent.
    pub fn secure_compare(a: Option<&str>, b: Option<&str>) -> bool {
        match (a, b) {
            (Some(a), Some(b)) => constant_time_eq(a.as_bytes(), b.as_bytes()),
            _ => false,
        }
    }
}
