//! Password-based envelope encryption using scrypt + AES-256-GCM
//!
//! Every encryption derives a fresh key from the password and a random salt:
//! - scrypt for key derivation from the password
//! - AES-256-GCM for authenticated encryption, no associated data
//!
//! The binary envelope is:
//! - salt: 16 bytes
//! - nonce: 12 bytes
//! - ciphertext: variable length, followed by the 16-byte GCM tag
//!
//! and is carried around as an [`EncryptedBlob`].
//!
//! The cipher holds no mutable state and can be shared between threads.

use crate::blob::EncryptedBlob;
use crate::error::{ErrorCategory, ErrorKind, KisError, Result};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use rand::rngs::OsRng;
use scrypt::{Params, scrypt};
use zeroize::Zeroizing;

/// Length of salt in bytes
pub const SALT_LEN: usize = 16;

/// Length of nonce in bytes
pub const NONCE_LEN: usize = 12;

/// Length of the GCM authentication tag in bytes
pub const TAG_LEN: usize = 16;

/// Length of derived key in bytes
pub const KEY_LEN: usize = 32;

/// Shortest decoded envelope that can be split into salt and nonce.
pub const HEADER_LEN: usize = SALT_LEN + NONCE_LEN;

/// scrypt work factor.
///
/// The parameters are not stored in the envelope, so a blob only decrypts
/// with a cipher configured the same way it was encrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// log2 of the CPU/memory cost N
    pub log_n: u8,
    /// block size
    pub r: u32,
    /// parallelization
    pub p: u32,
}

impl KdfParams {
    /// N = 2^15, r = 8, p = 1.
    pub const REFERENCE: KdfParams = KdfParams {
        log_n: 15,
        r: 8,
        p: 1,
    };

    fn scrypt_params(&self) -> Result<Params> {
        Params::new(self.log_n, self.r, self.p, KEY_LEN).map_err(|e| {
            KisError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::KeyDerivation,
                "invalid scrypt parameters",
                e,
            )
        })
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::REFERENCE
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EnvelopeCipher {
    params: KdfParams,
}

impl EnvelopeCipher {
    pub fn with_params(params: KdfParams) -> Self {
        Self { params }
    }

    /// Encrypt `plaintext` under a key derived from `password` and a fresh
    /// random salt, using a fresh random nonce.
    pub fn encrypt(&self, plaintext: &[u8], password: &str) -> Result<EncryptedBlob> {
        let mut salt = [0u8; SALT_LEN];
        fill_random(&mut salt, "salt")?;

        let mut nonce = [0u8; NONCE_LEN];
        fill_random(&mut nonce, "nonce")?;

        self.encrypt_deterministic(plaintext, password, &salt, &nonce)
    }

    /// Encrypt with a caller-provided salt and nonce.
    ///
    /// This function is ONLY for testing purposes to generate deterministic output.
    /// NEVER use this in production - always use `encrypt()` which generates random salt/nonce.
    pub fn encrypt_deterministic(
        &self,
        plaintext: &[u8],
        password: &str,
        salt: &[u8; SALT_LEN],
        nonce: &[u8; NONCE_LEN],
    ) -> Result<EncryptedBlob> {
        let key = self.derive_key(password.as_bytes(), salt)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_slice()));

        let sealed = cipher
            .encrypt(Nonce::from_slice(nonce), plaintext)
            .map_err(|_| {
                KisError::with_kind(
                    ErrorCategory::Internal,
                    ErrorKind::InternalInvariant,
                    "AES-256-GCM encryption failed",
                )
            })?;

        let mut output = Vec::with_capacity(HEADER_LEN + sealed.len());
        output.extend_from_slice(salt);
        output.extend_from_slice(nonce);
        output.extend_from_slice(&sealed);

        Ok(EncryptedBlob::encode(&output))
    }

    /// Decrypt a blob produced by [`EnvelopeCipher::encrypt`].
    ///
    /// A wrong password and a corrupted or tampered blob both yield
    /// `DecryptionFailed` with the same message.
    pub fn decrypt(&self, blob: &EncryptedBlob, password: &str) -> Result<Vec<u8>> {
        let data = blob.decode()?;

        if data.len() < HEADER_LEN {
            return Err(KisError::with_kind(
                ErrorCategory::User,
                ErrorKind::MalformedBlob,
                format!(
                    "encrypted blob is {} bytes, shorter than the {} byte salt and nonce header",
                    data.len(),
                    HEADER_LEN
                ),
            ));
        }

        let (salt, rest) = data.split_at(SALT_LEN);
        let (nonce, sealed) = rest.split_at(NONCE_LEN);
        let salt: &[u8; SALT_LEN] = salt.try_into().map_err(|_| {
            KisError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::InternalInvariant,
                "failed to read salt",
            )
        })?;

        let key = self.derive_key(password.as_bytes(), salt)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_slice()));
        cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| {
                KisError::with_kind(
                    ErrorCategory::User,
                    ErrorKind::DecryptionFailed,
                    "decryption failed: wrong password or corrupted data",
                )
            })
    }

    fn derive_key(
        &self,
        password: &[u8],
        salt: &[u8; SALT_LEN],
    ) -> Result<Zeroizing<[u8; KEY_LEN]>> {
        let params = self.params.scrypt_params()?;

        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        scrypt(password, salt, &params, key.as_mut()).map_err(|e| {
            KisError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::KeyDerivation,
                "scrypt key derivation failed",
                e,
            )
        })?;

        Ok(key)
    }
}

/// Encrypt with the reference work factor.
pub fn encrypt(plaintext: &[u8], password: &str) -> Result<EncryptedBlob> {
    EnvelopeCipher::default().encrypt(plaintext, password)
}

/// Decrypt with the reference work factor.
pub fn decrypt(blob: &EncryptedBlob, password: &str) -> Result<Vec<u8>> {
    EnvelopeCipher::default().decrypt(blob, password)
}

fn fill_random(buf: &mut [u8], what: &str) -> Result<()> {
    OsRng.try_fill_bytes(buf).map_err(|e| {
        KisError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::RandomSourceExhausted,
            format!("failed to generate random {}", what),
            e,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Low work factor so the tests don't spend their time in scrypt.
    const FAST: KdfParams = KdfParams {
        log_n: 4,
        r: 8,
        p: 1,
    };

    fn fast() -> EnvelopeCipher {
        EnvelopeCipher::with_params(FAST)
    }

    #[test]
    fn test_hello_correct_horse() {
        let blob = encrypt(b"hello", "correct-horse").unwrap();
        assert_eq!(decrypt(&blob, "correct-horse").unwrap(), b"hello");

        let err = decrypt(&blob, "wrong").expect_err("expected decryption failure");
        assert_eq!(err.kind, Some(ErrorKind::DecryptionFailed));
    }

    #[test]
    fn test_known_answer_reference_params() {
        // Independently computed with scrypt(N=2^15, r=8, p=1) and AES-256-GCM.
        let salt = [0x42u8; SALT_LEN];
        let nonce = [0x24u8; NONCE_LEN];

        let blob = EnvelopeCipher::default()
            .encrypt_deterministic(b"hello", "correct-horse", &salt, &nonce)
            .unwrap();

        assert_eq!(
            blob.as_str(),
            "QkJCQkJCQkJCQkJCQkJCQiQkJCQkJCQkJCQkJGG3S4YSEluAnJDHGyAUgHY/jyI9Pw=="
        );
        assert_eq!(decrypt(&blob, "correct-horse").unwrap(), b"hello");
    }

    #[test]
    fn test_known_answer_fast_params() {
        let salt: [u8; SALT_LEN] = core::array::from_fn(|i| i as u8);
        let nonce: [u8; NONCE_LEN] = core::array::from_fn(|i| i as u8);

        let blob = fast()
            .encrypt_deterministic(b"test payload", "test", &salt, &nonce)
            .unwrap();

        assert_eq!(
            blob.as_str(),
            "AAECAwQFBgcICQoLDA0ODwABAgMEBQYHCAkKC8TW3QFV4qo0m6YNRWoU0TOymrMQ6s73vN/Da90="
        );
    }

    #[test]
    fn test_empty_plaintext() {
        let cipher = fast();
        let blob = cipher.encrypt(b"", "test").unwrap();

        assert_eq!(blob.decode().unwrap().len(), HEADER_LEN + TAG_LEN);
        assert_eq!(cipher.decrypt(&blob, "test").unwrap(), b"");
    }

    #[test]
    fn test_envelope_layout() {
        let cipher = fast();
        let blob = cipher.encrypt(b"hello", "test").unwrap();
        assert_eq!(blob.decode().unwrap().len(), HEADER_LEN + 5 + TAG_LEN);
    }

    #[test]
    fn test_all_byte_values() {
        let cipher = fast();
        let plaintext: Vec<u8> = (0..=255).collect();

        let blob = cipher.encrypt(&plaintext, "test").unwrap();
        assert_eq!(cipher.decrypt(&blob, "test").unwrap(), plaintext);
    }

    #[test]
    fn test_large_plaintext() {
        let cipher = fast();
        let plaintext = vec![0x42u8; 128 * 1024];

        let blob = cipher.encrypt(&plaintext, "test").unwrap();
        assert_eq!(cipher.decrypt(&blob, "test").unwrap(), plaintext);
    }

    #[test]
    fn test_unicode_password() {
        let cipher = fast();
        let blob = cipher.encrypt(b"payload", "pässwörd 🔑").unwrap();
        assert_eq!(cipher.decrypt(&blob, "pässwörd 🔑").unwrap(), b"payload");
        assert!(cipher.decrypt(&blob, "passwort 🔑").is_err());
    }

    #[test]
    fn test_wrong_password() {
        let cipher = fast();
        let blob = cipher.encrypt(b"secret data", "correct").unwrap();

        let err = cipher
            .decrypt(&blob, "wrong")
            .expect_err("expected decryption failure");
        assert_eq!(err.kind, Some(ErrorKind::DecryptionFailed));
        assert_eq!(err.category, ErrorCategory::User);
    }

    #[test]
    fn test_same_input_never_same_blob() {
        let cipher = fast();
        let a = cipher.encrypt(b"hello", "pw").unwrap();
        let b = cipher.encrypt(b"hello", "pw").unwrap();
        assert_ne!(a, b);

        let a = a.decode().unwrap();
        let b = b.decode().unwrap();
        assert_ne!(a[..SALT_LEN], b[..SALT_LEN]);
        assert_ne!(a[SALT_LEN..HEADER_LEN], b[SALT_LEN..HEADER_LEN]);
    }

    #[test]
    fn test_every_flipped_byte_is_rejected() {
        let cipher = fast();
        let blob = cipher.encrypt(b"hello", "pw").unwrap();
        let envelope = blob.decode().unwrap();

        for i in 0..envelope.len() {
            for bit in [0x01u8, 0x80] {
                let mut tampered = envelope.clone();
                tampered[i] ^= bit;
                let err = cipher
                    .decrypt(&EncryptedBlob::encode(&tampered), "pw")
                    .expect_err("tampered envelope must not decrypt");
                assert_eq!(err.kind, Some(ErrorKind::DecryptionFailed), "byte {}", i);
            }
        }
    }

    #[test]
    fn test_every_flipped_character_is_rejected() {
        let cipher = fast();
        let blob = cipher.encrypt(b"hello", "pw").unwrap();
        let encoded = blob.as_str().as_bytes();

        for i in 0..encoded.len() {
            let mut tampered = encoded.to_vec();
            tampered[i] ^= 0x01;
            let Ok(tampered) = String::from_utf8(tampered) else {
                continue;
            };
            let err = cipher
                .decrypt(&EncryptedBlob::from(tampered), "pw")
                .expect_err("tampered blob must not decrypt");
            assert!(
                matches!(
                    err.kind,
                    Some(ErrorKind::MalformedBlob) | Some(ErrorKind::DecryptionFailed)
                ),
                "unexpected kind {:?} at {}",
                err.kind,
                i
            );
        }
    }

    #[test]
    fn test_truncated_tag() {
        let cipher = fast();
        let blob = cipher.encrypt(b"hello", "pw").unwrap();
        let mut envelope = blob.decode().unwrap();
        envelope.pop();

        let err = cipher
            .decrypt(&EncryptedBlob::encode(&envelope), "pw")
            .expect_err("expected decryption failure");
        assert_eq!(err.kind, Some(ErrorKind::DecryptionFailed));
    }

    #[test]
    fn test_short_blob_is_malformed() {
        let cipher = fast();
        let blob = EncryptedBlob::encode(&[0u8; HEADER_LEN - 1]);

        let err = cipher
            .decrypt(&blob, "pw")
            .expect_err("expected malformed blob");
        assert_eq!(err.kind, Some(ErrorKind::MalformedBlob));
    }

    #[test]
    fn test_header_only_is_decryption_failure() {
        // Long enough to split, too short to carry a tag.
        let cipher = fast();
        let blob = EncryptedBlob::encode(&[0u8; HEADER_LEN]);

        let err = cipher
            .decrypt(&blob, "pw")
            .expect_err("expected decryption failure");
        assert_eq!(err.kind, Some(ErrorKind::DecryptionFailed));
    }

    #[test]
    fn test_undecodable_blob_is_malformed() {
        let err = fast()
            .decrypt(&EncryptedBlob::from("%%%"), "pw")
            .expect_err("expected malformed blob");
        assert_eq!(err.kind, Some(ErrorKind::MalformedBlob));
    }

    #[test]
    fn test_params_mismatch_fails_closed() {
        let blob = fast().encrypt(b"hello", "pw").unwrap();
        let other = EnvelopeCipher::with_params(KdfParams { log_n: 5, ..FAST });

        let err = other.decrypt(&blob, "pw").expect_err("expected failure");
        assert_eq!(err.kind, Some(ErrorKind::DecryptionFailed));
    }

    #[test]
    fn test_invalid_params() {
        let cipher = EnvelopeCipher::with_params(KdfParams {
            log_n: 4,
            r: 0,
            p: 1,
        });

        let err = cipher.encrypt(b"x", "pw").expect_err("expected kdf error");
        assert_eq!(err.kind, Some(ErrorKind::KeyDerivation));
    }

    #[test]
    fn test_cipher_is_shareable_across_threads() {
        let cipher = fast();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                std::thread::spawn(move || {
                    let plaintext = format!("payload {}", i);
                    let blob = cipher.encrypt(plaintext.as_bytes(), "pw").unwrap();
                    assert_eq!(cipher.decrypt(&blob, "pw").unwrap(), plaintext.as_bytes());
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
