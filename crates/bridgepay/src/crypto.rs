//! Primitive cipher operations for the credential vault.
//!
//! Stateless: every function takes the key, IV and tag it needs. The vault
//! decides where those come from and where they go.
//!
//! - **Cipher**: AES-256-GCM, tag kept detached from the ciphertext
//! - **IV**: 96 bits, fresh from the OS CSPRNG for every encryption
//! - **Ciphertext**: standard base64 text, the form stored in settings

use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce, Tag};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::constants::CIPHER_NAME;
use crate::error::{BridgeError, Result};

const AES_256_GCM_KEY_LEN: usize = 32;
const AES_256_GCM_IV_LEN: usize = 12;
const AES_256_GCM_TAG_LEN: usize = 16;

/// Key length in bytes required by `cipher`, `None` if the cipher is unknown.
pub fn cipher_key_len(cipher: &str) -> Option<usize> {
    match cipher {
        CIPHER_NAME => Some(AES_256_GCM_KEY_LEN),
        _ => None,
    }
}

/// IV length in bytes required by `cipher`, `None` if the cipher is unknown.
pub fn cipher_iv_len(cipher: &str) -> Option<usize> {
    match cipher {
        CIPHER_NAME => Some(AES_256_GCM_IV_LEN),
        _ => None,
    }
}

/// Symmetric key material. Zeroized on drop, never printed.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    bytes: Vec<u8>,
}

impl MasterKey {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    pub fn from_base64(encoded: &str) -> Result<Self> {
        BASE64
            .decode(encoded.trim())
            .map(Self::from_bytes)
            .map_err(|e| BridgeError::Decode(format!("master key is not base64: {e}")))
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

/// Output of one encryption: base64 ciphertext plus the detached tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: String,
    pub tag: Vec<u8>,
}

/// Fill a buffer of `len` bytes from the OS CSPRNG.
pub fn random_bytes(len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    getrandom::fill(&mut buf).map_err(|e| BridgeError::Crypto(format!("rng: {e}")))?;
    Ok(buf)
}

/// Fresh IV sized for `cipher`.
pub fn generate_iv(cipher: &str) -> Result<Vec<u8>> {
    let len = cipher_iv_len(cipher).ok_or_else(|| {
        BridgeError::Crypto(format!("unable to determine IV length for {cipher}"))
    })?;
    random_bytes(len)
}

/// Fresh key sized for `cipher`.
pub fn generate_key(cipher: &str) -> Result<MasterKey> {
    let len = cipher_key_len(cipher).ok_or_else(|| {
        BridgeError::Crypto(format!("unable to determine key length for {cipher}"))
    })?;
    random_bytes(len).map(MasterKey::from_bytes)
}

fn build_cipher(cipher: &str, key: &MasterKey) -> Result<Aes256Gcm> {
    if cipher != CIPHER_NAME {
        return Err(BridgeError::Crypto(format!("unsupported cipher: {cipher}")));
    }
    Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|_| BridgeError::Crypto("invalid key length".to_string()))
}

fn check_len(what: &str, actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(BridgeError::Crypto(format!(
            "{what} must be {expected} bytes, got {actual}"
        )));
    }
    Ok(())
}

/// Encrypt `plaintext` under `key` and `iv`.
pub fn encrypt(cipher: &str, key: &MasterKey, iv: &[u8], plaintext: &str) -> Result<Sealed> {
    let aead = build_cipher(cipher, key)?;
    check_len("IV", iv.len(), AES_256_GCM_IV_LEN)?;

    let mut buffer = plaintext.as_bytes().to_vec();
    let tag = aead
        .encrypt_in_place_detached(Nonce::from_slice(iv), b"", &mut buffer)
        .map_err(|_| BridgeError::Crypto("unable to encrypt data".to_string()))?;

    Ok(Sealed {
        ciphertext: BASE64.encode(&buffer),
        tag: tag.to_vec(),
    })
}

/// Decrypt a base64 `ciphertext` produced by [`encrypt`].
///
/// Wrong key, wrong IV, a tampered ciphertext or tag all fail the GCM check
/// and surface as [`BridgeError::Crypto`]; no partial plaintext is returned.
pub fn decrypt(
    cipher: &str,
    key: &MasterKey,
    iv: &[u8],
    tag: &[u8],
    ciphertext: &str,
) -> Result<String> {
    let aead = build_cipher(cipher, key)?;
    check_len("IV", iv.len(), AES_256_GCM_IV_LEN)?;
    check_len("tag", tag.len(), AES_256_GCM_TAG_LEN)?;

    let mut buffer = BASE64
        .decode(ciphertext.trim())
        .map_err(|_| BridgeError::Crypto("ciphertext is not base64".to_string()))?;

    aead.decrypt_in_place_detached(Nonce::from_slice(iv), b"", &mut buffer, Tag::from_slice(tag))
        .map_err(|_| BridgeError::Crypto("decryption failed".to_string()))?;

    String::from_utf8(buffer)
        .map_err(|_| BridgeError::Crypto("decrypted data is not valid UTF-8".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> MasterKey {
        MasterKey::from_bytes(vec![7u8; 32])
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let iv = generate_iv(CIPHER_NAME).unwrap();
        let sealed = encrypt(CIPHER_NAME, &key(), &iv, "sk-live-123").unwrap();
        assert_ne!(sealed.ciphertext, "sk-live-123");
        let plain = decrypt(CIPHER_NAME, &key(), &iv, &sealed.tag, &sealed.ciphertext).unwrap();
        assert_eq!(plain, "sk-live-123");
    }

    #[test]
    fn test_wrong_key_fails() {
        let iv = generate_iv(CIPHER_NAME).unwrap();
        let sealed = encrypt(CIPHER_NAME, &key(), &iv, "secret").unwrap();
        let other = MasterKey::from_bytes(vec![8u8; 32]);
        let err = decrypt(CIPHER_NAME, &other, &iv, &sealed.tag, &sealed.ciphertext).unwrap_err();
        assert!(matches!(err, BridgeError::Crypto(_)));
    }

    #[test]
    fn test_tampered_tag_fails() {
        let iv = generate_iv(CIPHER_NAME).unwrap();
        let mut sealed = encrypt(CIPHER_NAME, &key(), &iv, "secret").unwrap();
        sealed.tag[0] ^= 0x01;
        assert!(decrypt(CIPHER_NAME, &key(), &iv, &sealed.tag, &sealed.ciphertext).is_err());
    }

    #[test]
    fn test_fresh_iv_each_call() {
        let a = generate_iv(CIPHER_NAME).unwrap();
        let b = generate_iv(CIPHER_NAME).unwrap();
        assert_eq!(a.len(), 12);
        assert_ne!(a, b);
    }

    #[test]
    fn test_unknown_cipher_has_no_key_length() {
        assert_eq!(cipher_key_len("rot13"), None);
        assert!(matches!(
            generate_key("rot13"),
            Err(BridgeError::Crypto(_))
        ));
    }

    #[test]
    fn test_short_iv_is_rejected_not_panicking() {
        assert!(matches!(
            encrypt(CIPHER_NAME, &key(), &[0u8; 4], "x"),
            Err(BridgeError::Crypto(_))
        ));
    }

    #[test]
    fn test_master_key_debug_is_redacted() {
        let rendered = format!("{:?}", key());
        assert!(!rendered.contains('7'));
        assert!(rendered.contains("len"));
    }
}
