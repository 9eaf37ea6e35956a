//! Credential vault: encrypt-at-rest for provider secrets.
//!
//! Every secret is encrypted under the deployment's master key. The cipher
//! parameters needed to reverse it (cipher name, IV, tag and key) are packed
//! into a record stored next to the owner of the secret: the config store
//! for [`SecretScope::Global`], the order metadata for
//! [`SecretScope::Transaction`]. The ciphertext itself goes back to the
//! caller, who stores it wherever the plaintext would have lived.
//!
//! The packed record carries the raw master key. Anyone who can read the
//! record can decrypt the secret without the `bridge_key` option.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::constants::{CIPHER_NAME, MASTER_KEY_OPTION, VAULT_KEY_PREFIX};
use crate::crypto::{self, MasterKey};
use crate::error::{BridgeError, Result};
use crate::store::{ConfigStore, OrderStore};

/// Where a vault record lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecretScope {
    Global,
    Transaction(u64),
}

/// Decoded form of a packed vault record.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedSecret {
    pub cipher: String,
    pub iv: Vec<u8>,
    pub tag: Vec<u8>,
    pub key: MasterKey,
}

impl std::fmt::Debug for EncryptedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedSecret")
            .field("cipher", &self.cipher)
            .field("iv_len", &self.iv.len())
            .field("tag_len", &self.tag.len())
            .finish_non_exhaustive()
    }
}

impl EncryptedSecret {
    /// `base64(cipher ":" base64(iv) ":" base64(tag) ":" base64(key))`
    pub fn pack(&self) -> String {
        let inner = format!(
            "{}:{}:{}:{}",
            self.cipher,
            BASE64.encode(&self.iv),
            BASE64.encode(&self.tag),
            self.key.to_base64()
        );
        BASE64.encode(inner)
    }

    pub fn unpack(packed: &str) -> Result<Self> {
        let outer = BASE64
            .decode(packed.trim())
            .map_err(|_| BridgeError::Decode("vault record is not base64".to_string()))?;
        let inner = String::from_utf8(outer)
            .map_err(|_| BridgeError::Decode("vault record is not UTF-8".to_string()))?;

        let parts: Vec<&str> = inner.split(':').collect();
        let [cipher, iv, tag, key] = parts.as_slice() else {
            return Err(BridgeError::Decode(format!(
                "vault record has {} fields, expected 4",
                parts.len()
            )));
        };
        if cipher.is_empty() {
            return Err(BridgeError::Decode("vault record has no cipher".to_string()));
        }

        let field = |name: &str, value: &str| {
            BASE64
                .decode(value)
                .map_err(|_| BridgeError::Decode(format!("vault record {name} is not base64")))
        };

        Ok(Self {
            cipher: cipher.to_string(),
            iv: field("iv", *iv)?,
            tag: field("tag", *tag)?,
            key: MasterKey::from_bytes(field("key", *key)?),
        })
    }
}

/// Prefix `name` with the vault namespace unless it already carries it.
pub fn storage_key(name: &str) -> String {
    if name.starts_with(VAULT_KEY_PREFIX) {
        name.to_string()
    } else {
        format!("{VAULT_KEY_PREFIX}{name}")
    }
}

/// Encrypts and decrypts secrets against the config and order stores.
///
/// Holds no state of its own besides the store handles, so one instance can
/// be shared by every request.
#[derive(Clone)]
pub struct CredentialVault {
    config: Arc<dyn ConfigStore>,
    orders: Arc<dyn OrderStore>,
}

impl CredentialVault {
    pub fn new(config: Arc<dyn ConfigStore>, orders: Arc<dyn OrderStore>) -> Self {
        Self { config, orders }
    }

    /// Generate a fresh master key and persist it with a single write.
    ///
    /// Replaces any existing key. Records encrypted under the previous key
    /// remain decryptable, since each carries its own key copy.
    pub fn initialize_master_key(&self) -> Result<()> {
        let key = crypto::generate_key(CIPHER_NAME)?;
        self.config.set(MASTER_KEY_OPTION, &key.to_base64())?;
        tracing::info!("generated vault master key");
        Ok(())
    }

    /// Initialize the master key only if none is stored yet.
    pub fn ensure_master_key(&self) -> Result<()> {
        match self.config.get(MASTER_KEY_OPTION)? {
            Some(existing) if !existing.trim().is_empty() => Ok(()),
            _ => self.initialize_master_key(),
        }
    }

    /// The deployment master key.
    pub fn master_key(&self) -> Result<MasterKey> {
        let encoded = self
            .config
            .get(MASTER_KEY_OPTION)?
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| BridgeError::Config("vault master key is not initialized".to_string()))?;
        MasterKey::from_base64(&encoded)
    }

    /// Whether a record exists for `name` in `scope`.
    pub fn exists(&self, name: &str, scope: SecretScope) -> Result<bool> {
        Ok(self.read_record(&storage_key(name), scope)?.is_some())
    }

    /// Encrypt `plaintext`, persist its record under `name` and return the
    /// base64 ciphertext.
    pub fn encrypt(
        &self,
        plaintext: &str,
        name: &str,
        overwrite: bool,
        scope: SecretScope,
    ) -> Result<String> {
        let key_name = storage_key(name);

        if let SecretScope::Transaction(order_id) = scope {
            if !self.orders.exists(order_id)? {
                return Err(BridgeError::NotFound(format!(
                    "order {order_id} does not exist"
                )));
            }
        }

        if !overwrite && self.read_record(&key_name, scope)?.is_some() {
            return Err(BridgeError::AlreadyExists(key_name));
        }

        let key = self.master_key()?;
        let iv = crypto::generate_iv(CIPHER_NAME)?;
        let sealed = crypto::encrypt(CIPHER_NAME, &key, &iv, plaintext)?;

        let record = EncryptedSecret {
            cipher: CIPHER_NAME.to_string(),
            iv,
            tag: sealed.tag,
            key,
        };
        self.write_record(&key_name, scope, &record.pack())?;

        tracing::debug!(key = %key_name, ?scope, "stored vault record");
        Ok(sealed.ciphertext)
    }

    /// Decrypt `ciphertext` using the record stored under `name`.
    ///
    /// Reads only; repeated calls return the same plaintext.
    pub fn decrypt(&self, ciphertext: &str, name: &str, scope: SecretScope) -> Result<String> {
        let key_name = storage_key(name);
        let packed = self
            .read_record(&key_name, scope)?
            .ok_or_else(|| BridgeError::NotFound(format!("no vault record for {key_name}")))?;
        let record = EncryptedSecret::unpack(&packed)?;
        crypto::decrypt(
            &record.cipher,
            &record.key,
            &record.iv,
            &record.tag,
            ciphertext,
        )
    }

    /// Delete the record stored under `name`. Removing a missing record is
    /// not an error.
    pub fn remove(&self, name: &str, scope: SecretScope) -> Result<()> {
        let key_name = storage_key(name);
        match scope {
            SecretScope::Global => self.config.delete(&key_name),
            SecretScope::Transaction(order_id) => self.orders.delete_meta(order_id, &key_name),
        }
    }

    fn read_record(&self, key_name: &str, scope: SecretScope) -> Result<Option<String>> {
        let value = match scope {
            SecretScope::Global => self.config.get(key_name)?,
            SecretScope::Transaction(order_id) => self.orders.get_meta(order_id, key_name)?,
        };
        Ok(value.filter(|v| !v.is_empty()))
    }

    fn write_record(&self, key_name: &str, scope: SecretScope, packed: &str) -> Result<()> {
        match scope {
            SecretScope::Global => self.config.set(key_name, packed),
            SecretScope::Transaction(order_id) => self.orders.set_meta(order_id, key_name, packed),
        }
    }
}
