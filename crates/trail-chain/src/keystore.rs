//! Password-protected key store container.
//!
//! Named entries (symmetric secrets and the ed25519 signing identity) are
//! kept in a single file encrypted with AES-256-GCM under a key derived
//! from the store password via PBKDF2-HMAC-SHA256. Every write persists
//! the container before returning, so the chain state on disk always
//! matches what the writer committed.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use aes_gcm::{aead::Aead, aead::KeyInit, Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::{SigningKey, VerifyingKey};
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use trail_events::AuditError;

/// Pre-provisioned chain seed. Read-only after first use.
pub const INITIAL_KEY_ALIAS: &str = "InitialKey";
/// The evolving chain secret, rewritten after every data row.
pub const CURRENT_KEY_ALIAS: &str = "CurrentKey";
/// The last emitted signature, rewritten after every signature row.
pub const CURRENT_SIGNATURE_ALIAS: &str = "CurrentSignature";
/// The long-lived asymmetric signing identity.
pub const SIGNATURE_ALIAS: &str = "Signature";

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const PBKDF2_ITERATIONS: u32 = 100_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum StoredEntry {
    Secret { material: String },
    Keypair { seed: String, public: String },
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StorePayload {
    entries: BTreeMap<String, StoredEntry>,
}

/// Handle over one decrypted container. All operations are synchronous;
/// the secure writer serializes access under its own lock.
pub struct KeyStore {
    path: PathBuf,
    password: String,
    payload: StorePayload,
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never print the password or entry material
        f.debug_struct("KeyStore")
            .field("path", &self.path)
            .field("entries", &self.payload.entries.len())
            .finish()
    }
}

impl KeyStore {
    /// Creates an empty container file. Fails if the path already exists.
    pub fn create(path: impl Into<PathBuf>, password: impl Into<String>) -> Result<Self, AuditError> {
        let path = path.into();
        let password = password.into();
        check_password(&password)?;
        if path.exists() {
            return Err(AuditError::KeyStore(format!(
                "key store {} already exists",
                path.display()
            )));
        }
        let store = Self {
            path,
            password,
            payload: StorePayload::default(),
        };
        store.save()?;
        Ok(store)
    }

    /// Opens and decrypts an existing container.
    pub fn open(path: impl Into<PathBuf>, password: impl Into<String>) -> Result<Self, AuditError> {
        let path = path.into();
        let password = password.into();
        check_password(&password)?;

        let bytes = fs::read(&path).map_err(|err| {
            AuditError::KeyStore(format!("reading key store {}: {err}", path.display()))
        })?;
        let payload = unseal(&bytes, &password)?;
        Ok(Self {
            path,
            password,
            payload,
        })
    }

    /// Creates a container pre-seeded with the chain seed and the signing
    /// identity, the two entries every fresh deployment needs.
    pub fn provision(
        path: impl Into<PathBuf>,
        password: impl Into<String>,
        initial_key: &[u8],
        signing_key: &SigningKey,
    ) -> Result<Self, AuditError> {
        let mut store = Self::create(path, password)?;
        store.write_secret(INITIAL_KEY_ALIAS, initial_key)?;
        store.write_keypair(SIGNATURE_ALIAS, signing_key)?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.payload.entries.contains_key(alias)
    }

    /// Reads raw secret material stored under `alias`.
    pub fn read_secret(&self, alias: &str) -> Result<Vec<u8>, AuditError> {
        match self.payload.entries.get(alias) {
            Some(StoredEntry::Secret { material }) => decode_b64(alias, material),
            Some(StoredEntry::Keypair { .. }) => Err(AuditError::KeyStore(format!(
                "alias '{alias}' holds a keypair, not a secret"
            ))),
            None => missing(alias),
        }
    }

    /// Reads the private half of the keypair stored under `alias`.
    pub fn read_private(&self, alias: &str) -> Result<SigningKey, AuditError> {
        match self.payload.entries.get(alias) {
            Some(StoredEntry::Keypair { seed, .. }) => {
                let bytes = decode_b64(alias, seed)?;
                let seed: [u8; 32] = bytes.try_into().map_err(|_| {
                    AuditError::KeyStore(format!("alias '{alias}' holds a malformed seed"))
                })?;
                Ok(SigningKey::from_bytes(&seed))
            }
            Some(StoredEntry::Secret { .. }) => Err(AuditError::KeyStore(format!(
                "alias '{alias}' holds a secret, not a keypair"
            ))),
            None => missing(alias),
        }
    }

    /// Reads the public half of the keypair stored under `alias`.
    pub fn read_public(&self, alias: &str) -> Result<VerifyingKey, AuditError> {
        match self.payload.entries.get(alias) {
            Some(StoredEntry::Keypair { public, .. }) => {
                let bytes = decode_b64(alias, public)?;
                let bytes: [u8; 32] = bytes.try_into().map_err(|_| {
                    AuditError::KeyStore(format!("alias '{alias}' holds a malformed public key"))
                })?;
                VerifyingKey::from_bytes(&bytes).map_err(|err| {
                    AuditError::KeyStore(format!("alias '{alias}' is not a valid ed25519 key: {err}"))
                })
            }
            Some(StoredEntry::Secret { .. }) => Err(AuditError::KeyStore(format!(
                "alias '{alias}' holds a secret, not a keypair"
            ))),
            None => missing(alias),
        }
    }

    /// Stores secret material under `alias` and persists the container.
    pub fn write_secret(&mut self, alias: &str, material: &[u8]) -> Result<(), AuditError> {
        self.payload.entries.insert(
            alias.to_owned(),
            StoredEntry::Secret {
                material: STANDARD.encode(material),
            },
        );
        self.save()
    }

    /// Stores a signing identity under `alias` and persists the container.
    pub fn write_keypair(&mut self, alias: &str, key: &SigningKey) -> Result<(), AuditError> {
        self.payload.entries.insert(
            alias.to_owned(),
            StoredEntry::Keypair {
                seed: STANDARD.encode(key.to_bytes()),
                public: STANDARD.encode(key.verifying_key().to_bytes()),
            },
        );
        self.save()
    }

    fn save(&self) -> Result<(), AuditError> {
        let plaintext = serde_json::to_vec(&self.payload)
            .map_err(|err| AuditError::KeyStore(format!("serializing key store: {err}")))?;
        let sealed = seal(&plaintext, &self.password)?;
        fs::write(&self.path, sealed).map_err(|err| {
            AuditError::KeyStore(format!("writing key store {}: {err}", self.path.display()))
        })
    }
}

fn check_password(password: &str) -> Result<(), AuditError> {
    if password.is_empty() {
        return Err(AuditError::KeyStore(
            "key store password must not be empty".to_owned(),
        ));
    }
    Ok(())
}

fn missing<T>(alias: &str) -> Result<T, AuditError> {
    Err(AuditError::KeyStore(format!("no entry under alias '{alias}'")))
}

fn decode_b64(alias: &str, value: &str) -> Result<Vec<u8>, AuditError> {
    STANDARD
        .decode(value)
        .map_err(|err| AuditError::KeyStore(format!("alias '{alias}' is corrupt: {err}")))
}

fn derive_key(password: &str, salt: &[u8]) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key);
    key
}

fn seal(plaintext: &[u8], password: &str) -> Result<Vec<u8>, AuditError> {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let key = derive_key(password, &salt);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| AuditError::KeyStore("sealing key store failed".to_owned()))?;

    let mut output = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
    output.extend_from_slice(&salt);
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

fn unseal(bytes: &[u8], password: &str) -> Result<StorePayload, AuditError> {
    if bytes.len() <= SALT_LEN + NONCE_LEN {
        return Err(AuditError::KeyStore("key store container too short".to_owned()));
    }
    let (salt, rest) = bytes.split_at(SALT_LEN);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);

    let key = derive_key(password, salt);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    let nonce = Nonce::from_slice(nonce_bytes);

    let plaintext = cipher.decrypt(nonce, ciphertext).map_err(|_| {
        AuditError::KeyStore("wrong password or corrupt key store container".to_owned())
    })?;

    serde_json::from_slice(&plaintext)
        .map_err(|err| AuditError::KeyStore(format!("decoding key store payload: {err}")))
}
