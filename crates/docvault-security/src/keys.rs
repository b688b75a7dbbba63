// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Key providers — where the AES-256-GCM keys live.
//
// Callers only ever receive an opaque `LessSafeKey` handle. Raw key bytes
// stay inside the provider and are zeroized once the handle is built.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use base64::{Engine as _, engine::general_purpose};
use docvault_core::error::{Result, VaultError};
use keyring::Entry;
use ring::aead::{AES_256_GCM, LessSafeKey, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};
use tracing::{debug, info, instrument, warn};
use zeroize::Zeroizing;

/// Length of an AES-256 key in bytes.
pub const KEY_LEN: usize = 32;

/// Named key slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAlias {
    /// Small at-rest secrets such as the PIN record.
    Secret,
    /// Document payloads and backups.
    Bulk,
}

impl KeyAlias {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Secret => "docvault.secret",
            Self::Bulk => "docvault.bulk",
        }
    }
}

impl std::fmt::Display for KeyAlias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability that hands out sealing keys by alias.
///
/// Keys are created on first use. `rotate` replaces a single alias; data
/// sealed under the previous key can no longer be opened.
pub trait KeyProvider: Send + Sync {
    fn sealing_key(&self, alias: KeyAlias) -> Result<Arc<LessSafeKey>>;

    fn rotate(&self, alias: KeyAlias) -> Result<()>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

fn generate_key_bytes(rng: &SystemRandom) -> Result<Zeroizing<Vec<u8>>> {
    let mut bytes = Zeroizing::new(vec![0u8; KEY_LEN]);
    rng.fill(&mut bytes)
        .map_err(|_| VaultError::KeyStore("system RNG unavailable".into()))?;
    Ok(bytes)
}

fn key_from_bytes(bytes: &[u8]) -> Result<Arc<LessSafeKey>> {
    if bytes.len() != KEY_LEN {
        return Err(VaultError::KeyStore(format!(
            "stored key has {} bytes, expected {KEY_LEN}",
            bytes.len()
        )));
    }
    let unbound = UnboundKey::new(&AES_256_GCM, bytes)
        .map_err(|e| VaultError::KeyStore(format!("rejected key material: {e}")))?;
    Ok(Arc::new(LessSafeKey::new(unbound)))
}

// ---------------------------------------------------------------------------
// In-memory provider
// ---------------------------------------------------------------------------

/// Keys generated per process and never persisted. Used by tests and
/// ephemeral sessions.
pub struct InMemoryKeyProvider {
    keys: Mutex<HashMap<KeyAlias, Arc<LessSafeKey>>>,
    rng: SystemRandom,
}

impl InMemoryKeyProvider {
    pub fn new() -> Self {
        Self {
            keys: Mutex::new(HashMap::new()),
            rng: SystemRandom::new(),
        }
    }
}

impl Default for InMemoryKeyProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyProvider for InMemoryKeyProvider {
    fn sealing_key(&self, alias: KeyAlias) -> Result<Arc<LessSafeKey>> {
        let mut keys = self
            .keys
            .lock()
            .map_err(|_| VaultError::KeyStore("key table lock poisoned".into()))?;
        if let Some(key) = keys.get(&alias) {
            return Ok(Arc::clone(key));
        }
        let key = key_from_bytes(&generate_key_bytes(&self.rng)?)?;
        keys.insert(alias, Arc::clone(&key));
        debug!(%alias, "generated in-memory key");
        Ok(key)
    }

    fn rotate(&self, alias: KeyAlias) -> Result<()> {
        let key = key_from_bytes(&generate_key_bytes(&self.rng)?)?;
        self.keys
            .lock()
            .map_err(|_| VaultError::KeyStore("key table lock poisoned".into()))?
            .insert(alias, key);
        info!(%alias, "rotated in-memory key");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "in-memory"
    }
}

// ---------------------------------------------------------------------------
// OS keychain provider
// ---------------------------------------------------------------------------

/// Keys stored base64-encoded in the operating system keychain under
/// `service`/`alias`, cached for the life of the provider.
pub struct PlatformKeyProvider {
    service: String,
    cache: Mutex<HashMap<KeyAlias, Arc<LessSafeKey>>>,
    rng: SystemRandom,
}

impl PlatformKeyProvider {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            cache: Mutex::new(HashMap::new()),
            rng: SystemRandom::new(),
        }
    }

    fn entry(&self, alias: KeyAlias) -> Result<Entry> {
        Entry::new(&self.service, alias.as_str())
            .map_err(|e| VaultError::KeyStore(format!("keyring init: {e}")))
    }

    #[instrument(skip(self), fields(service = %self.service))]
    fn load_or_create(&self, alias: KeyAlias) -> Result<Arc<LessSafeKey>> {
        load_or_create_key(&self.entry(alias)?, &self.rng)
    }
}

fn store_key(entry: &Entry, bytes: &[u8]) -> Result<()> {
    let encoded = Zeroizing::new(general_purpose::STANDARD.encode(bytes));
    entry
        .set_password(&encoded)
        .map_err(|e| VaultError::KeyStore(format!("store key: {e}")))
}

/// Read the key held by `entry`, generating and storing one if the entry
/// does not exist yet.
fn load_or_create_key(entry: &Entry, rng: &SystemRandom) -> Result<Arc<LessSafeKey>> {
    match entry.get_password() {
        Ok(encoded) => {
            let encoded = Zeroizing::new(encoded);
            let bytes = Zeroizing::new(
                general_purpose::STANDARD
                    .decode(encoded.as_bytes())
                    .map_err(|e| VaultError::KeyStore(format!("decode key: {e}")))?,
            );
            debug!("loaded key from keychain");
            key_from_bytes(&bytes)
        }
        Err(keyring::Error::NoEntry) => {
            let bytes = generate_key_bytes(rng)?;
            store_key(entry, &bytes)?;
            info!("created new key in keychain");
            key_from_bytes(&bytes)
        }
        Err(e) => {
            warn!(error = %e, "keychain read failed");
            Err(VaultError::KeyStore(format!("load key: {e}")))
        }
    }
}

impl KeyProvider for PlatformKeyProvider {
    fn sealing_key(&self, alias: KeyAlias) -> Result<Arc<LessSafeKey>> {
        let mut cache = self
            .cache
            .lock()
            .map_err(|_| VaultError::KeyStore("key cache lock poisoned".into()))?;
        if let Some(key) = cache.get(&alias) {
            return Ok(Arc::clone(key));
        }
        let key = self.load_or_create(alias)?;
        cache.insert(alias, Arc::clone(&key));
        Ok(key)
    }

    #[instrument(skip(self), fields(service = %self.service))]
    fn rotate(&self, alias: KeyAlias) -> Result<()> {
        let bytes = generate_key_bytes(&self.rng)?;
        let key = key_from_bytes(&bytes)?;
        store_key(&self.entry(alias)?, &bytes)?;
        self.cache
            .lock()
            .map_err(|_| VaultError::KeyStore("key cache lock poisoned".into()))?
            .insert(alias, key);
        info!("rotated keychain key");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "os-keychain"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_key_is_stable_per_alias() {
        let provider = InMemoryKeyProvider::new();
        let first = provider.sealing_key(KeyAlias::Bulk).unwrap();
        let second = provider.sealing_key(KeyAlias::Bulk).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn aliases_get_distinct_keys() {
        let provider = InMemoryKeyProvider::new();
        let bulk = provider.sealing_key(KeyAlias::Bulk).unwrap();
        let secret = provider.sealing_key(KeyAlias::Secret).unwrap();
        assert!(!Arc::ptr_eq(&bulk, &secret));
    }

    #[test]
    fn rotate_replaces_only_one_alias() {
        let provider = InMemoryKeyProvider::new();
        let bulk = provider.sealing_key(KeyAlias::Bulk).unwrap();
        let secret = provider.sealing_key(KeyAlias::Secret).unwrap();

        provider.rotate(KeyAlias::Bulk).unwrap();

        assert!(!Arc::ptr_eq(&bulk, &provider.sealing_key(KeyAlias::Bulk).unwrap()));
        assert!(Arc::ptr_eq(&secret, &provider.sealing_key(KeyAlias::Secret).unwrap()));
    }

    #[test]
    fn short_key_material_is_rejected() {
        assert!(matches!(key_from_bytes(&[0u8; 16]), Err(VaultError::KeyStore(_))));
    }

    #[test]
    fn alias_names_are_namespaced() {
        assert_eq!(KeyAlias::Secret.as_str(), "docvault.secret");
        assert_eq!(KeyAlias::Bulk.to_string(), "docvault.bulk");
    }

    // -- OS keychain, backed by keyring's in-process mock ---------------------

    fn use_mock_keychain() {
        static INSTALL: std::sync::Once = std::sync::Once::new();
        INSTALL.call_once(|| {
            keyring::set_default_credential_builder(keyring::mock::default_credential_builder());
        });
    }

    /// Whether `a` opens what `b` sealed.
    fn same_key(a: &LessSafeKey, b: &LessSafeKey) -> bool {
        use ring::aead::{Aad, Nonce};
        let mut sealed = b"key check".to_vec();
        b.seal_in_place_append_tag(Nonce::assume_unique_for_key([7; 12]), Aad::empty(), &mut sealed)
            .unwrap();
        a.open_in_place(Nonce::assume_unique_for_key([7; 12]), Aad::empty(), &mut sealed)
            .is_ok()
    }

    #[test]
    fn keychain_entry_is_created_then_reloaded() {
        use_mock_keychain();
        let entry = Entry::new("docvault-test", "created-then-reloaded").unwrap();
        let rng = SystemRandom::new();
        assert!(matches!(entry.get_password(), Err(keyring::Error::NoEntry)));

        let created = load_or_create_key(&entry, &rng).unwrap();
        let stored = general_purpose::STANDARD
            .decode(entry.get_password().unwrap())
            .unwrap();
        assert_eq!(stored.len(), KEY_LEN);

        let reloaded = load_or_create_key(&entry, &rng).unwrap();
        assert!(same_key(&created, &reloaded));
    }

    #[test]
    fn corrupt_keychain_entries_are_rejected() {
        use_mock_keychain();
        let rng = SystemRandom::new();

        let garbage = Entry::new("docvault-test", "not-base64").unwrap();
        garbage.set_password("%%% not base64 %%%").unwrap();
        assert!(matches!(load_or_create_key(&garbage, &rng), Err(VaultError::KeyStore(_))));

        let short = Entry::new("docvault-test", "short-key").unwrap();
        short.set_password(&general_purpose::STANDARD.encode([1u8; 16])).unwrap();
        assert!(matches!(load_or_create_key(&short, &rng), Err(VaultError::KeyStore(_))));
    }

    #[test]
    fn platform_provider_caches_and_rotates_per_alias() {
        use_mock_keychain();
        let provider = PlatformKeyProvider::new("docvault-test");
        assert_eq!(provider.name(), "os-keychain");

        let bulk = provider.sealing_key(KeyAlias::Bulk).unwrap();
        let secret = provider.sealing_key(KeyAlias::Secret).unwrap();
        assert!(Arc::ptr_eq(&bulk, &provider.sealing_key(KeyAlias::Bulk).unwrap()));
        assert!(!same_key(&bulk, &secret));

        provider.rotate(KeyAlias::Bulk).unwrap();
        let rotated = provider.sealing_key(KeyAlias::Bulk).unwrap();
        assert!(!same_key(&rotated, &bulk));
        assert!(Arc::ptr_eq(&secret, &provider.sealing_key(KeyAlias::Secret).unwrap()));
    }
}
