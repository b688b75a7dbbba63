// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PIN vault — PBKDF2-HMAC-SHA256 record sealed under the `Secret` key alias.

use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use docvault_core::error::{Result, VaultError};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use zeroize::Zeroizing;

use crate::cipher::EnvelopeCipher;
use crate::keys::{KeyAlias, KeyProvider};

const PBKDF2_ITERATIONS: u32 = 100_000;
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;
const RECORD_VERSION: u8 = 1;
/// Bound to the sealed record so a blob from another context cannot be
/// swapped in.
const RECORD_AAD: &[u8] = b"docvault.pin.v1";

/// Accepted PIN lengths, in digits.
pub const PIN_DIGITS: std::ops::RangeInclusive<usize> = 4..=6;

#[derive(Serialize, Deserialize)]
struct PinRecord {
    version: u8,
    iterations: u32,
    salt: String,
    hash: String,
}

/// Stores and checks the unlock PIN.
#[derive(Debug)]
pub struct PinVault {
    path: PathBuf,
    cipher: EnvelopeCipher,
    rng: SystemRandom,
}

impl PinVault {
    pub fn new(path: impl Into<PathBuf>, keys: Arc<dyn KeyProvider>) -> Self {
        Self {
            path: path.into(),
            cipher: EnvelopeCipher::new(keys, KeyAlias::Secret),
            rng: SystemRandom::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_pin_set(&self) -> bool {
        self.path.is_file()
    }

    /// Replace the stored PIN. The PIN must be 4 to 6 ASCII digits.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn set_pin(&self, pin: &str) -> Result<()> {
        validate_pin(pin)?;

        let mut salt = [0u8; SALT_LEN];
        self.rng
            .fill(&mut salt)
            .map_err(|_| VaultError::Encryption("system RNG unavailable".into()))?;

        let mut hash = Zeroizing::new([0u8; HASH_LEN]);
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            iterations(PBKDF2_ITERATIONS)?,
            &salt,
            pin.as_bytes(),
            &mut hash[..],
        );

        let record = PinRecord {
            version: RECORD_VERSION,
            iterations: PBKDF2_ITERATIONS,
            salt: hex::encode(salt),
            hash: hex::encode(&hash[..]),
        };
        let json = Zeroizing::new(serde_json::to_vec(&record)?);
        let sealed = self.cipher.encrypt_with_aad(&json, RECORD_AAD)?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let staging = self.path.with_extension("tmp");
        std::fs::write(&staging, &sealed)?;
        std::fs::rename(&staging, &self.path)?;

        info!("PIN updated");
        Ok(())
    }

    /// Check `pin` against the stored record in constant time.
    ///
    /// Returns `Ok(false)` when no PIN has been set.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn verify_pin(&self, pin: &str) -> Result<bool> {
        if !self.is_pin_set() {
            debug!("no PIN set");
            return Ok(false);
        }
        let sealed = std::fs::read(&self.path)?;
        let json = Zeroizing::new(self.cipher.decrypt_with_aad(&sealed, RECORD_AAD)?);
        let record: PinRecord = serde_json::from_slice(&json)?;

        if record.version != RECORD_VERSION {
            return Err(VaultError::InvalidInput(format!(
                "unknown PIN record version {}",
                record.version
            )));
        }
        let salt = hex::decode(&record.salt)
            .map_err(|e| VaultError::InvalidInput(format!("PIN record salt: {e}")))?;
        let hash = Zeroizing::new(
            hex::decode(&record.hash)
                .map_err(|e| VaultError::InvalidInput(format!("PIN record hash: {e}")))?,
        );

        let matched = pbkdf2::verify(
            pbkdf2::PBKDF2_HMAC_SHA256,
            iterations(record.iterations)?,
            &salt,
            pin.as_bytes(),
            &hash,
        )
        .is_ok();
        if !matched {
            warn!("PIN verification failed");
        }
        Ok(matched)
    }

    /// Remove the stored PIN. Clearing an unset PIN is not an error.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!("PIN cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn validate_pin(pin: &str) -> Result<()> {
    if !PIN_DIGITS.contains(&pin.len()) || !pin.bytes().all(|b| b.is_ascii_digit()) {
        return Err(VaultError::InvalidInput(format!(
            "PIN must be {} to {} digits",
            PIN_DIGITS.start(),
            PIN_DIGITS.end()
        )));
    }
    Ok(())
}

fn iterations(count: u32) -> Result<NonZeroU32> {
    NonZeroU32::new(count)
        .ok_or_else(|| VaultError::InvalidInput("PBKDF2 iteration count is zero".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::InMemoryKeyProvider;

    fn vault(dir: &tempfile::TempDir) -> PinVault {
        PinVault::new(dir.path().join("pin.sealed"), Arc::new(InMemoryKeyProvider::new()))
    }

    #[test]
    fn unset_pin_never_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let pins = vault(&dir);
        assert!(!pins.is_pin_set());
        assert!(!pins.verify_pin("1234").unwrap());
    }

    #[test]
    fn set_then_verify() {
        let dir = tempfile::tempdir().unwrap();
        let pins = vault(&dir);
        pins.set_pin("4821").unwrap();

        assert!(pins.is_pin_set());
        assert!(pins.verify_pin("4821").unwrap());
        assert!(!pins.verify_pin("4822").unwrap());
    }

    #[test]
    fn record_is_not_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let pins = vault(&dir);
        pins.set_pin("135790").unwrap();

        let raw = std::fs::read(pins.path()).unwrap();
        let text = String::from_utf8_lossy(&raw);
        assert!(!text.contains("iterations"));
        assert!(!text.contains("135790"));
    }

    #[test]
    fn rejects_malformed_pins() {
        let dir = tempfile::tempdir().unwrap();
        let pins = vault(&dir);
        for bad in ["", "123", "1234567", "12a4", "١٢٣٤"] {
            assert!(matches!(pins.set_pin(bad), Err(VaultError::InvalidInput(_))));
        }
        assert!(!pins.is_pin_set());
    }

    #[test]
    fn clear_removes_pin() {
        let dir = tempfile::tempdir().unwrap();
        let pins = vault(&dir);
        pins.set_pin("0000").unwrap();
        pins.clear().unwrap();
        assert!(!pins.is_pin_set());
        pins.clear().unwrap();
    }

    #[test]
    fn record_from_another_key_fails_authentication() {
        let dir = tempfile::tempdir().unwrap();
        vault(&dir).set_pin("2468").unwrap();
        // Fresh provider, fresh Secret key.
        assert!(matches!(vault(&dir).verify_pin("2468"), Err(VaultError::Authentication)));
    }
}
