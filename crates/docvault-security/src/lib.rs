// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// docvault-security — Cryptographic foundation for the document vault.
//
// Envelope encryption (AES-256-GCM) over keys held by a `KeyProvider`,
// streaming SHA-256 fingerprints used as the deduplication key, and the
// sealed PIN record.

pub mod cipher;
pub mod integrity;
pub mod keys;
pub mod pin;

pub use cipher::{DecryptingReader, EncryptingWriter, EnvelopeCipher};
pub use integrity::{hash_bytes, hash_file, hash_reader, verify_hash};
pub use keys::{InMemoryKeyProvider, KeyAlias, KeyProvider, PlatformKeyProvider};
pub use pin::PinVault;
