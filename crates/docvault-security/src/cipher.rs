// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Envelope cipher — AES-256-GCM with a fresh 96-bit IV per call.
//
// Blob layout, shared by buffer and stream modes:
//
//   iv (12 bytes) || ciphertext || tag (16 bytes)
//
// Decryption authenticates the whole blob before any plaintext is released.

use std::io::{Read, Write};
use std::sync::Arc;

use docvault_core::error::{Result, VaultError};
use ring::aead::{Aad, NONCE_LEN, Nonce, Tag};
use ring::rand::{SecureRandom, SystemRandom};
use tracing::{debug, instrument, warn};
use zeroize::Zeroizing;

use crate::keys::{KeyAlias, KeyProvider};

/// Authentication tag length for AES-256-GCM.
pub const TAG_LEN: usize = 16;

/// Smallest well-formed blob: IV plus tag around an empty ciphertext.
pub const MIN_BLOB_LEN: usize = NONCE_LEN + TAG_LEN;

/// Encrypts and decrypts blobs with the key behind one alias.
#[derive(Clone)]
pub struct EnvelopeCipher {
    provider: Arc<dyn KeyProvider>,
    alias: KeyAlias,
    rng: SystemRandom,
}

impl std::fmt::Debug for EnvelopeCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeCipher")
            .field("provider", &self.provider.name())
            .field("alias", &self.alias)
            .finish()
    }
}

impl EnvelopeCipher {
    pub fn new(provider: Arc<dyn KeyProvider>, alias: KeyAlias) -> Self {
        Self {
            provider,
            alias,
            rng: SystemRandom::new(),
        }
    }

    pub fn alias(&self) -> KeyAlias {
        self.alias
    }

    /// Encrypt `plaintext` into a self-contained blob.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.encrypt_with_aad(plaintext, &[])
    }

    /// Decrypt a blob produced by [`encrypt`](Self::encrypt).
    pub fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>> {
        self.decrypt_with_aad(blob, &[])
    }

    /// Encrypt and bind `aad` (for example a file header) to the ciphertext.
    #[instrument(skip_all, fields(alias = %self.alias, plaintext_len = plaintext.len()))]
    pub fn encrypt_with_aad(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let nonce = self.fresh_nonce()?;
        let mut blob = Vec::with_capacity(MIN_BLOB_LEN + plaintext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(plaintext);

        let tag = self.seal(nonce, aad, &mut blob[NONCE_LEN..])?;
        blob.extend_from_slice(tag.as_ref());

        debug!(blob_len = blob.len(), "sealed blob");
        Ok(blob)
    }

    /// Decrypt a blob whose associated data must equal `aad`.
    ///
    /// Any bit flip, truncation, wrong key, or AAD mismatch yields
    /// `VaultError::Authentication`.
    #[instrument(skip_all, fields(alias = %self.alias, blob_len = blob.len()))]
    pub fn decrypt_with_aad(&self, blob: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        if blob.len() < MIN_BLOB_LEN {
            warn!("blob shorter than IV plus tag");
            return Err(VaultError::Authentication);
        }
        let (iv, sealed) = blob.split_at(NONCE_LEN);
        let nonce =
            Nonce::try_assume_unique_for_key(iv).map_err(|_| VaultError::Authentication)?;
        let key = self.provider.sealing_key(self.alias)?;

        // Scrubbed on every exit path, including a failed open.
        let mut buffer = Zeroizing::new(sealed.to_vec());
        let plaintext_len = key
            .open_in_place(nonce, Aad::from(aad), &mut buffer[..])
            .map_err(|_| {
                warn!("authentication tag mismatch");
                VaultError::Authentication
            })?
            .len();
        buffer.truncate(plaintext_len);

        Ok(std::mem::take(&mut *buffer))
    }

    /// Start a streaming encryption into `sink`. The IV is written
    /// immediately; ciphertext and tag follow on [`EncryptingWriter::finish`].
    pub fn encrypt_stream<W: Write>(&self, sink: W) -> Result<EncryptingWriter<W>> {
        self.encrypt_stream_with_aad(sink, &[])
    }

    pub fn encrypt_stream_with_aad<W: Write>(
        &self,
        mut sink: W,
        aad: &[u8],
    ) -> Result<EncryptingWriter<W>> {
        let nonce = self.fresh_nonce()?;
        sink.write_all(&nonce)?;
        Ok(EncryptingWriter {
            cipher: self.clone(),
            sink,
            nonce,
            aad: aad.to_vec(),
            plaintext: Zeroizing::new(Vec::new()),
        })
    }

    /// Read a whole blob from `source`, authenticate it, and hand back a
    /// reader over the plaintext.
    pub fn decrypt_stream<R: Read>(&self, source: R) -> Result<DecryptingReader> {
        self.decrypt_stream_with_aad(source, &[])
    }

    pub fn decrypt_stream_with_aad<R: Read>(
        &self,
        mut source: R,
        aad: &[u8],
    ) -> Result<DecryptingReader> {
        let mut blob = Vec::new();
        source.read_to_end(&mut blob)?;
        let plaintext = self.decrypt_with_aad(&blob, aad)?;
        Ok(DecryptingReader {
            plaintext: Zeroizing::new(plaintext),
            position: 0,
        })
    }

    fn fresh_nonce(&self) -> Result<[u8; NONCE_LEN]> {
        let mut nonce = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce)
            .map_err(|_| VaultError::Encryption("system RNG unavailable".into()))?;
        Ok(nonce)
    }

    fn seal(&self, nonce: [u8; NONCE_LEN], aad: &[u8], in_out: &mut [u8]) -> Result<Tag> {
        let key = self.provider.sealing_key(self.alias)?;
        key.seal_in_place_separate_tag(
            Nonce::assume_unique_for_key(nonce),
            Aad::from(aad),
            in_out,
        )
        .map_err(|e| VaultError::Encryption(format!("seal failed: {e}")))
    }
}

/// Streaming encryptor. Plaintext is buffered (and zeroized on drop) until
/// `finish` seals it; dropping without `finish` leaves only the IV in the
/// sink.
pub struct EncryptingWriter<W: Write> {
    cipher: EnvelopeCipher,
    sink: W,
    nonce: [u8; NONCE_LEN],
    aad: Vec<u8>,
    plaintext: Zeroizing<Vec<u8>>,
}

impl<W: Write> EncryptingWriter<W> {
    /// Seal the buffered plaintext, write ciphertext and tag, and return
    /// the sink.
    pub fn finish(self) -> Result<W> {
        let Self {
            cipher,
            mut sink,
            nonce,
            aad,
            mut plaintext,
        } = self;

        let tag = cipher.seal(nonce, &aad, &mut plaintext[..])?;
        sink.write_all(&plaintext)?;
        sink.write_all(tag.as_ref())?;
        sink.flush()?;

        debug!(ciphertext_len = plaintext.len(), "stream sealed");
        Ok(sink)
    }
}

impl<W: Write> Write for EncryptingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.plaintext.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Reader over authenticated plaintext.
pub struct DecryptingReader {
    plaintext: Zeroizing<Vec<u8>>,
    position: usize,
}

impl DecryptingReader {
    /// Total plaintext length.
    pub fn len(&self) -> usize {
        self.plaintext.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plaintext.is_empty()
    }
}

impl Read for DecryptingReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let remaining = &self.plaintext[self.position..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.position += n;
        Ok(n)
    }
}
