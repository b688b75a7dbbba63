// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for the presentation shell.
//
// Every technical error is mapped to plain English with a clear suggestion.
// The severity and retry flag let the shell decide whether to retry on its own.

use crate::error::VaultError;

/// Severity of an error from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Busy storage, locked database: retrying may succeed.
    Transient,
    /// The user must do something (pick another file, free space, re-enter PIN).
    ActionRequired,
    /// Retrying will not help: tampered data, unsupported archive.
    Permanent,
}

/// A human-readable error with plain English message and actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Plain English summary (shown as a heading).
    pub message: String,
    /// What the user should try (shown as body text).
    pub suggestion: String,
    /// Whether the shell may retry automatically.
    pub retriable: bool,
    pub severity: Severity,
}

impl HumanError {
    fn new(message: &str, suggestion: impl Into<String>, retriable: bool, severity: Severity) -> Self {
        Self {
            message: message.into(),
            suggestion: suggestion.into(),
            retriable,
            severity,
        }
    }
}

/// Convert a `VaultError` into a `HumanError`.
pub fn humanize_error(err: &VaultError) -> HumanError {
    match err {
        // -- Image pipeline --
        VaultError::Codec(_) => HumanError::new(
            "There's a problem with this image.",
            "The picture may be damaged or in an unusual format. Try taking the photo again or saving it as a JPEG or PNG.",
            false,
            Severity::ActionRequired,
        ),

        VaultError::Pdf(_) => HumanError::new(
            "We couldn't turn this page into a PDF.",
            "Try scanning the page again. If it keeps happening, the image may be too large.",
            false,
            Severity::Permanent,
        ),

        // -- Cryptography --
        VaultError::Encryption(_) => HumanError::new(
            "We couldn't lock this document away safely.",
            "Try again. If it keeps happening, restart the app.",
            true,
            Severity::Transient,
        ),

        VaultError::Authentication => HumanError::new(
            "This file has been damaged or changed.",
            "The stored copy can't be opened safely. Restore it from a backup or import the original again.",
            false,
            Severity::Permanent,
        ),

        VaultError::KeyStore(_) => HumanError::new(
            "Your device's secure key storage isn't responding.",
            "Unlock your device or keychain, then try again.",
            true,
            Severity::ActionRequired,
        ),

        VaultError::IntegrityMismatch { .. } => HumanError::new(
            "This file has been changed since it was stored.",
            "The stored copy doesn't match its fingerprint. Import the file again from the original source.",
            false,
            Severity::Permanent,
        ),

        // -- Storage --
        VaultError::Database(detail) => {
            let lower = detail.to_ascii_lowercase();
            if lower.contains("locked") || lower.contains("busy") {
                HumanError::new(
                    "The document list is busy.",
                    "Wait a moment. We'll try again automatically.",
                    true,
                    Severity::Transient,
                )
            } else {
                HumanError::new(
                    "The document list had a problem.",
                    "Try closing and reopening the app. Your documents should still be there.",
                    true,
                    Severity::Transient,
                )
            }
        }

        VaultError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::NotFound => HumanError::new(
                "The file couldn't be found.",
                "It may have been moved or deleted. Try choosing the file again.",
                false,
                Severity::ActionRequired,
            ),
            std::io::ErrorKind::PermissionDenied => HumanError::new(
                "The app doesn't have permission to use that file.",
                "Check the folder permissions, or copy the file somewhere else first.",
                false,
                Severity::ActionRequired,
            ),
            _ => HumanError::new(
                "There was a problem reading or writing a file.",
                "Try again. If this keeps happening, your device's storage may be full.",
                true,
                Severity::Transient,
            ),
        },

        VaultError::Serialization(_) => HumanError::new(
            "The app had an internal data problem.",
            "Try again. If this keeps happening, please report it.",
            true,
            Severity::Transient,
        ),

        VaultError::Compression(_) => HumanError::new(
            "The backup file couldn't be unpacked.",
            "The backup may be incomplete. Try copying it again or pick a different backup.",
            false,
            Severity::ActionRequired,
        ),

        VaultError::UnsupportedBackup(_) => HumanError::new(
            "This isn't a backup we can read.",
            "Make sure you picked a DocVault backup file made by this or an older version of the app.",
            false,
            Severity::Permanent,
        ),

        VaultError::NotFound(what) => HumanError::new(
            "We couldn't find that item.",
            format!("It may already have been deleted. ({what})"),
            false,
            Severity::ActionRequired,
        ),

        VaultError::InvalidInput(detail) => HumanError::new(
            "Something about that request wasn't right.",
            format!("Check what you entered and try again. ({detail})"),
            false,
            Severity::ActionRequired,
        ),
    }
}
