// crates/trust-gate-core/src/runtime/audit.rs
// ============================================================================
// Module: Trust Gate Audit Output
// Description: JSON-lines audit writer for stderr or append-only files.
// Purpose: Emit structured audit events without a logging framework dependency.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Audit events are serialized as one JSON object per line. The writer is
//! best-effort: serialization or I/O failures never affect the decision
//! being audited. Component crates implement their own sink traits on top
//! of [`JsonLinesAuditSink`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use serde::Serialize;

// ============================================================================
// SECTION: Sink
// ============================================================================

/// Output target for audit lines.
#[derive(Debug)]
enum AuditTarget {
    /// Standard error.
    Stderr,
    /// Append-only file.
    File(Mutex<File>),
    /// Discard.
    Noop,
}

/// JSON-lines audit writer.
#[derive(Debug)]
pub struct JsonLinesAuditSink {
    /// Output target.
    target: AuditTarget,
}

impl JsonLinesAuditSink {
    /// Creates a sink writing to stderr.
    #[must_use]
    pub const fn stderr() -> Self {
        Self {
            target: AuditTarget::Stderr,
        }
    }

    /// Creates a sink that discards every event.
    #[must_use]
    pub const fn noop() -> Self {
        Self {
            target: AuditTarget::Noop,
        }
    }

    /// Opens an audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn file(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            target: AuditTarget::File(Mutex::new(file)),
        })
    }

    /// Writes one event as a JSON line.
    pub fn emit<T: Serialize + ?Sized>(&self, event: &T) {
        match &self.target {
            AuditTarget::Noop => {}
            AuditTarget::Stderr => {
                if let Ok(payload) = serde_json::to_string(event) {
                    let _ = writeln!(io::stderr(), "{payload}");
                }
            }
            AuditTarget::File(file) => {
                if let Ok(payload) = serde_json::to_string(event)
                    && let Ok(mut file) = file.lock()
                {
                    let _ = writeln!(file, "{payload}");
                    let _ = file.flush();
                }
            }
        }
    }
}
