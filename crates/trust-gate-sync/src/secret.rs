// crates/trust-gate-sync/src/secret.rs
// ============================================================================
// Module: Edge Secret Generation
// Description: High-entropy edge secret values.
// Purpose: Produce fresh secrets for bootstrap and rotation.
// Dependencies: rand, base64
// ============================================================================

//! ## Overview
//! Secrets are 32 bytes from the operating system RNG, encoded base64url
//! without padding so they fit in a request header unchanged.

use std::sync::Mutex;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use trust_gate_core::SecretValue;

/// Secret length in bytes before encoding.
pub const SECRET_BYTES: usize = 32;

/// Source of new edge secret values.
pub trait SecretGenerator: Send + Sync {
    /// Returns a new secret.
    ///
    /// # Errors
    ///
    /// Returns a message when no entropy is available.
    fn generate(&self) -> Result<SecretValue, String>;
}

/// Operating system RNG generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSecretGenerator;

impl SecretGenerator for OsSecretGenerator {
    fn generate(&self) -> Result<SecretValue, String> {
        let mut bytes = [0_u8; SECRET_BYTES];
        OsRng.try_fill_bytes(&mut bytes).map_err(|err| format!("os rng unavailable: {err}"))?;
        Ok(SecretValue::new(URL_SAFE_NO_PAD.encode(bytes)))
    }
}

/// Generator returning a fixed sequence; for tests and dry runs.
#[derive(Debug, Default)]
pub struct SequenceSecretGenerator {
    /// Next counter value.
    next: Mutex<u64>,
}

impl SecretGenerator for SequenceSecretGenerator {
    fn generate(&self) -> Result<SecretValue, String> {
        let mut next = self.next.lock().map_err(|_| "secret sequence poisoned".to_string())?;
        *next = next.saturating_add(1);
        Ok(SecretValue::new(format!("edge-secret-{next}")))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test assertions use unwrap for clarity.")]

    use super::*;

    #[test]
    fn os_secrets_are_distinct_and_url_safe() {
        let first = OsSecretGenerator.generate().unwrap();
        let second = OsSecretGenerator.generate().unwrap();
        assert_ne!(first, second);
        assert_eq!(first.expose().len(), 43);
        assert!(first.expose().chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn sequence_generator_counts_up() {
        let generator = SequenceSecretGenerator::default();
        assert_eq!(generator.generate().unwrap().expose(), "edge-secret-1");
        assert_eq!(generator.generate().unwrap().expose(), "edge-secret-2");
    }
}
