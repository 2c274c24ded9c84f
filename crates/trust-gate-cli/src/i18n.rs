// crates/trust-gate-cli/src/i18n.rs
// ============================================================================
// Module: CLI Message Catalog
// Description: Message catalog and placeholder substitution for the CLI.
// Purpose: Keep every user-facing string in one reviewed table.
// Dependencies: Standard library collections.
// ============================================================================

//! ## Overview
//! User-facing CLI strings live in [`CATALOG`] and are rendered through the
//! [`t!`](crate::t) macro. Missing keys render as the key itself so a typo
//! shows up in output instead of panicking.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::OnceLock;

// ============================================================================
// SECTION: Types
// ============================================================================

/// A formatted message argument captured by the [`macro@crate::t`] macro.
///
/// # Invariants
/// - `key` matches a placeholder name without braces (for example, `path`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageArg {
    /// Placeholder name.
    pub key: &'static str,
    /// Preformatted substitution value.
    pub value: String,
}

impl MessageArg {
    /// Constructs a new [`MessageArg`] from a key and displayable value.
    pub fn new(key: &'static str, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// English message catalog.
pub const CATALOG: &[(&str, &str)] = &[
    ("main.version", "trust-gate {version}"),
    ("config.load_failed", "Failed to load config: {error}"),
    ("config.validate.ok", "Config valid: {domains} domain(s), {origins} origin(s), store {store}."),
    ("store.open_failed", "Failed to open trust store: {error}"),
    ("store.read_failed", "Failed to read trust store: {error}"),
    ("audit.open_failed", "Failed to open audit sink: {error}"),
    ("serve.init_failed", "Failed to initialize authorizer: {error}"),
    ("serve.sync_init_failed", "Failed to initialize synchronizer: {error}"),
    ("serve.prewarm_failed", "Failed to preload signing keys for {domain}; they load on first use: {error}"),
    ("serve.listening", "Authorizer listening on {bind} (sync: {sync})."),
    ("serve.failed", "Authorizer server failed: {error}"),
    ("serve.signal_failed", "Failed to listen for shutdown signal: {error}"),
    ("serve.scheduler_failed", "Sync scheduler stopped abnormally: {error}"),
    ("sync.not_configured", "No [sync] section is configured."),
    ("sync.failed", "Sync failed ({code}): {error}"),
    ("secret.missing", "No edge secret has been committed yet; run `trust-gate sync once` first."),
    ("output.serialize_failed", "Failed to serialize output: {error}"),
    ("output.stream.stdout", "stdout"),
    ("output.stream.stderr", "stderr"),
    ("output.stream.unknown", "output"),
    ("output.write_failed", "Failed to write to {stream}: {error}"),
];

/// Returns the catalog as a lookup map.
pub(crate) fn catalog() -> &'static HashMap<&'static str, &'static str> {
    static CATALOG_MAP: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    CATALOG_MAP.get_or_init(|| CATALOG.iter().copied().collect())
}

// ============================================================================
// SECTION: Translation
// ============================================================================

/// Renders a catalog entry, substituting `{name}` placeholders in order.
#[must_use]
pub fn translate(key: &str, args: Vec<MessageArg>) -> String {
    let template = catalog().get(key).copied().unwrap_or(key);
    if args.is_empty() {
        return template.to_string();
    }

    let mut result = template.to_string();
    for arg in args {
        let placeholder = format!("{{{}}}", arg.key);
        result = result.replace(&placeholder, &arg.value);
    }
    result
}

// ============================================================================
// SECTION: Macro
// ============================================================================

/// Formats a catalog message from a key and named arguments.
///
/// # Arguments
///
/// - `$key` must match a catalog entry.
/// - Named arguments are substituted into `{placeholder}` positions.
#[macro_export]
macro_rules! t {
    ($key:literal $(, $name:ident = $value:expr )* $(,)?) => {{
        let args = ::std::vec![
            $(
                $crate::i18n::MessageArg::new(stringify!($name), $value.to_string()),
            )*
        ];
        $crate::i18n::translate($key, args)
    }};
}
