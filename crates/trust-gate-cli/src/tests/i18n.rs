// crates/trust-gate-cli/src/tests/i18n.rs
// ============================================================================
// Module: CLI Catalog Tests
// Description: Unit tests for catalog integrity and placeholder substitution.
// Purpose: Catch duplicate keys and unbalanced placeholders before release.
// Dependencies: trust-gate-cli i18n module
// ============================================================================

use std::collections::BTreeSet;

use crate::i18n::CATALOG;
use crate::i18n::MessageArg;
use crate::i18n::catalog;
use crate::i18n::translate;

#[test]
fn catalog_keys_are_unique() {
    let keys: BTreeSet<&str> = CATALOG.iter().map(|(key, _)| *key).collect();
    assert_eq!(keys.len(), CATALOG.len());
    assert_eq!(catalog().len(), CATALOG.len());
}

#[test]
fn catalog_placeholders_are_balanced() {
    for (key, template) in CATALOG {
        let opens = template.matches('{').count();
        let closes = template.matches('}').count();
        assert_eq!(opens, closes, "unbalanced placeholder in {key}");
    }
}

#[test]
fn translate_substitutes_named_arguments() {
    let message = translate(
        "config.validate.ok",
        vec![MessageArg::new("domains", "2"), MessageArg::new("origins", "3"), MessageArg::new("store", "sqlite")],
    );
    assert_eq!(message, "Config valid: 2 domain(s), 3 origin(s), store sqlite.");
}

#[test]
fn macro_renders_display_values() {
    let message = crate::t!("sync.failed", code = "timeout", error = 42);
    assert_eq!(message, "Sync failed (timeout): 42");
}

#[test]
fn unknown_key_renders_as_key() {
    assert_eq!(translate("no.such.key", Vec::new()), "no.such.key");
}
