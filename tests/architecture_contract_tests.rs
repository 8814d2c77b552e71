//! Architecture contract tests.

mod support;

use support::architecture::{find_lines_containing, find_lines_containing_except_files};

#[test]
fn domain_has_no_framework_or_outer_layer_imports() {
    let hits = find_lines_containing(
        "src/domain",
        &[
            "crate::adapter",
            "crate::infrastructure",
            "crate::application",
            "crate::port",
            "tokio::",
            "reqwest::",
            "tracing::",
        ],
    );

    assert!(hits.is_empty(), "found forbidden imports in domain layer: {hits:#?}");
}

#[test]
fn ports_do_not_depend_on_implementations() {
    let hits = find_lines_containing(
        "src/port",
        &["crate::adapter", "crate::application", "crate::infrastructure"],
    );

    assert!(hits.is_empty(), "found outer-layer imports in ports: {hits:#?}");
}

#[test]
fn only_the_factory_names_venue_adapters() {
    let hits = find_lines_containing_except_files(
        "src/application",
        &["outbound::binance", "outbound::coinbase", "outbound::kraken"],
        &["src/application/factory.rs"],
    );

    assert!(hits.is_empty(), "found concrete adapter imports in application layer: {hits:#?}");
}

#[test]
fn venue_adapters_are_independent() {
    for (venue, others) in [
        ("binance", ["outbound::coinbase", "outbound::kraken"]),
        ("coinbase", ["outbound::binance", "outbound::kraken"]),
        ("kraken", ["outbound::binance", "outbound::coinbase"]),
    ] {
        let hits = find_lines_containing(&format!("src/adapter/outbound/{venue}"), &others);
        assert!(hits.is_empty(), "{venue} adapter imports another venue: {hits:#?}");
    }
}

#[test]
fn cli_goes_through_the_application_layer() {
    let hits = find_lines_containing(
        "src/adapter/inbound/cli",
        &["crate::infrastructure", "crate::adapter::outbound"],
    );

    assert!(hits.is_empty(), "found direct adapter or infrastructure imports in CLI: {hits:#?}");
}

#[test]
fn credentials_are_never_logged_as_fields() {
    let hits = find_lines_containing(
        "src",
        &[
            "api_key = %",
            "api_key = ?",
            "api_secret = ",
            "secret = %",
            "secret = ?",
            "passphrase = %",
            "passphrase = ?",
            "credentials = %",
            "credentials = ?",
        ],
    );

    assert!(hits.is_empty(), "found credential fields in log statements: {hits:#?}");
}
