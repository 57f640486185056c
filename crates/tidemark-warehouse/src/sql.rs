//! Identifier and literal quoting shared by SQL builders.

use pg_escape::{quote_identifier, quote_literal as pg_quote_literal};

/// Quote a possibly schema-qualified table name part by part.
///
/// Parts that are plain lowercase identifiers are left bare, so
/// `analytics.users` stays as-is while `time` becomes `"time"`.
#[must_use]
pub fn quote_qualified(name: &str) -> String {
    name.split('.')
        .map(|part| quote_identifier(part).to_string())
        .collect::<Vec<_>>()
        .join(".")
}

/// Quote a string literal, doubling embedded single quotes.
#[must_use]
pub fn quote_literal(value: &str) -> String {
    pg_quote_literal(value).to_string()
}
