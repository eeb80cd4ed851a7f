//! Key naming helpers shared by the adapter and the provisioning layer.
//!
//! Outgoing body keys are sent in lower camel case (`messaging_url` becomes
//! `messagingUrl`) so callers may use either spelling. Only top-level keys
//! are rewritten; nested objects are forwarded as given.

use std::iter::Peekable;
use std::str::Chars;

use crate::types::Params;

/// Convert a snake_case or camelCase key to lower camel case.
///
/// The first character is lower-cased. Each `_` is dropped and the
/// alphanumeric run that follows it is capitalized (`first_NAME` becomes
/// `firstName`). Anything else is copied through.
pub fn camelize_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut chars = key.chars().peekable();

    match chars.next() {
        Some('_') => capitalize_run(&mut chars, &mut out),
        Some(first) => out.extend(first.to_lowercase()),
        None => return out,
    }

    while let Some(c) = chars.next() {
        if c == '_' {
            capitalize_run(&mut chars, &mut out);
        } else {
            out.push(c);
        }
    }
    out
}

fn capitalize_run(chars: &mut Peekable<Chars<'_>>, out: &mut String) {
    let mut first = true;
    while let Some(&c) = chars.peek() {
        if !c.is_ascii_alphanumeric() {
            break;
        }
        chars.next();
        if first {
            out.push(c.to_ascii_uppercase());
            first = false;
        } else {
            out.push(c.to_ascii_lowercase());
        }
    }
}

/// Camel-case every top-level key of `params`.
///
/// If two keys collapse to the same name the one visited last wins.
pub fn camelize_keys(params: Params) -> Params {
    params
        .into_iter()
        .map(|(k, v)| (camelize_key(&k), v))
        .collect()
}

/// Last `/`-separated segment of `href`, ignoring trailing slashes.
///
/// The API identifies created entities only by their href, so ids are
/// derived from it: `http://host/v1/applications/108000` gives `108000`.
pub fn last_path_segment(href: &str) -> &str {
    href.trim_end_matches('/').rsplit('/').next().unwrap_or_default()
}
