//! Contract identity derivation

use regex::Regex;
use std::sync::OnceLock;

use crate::error::DeclarationProblem;

/// Identities that collide with the runtime's own call surface
pub const RESERVED_IDENTITIES: &[&str] = &[
    "run",
    "run-sync",
    "invoke",
    "bind",
    "trigger",
    "call",
    "customize",
    "with-metadata",
    "with-cache",
    "inputs",
    "outcomes",
    "exits",
    "identity",
    "configure",
    "exec",
    "exec-sync",
];

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z][a-z0-9]*(-[a-z0-9]+)*$").expect("identifier pattern compiles")
    })
}

/// Whether `identity` is a lowercase, dash-separated identifier
pub fn is_kebab_identifier(identity: &str) -> bool {
    identifier_pattern().is_match(identity)
}

pub fn is_reserved(identity: &str) -> bool {
    RESERVED_IDENTITIES.contains(&identity)
}

/// Convert `friendlyName`, `friendly_name` or `Friendly Name` to `friendly-name`
pub fn kebab_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev: Option<char> = None;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if c.is_ascii_uppercase() {
                let boundary = matches!(prev, Some(p) if p.is_ascii_lowercase() || p.is_ascii_digit());
                if boundary && !out.ends_with('-') {
                    out.push('-');
                }
                out.push(c.to_ascii_lowercase());
            } else {
                out.push(c);
            }
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
        prev = Some(c);
    }

    out.trim_end_matches('-').to_string()
}

/// Pick and check the identity of a contract
///
/// An explicit identity is used as given; otherwise the friendly name, then
/// the implementation's name, is kebab-cased.
pub fn derive_identity(
    explicit: Option<&str>,
    friendly_name: Option<&str>,
    implementation_name: Option<&str>,
) -> Result<String, DeclarationProblem> {
    let identity = match (explicit, friendly_name, implementation_name) {
        (Some(identity), _, _) => identity.to_string(),
        (None, Some(name), _) | (None, None, Some(name)) => kebab_case(name),
        (None, None, None) => {
            return Err(DeclarationProblem::new(
                "identity",
                "no identity, friendly name or implementation name to derive one from",
            ))
        }
    };

    if !is_kebab_identifier(&identity) {
        return Err(DeclarationProblem::new(
            "identity",
            format!("`{}` is not a valid kebab-case identifier", identity),
        ));
    }
    if is_reserved(&identity) {
        return Err(DeclarationProblem::new(
            "identity",
            format!("`{}` is reserved", identity),
        ));
    }
    Ok(identity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kebab_case() {
        assert_eq!(kebab_case("addNumbers"), "add-numbers");
        assert_eq!(kebab_case("fetch_user_v2"), "fetch-user-v2");
        assert_eq!(kebab_case("Send Email!"), "send-email");
        assert_eq!(kebab_case("HTTPGet"), "httpget");
    }

    #[test]
    fn test_identity_priority() {
        assert_eq!(
            derive_identity(Some("explicit"), Some("Friendly"), Some("impl")).unwrap(),
            "explicit"
        );
        assert_eq!(
            derive_identity(None, Some("Look Up User"), Some("impl")).unwrap(),
            "look-up-user"
        );
        assert_eq!(derive_identity(None, None, Some("addNumbers")).unwrap(), "add-numbers");
        assert!(derive_identity(None, None, None).is_err());
    }

    #[test]
    fn test_identity_rejections() {
        let reserved = derive_identity(None, Some("runSync"), None).unwrap_err();
        assert!(reserved.message.contains("reserved"));

        let invalid = derive_identity(Some("Not Kebab"), None, None).unwrap_err();
        assert_eq!(invalid.path, "identity");
        assert!(derive_identity(Some("9lives"), None, None).is_err());
    }
}
