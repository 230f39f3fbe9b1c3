//! Scope string helpers.

use std::collections::BTreeSet;

pub const OPENID: &str = "openid";
pub const PROFILE: &str = "profile";
pub const EMAIL: &str = "email";
pub const OFFLINE_ACCESS: &str = "offline_access";

/// Parse a space-delimited scope parameter
pub fn parse_scope(value: &str) -> BTreeSet<String> {
    value.split_whitespace().map(str::to_string).collect()
}

/// Space-delimited rendering, sorted
pub fn join_scope(scopes: &BTreeSet<String>) -> String {
    scopes.iter().map(String::as_str).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_join() {
        let scopes = parse_scope("  profile openid   openid ");
        assert_eq!(scopes.len(), 2);
        assert_eq!(join_scope(&scopes), "openid profile");
        assert!(parse_scope("").is_empty());
    }
}
