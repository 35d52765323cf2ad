//! Permission codes and the wildcard matching rules of the RBAC evaluator.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

fn code_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-z0-9_]+(:([a-z0-9_]+|\*)){1,3}$").expect("Invalid regex")
    })
}

/// Whether `code` is a well-formed permission code or grant:
/// lowercase ASCII segments joined by `:`, two to four segments, `*`
/// allowed only as a whole non-leading segment.
#[must_use]
pub fn is_valid_code(code: &str) -> bool {
    code_pattern().is_match(code)
}

/// Splits a code into `(resource, action)` where the action is the last
/// segment, e.g. `admin:users:read` becomes `("admin:users", "read")`.
#[must_use]
pub fn split_code(code: &str) -> (String, String) {
    code.rsplit_once(':').map_or_else(
        || (code.to_string(), String::new()),
        |(resource, action)| (resource.to_string(), action.to_string()),
    )
}

/// Returns true when the held `grant` authorizes `required`.
///
/// A grant matches by exact equality, or when it ends in `*`: trailing
/// `*` segments collapse into one wildcard that matches one or more
/// segments after the literal prefix. So `user:tokens:*` matches
/// `user:tokens:read`, and `admin:*` (or `admin:*:*`) matches anything
/// under `admin`. A `*` in any other position only matches literally.
#[must_use]
pub fn grant_matches(grant: &str, required: &str) -> bool {
    if grant == required {
        return true;
    }

    let segments: Vec<&str> = grant.split(':').collect();
    let literal_len = segments
        .iter()
        .rposition(|s| *s != "*")
        .map_or(0, |i| i + 1);

    if literal_len == segments.len() || literal_len == 0 {
        return false;
    }
    if segments[..literal_len].contains(&"*") {
        return false;
    }

    let required: Vec<&str> = required.split(':').collect();
    required.len() > literal_len && required[..literal_len] == segments[..literal_len]
}

/// Expanded set of grants held by one principal for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet {
    grants: BTreeSet<String>,
}

impl PermissionSet {
    #[must_use]
    pub fn new<I, S>(grants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            grants: grants.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn has(&self, required: &str) -> bool {
        self.grants.iter().any(|g| grant_matches(g, required))
    }

    /// Grants of `self` that `owner` still authorizes. This is how a PAT's
    /// minted permissions shrink with its owner's.
    #[must_use]
    pub fn intersect(&self, owner: &Self) -> Self {
        Self {
            grants: self
                .grants
                .iter()
                .filter(|g| owner.has(g))
                .cloned()
                .collect(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.grants.iter().map(String::as_str)
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<String> {
        self.grants.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(grant_matches("admin:users:read", "admin:users:read"));
        assert!(!grant_matches("admin:users:read", "admin:users:delete"));
    }

    #[test]
    fn test_scope_wildcard() {
        assert!(grant_matches("user:tokens:*", "user:tokens:read"));
        assert!(grant_matches("user:tokens:*", "user:tokens:read:own"));
        assert!(!grant_matches("user:tokens:*", "user:tokens"));
        assert!(!grant_matches("user:tokens:*", "user:profile:read"));
    }

    #[test]
    fn test_action_wildcard() {
        assert!(grant_matches("admin:*", "admin:roles:read"));
        assert!(grant_matches("admin:*:*", "admin:roles:read"));
        assert!(!grant_matches("admin:*", "user:profile:read"));
    }

    #[test]
    fn test_inner_wildcard_is_literal() {
        assert!(!grant_matches("admin:*:read", "admin:users:read"));
        assert!(grant_matches("admin:*:read", "admin:*:read"));
    }

    #[test]
    fn test_bare_star_grants_nothing() {
        assert!(!grant_matches("*", "admin:users:read"));
    }

    #[test]
    fn test_set_has_and_intersect() {
        let owner = PermissionSet::new(["user:profile:*", "user:tokens:read"]);
        assert!(owner.has("user:profile:read"));
        assert!(!owner.has("admin:users:read"));

        let pat = PermissionSet::new(["user:profile:read", "admin:users:read", "user:tokens:*"]);
        let effective = pat.intersect(&owner);
        assert_eq!(effective.to_vec(), vec!["user:profile:read".to_string()]);
    }

    #[test]
    fn test_empty_set_denies() {
        assert!(!PermissionSet::default().has("user:profile:read"));
    }

    #[test]
    fn test_code_validation() {
        assert!(is_valid_code("admin:users:read"));
        assert!(is_valid_code("user:2fa:manage"));
        assert!(is_valid_code("admin:*"));
        assert!(!is_valid_code("Admin:users"));
        assert!(!is_valid_code("admin"));
        assert!(!is_valid_code("*:users"));
        assert!(!is_valid_code("admin::read"));
    }

    #[test]
    fn test_split_code() {
        assert_eq!(
            split_code("admin:users:read"),
            ("admin:users".to_string(), "read".to_string())
        );
    }
}
