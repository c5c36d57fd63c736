use depot_schema::{Repository, RepositoryKey, RoutingRule, RoutingRuleType};
use glob::{MatchOptions, Pattern};
use std::collections::HashSet;
use tracing::warn;

/// Member reference matching every member of a group.
const ANY_MEMBER: &str = "*";

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

fn rule_matches(rule: &RoutingRule, path: &str) -> bool {
    match Pattern::new(&rule.pattern) {
        Ok(pattern) => pattern.matches_with(path.trim_start_matches('/'), MATCH_OPTIONS),
        Err(e) => {
            warn!(pattern = %rule.pattern, error = %e, "Ignoring invalid routing pattern");
            false
        }
    }
}

/// Members named by the routing rules of one group for one path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberFilter {
    denied: HashSet<RepositoryKey>,
    deny_all: bool,
    accepted: Option<HashSet<RepositoryKey>>,
    accept_all: bool,
}

impl MemberFilter {
    /// Evaluate `group`'s rules against `path`.
    pub fn for_path(group: &Repository, path: &str) -> Self {
        let mut filter = Self::default();
        for rule in group.routing_rules.iter().filter(|r| rule_matches(r, path)) {
            let any = rule.repositories.iter().any(|r| r == ANY_MEMBER);
            let named = rule
                .repositories
                .iter()
                .filter(|r| *r != ANY_MEMBER)
                .map(|r| RepositoryKey::parse(r, &group.storage_id));
            match rule.rule_type {
                RoutingRuleType::Deny => {
                    filter.deny_all |= any;
                    filter.denied.extend(named);
                }
                RoutingRuleType::Accept => {
                    filter.accept_all |= any;
                    filter.accepted.get_or_insert_with(HashSet::new).extend(named);
                }
            }
        }
        filter
    }

    /// Returns true if `member` may answer the path.
    ///
    /// A matching deny always wins. When any accept rule matched, only the
    /// members it names are eligible.
    pub fn allows(&self, member: &RepositoryKey) -> bool {
        if self.deny_all || self.denied.contains(member) {
            return false;
        }
        match &self.accepted {
            Some(accepted) => self.accept_all || accepted.contains(member),
            None => true,
        }
    }
}

/// State carried down nested group resolution: the groups already entered
/// (to break cycles) and the members denied by any enclosing group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionScope {
    visited: HashSet<RepositoryKey>,
    denied: HashSet<RepositoryKey>,
    deny_all: bool,
}

impl ResolutionScope {
    /// Scope for the members of `group`.
    pub fn enter(&self, group: &RepositoryKey, filter: &MemberFilter) -> Self {
        let mut scope = self.clone();
        scope.visited.insert(group.clone());
        scope.denied.extend(filter.denied.iter().cloned());
        scope.deny_all |= filter.deny_all;
        scope
    }

    /// Returns true if `key` is a group already being resolved.
    pub fn is_visited(&self, key: &RepositoryKey) -> bool {
        self.visited.contains(key)
    }

    /// Returns true if an enclosing group denied `key` for this path.
    pub fn is_denied(&self, key: &RepositoryKey) -> bool {
        self.deny_all || self.denied.contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_schema::RepositoryType;

    fn rule(pattern: &str, repositories: &[&str], rule_type: RoutingRuleType) -> RoutingRule {
        RoutingRule {
            pattern: pattern.into(),
            repositories: repositories.iter().map(|r| (*r).to_string()).collect(),
            rule_type,
        }
    }

    fn group(rules: Vec<RoutingRule>) -> Repository {
        let mut group = Repository::new("s", "public", RepositoryType::Group);
        group.routing_rules = rules;
        group
    }

    fn key(id: &str) -> RepositoryKey {
        RepositoryKey::new("s", id)
    }

    #[test]
    fn deny_matches_subtree_only() {
        let group = group(vec![rule("com/blocked/**", &["m1"], RoutingRuleType::Deny)]);
        let blocked = MemberFilter::for_path(&group, "com/blocked/x/1.0/x-1.0.jar");
        assert!(!blocked.allows(&key("m1")));
        assert!(blocked.allows(&key("m2")));

        let open = MemberFilter::for_path(&group, "com/open/x/1.0/x-1.0.jar");
        assert!(open.allows(&key("m1")));
    }

    #[test]
    fn accept_restricts_to_named_members() {
        let group = group(vec![rule("org/internal/**", &["s:m2"], RoutingRuleType::Accept)]);
        let filter = MemberFilter::for_path(&group, "org/internal/lib/1.0/lib-1.0.pom");
        assert!(!filter.allows(&key("m1")));
        assert!(filter.allows(&key("m2")));
        assert!(MemberFilter::for_path(&group, "org/public/a").allows(&key("m1")));
    }

    #[test]
    fn deny_beats_accept_and_wildcards() {
        let group = group(vec![
            rule("**", &["*"], RoutingRuleType::Accept),
            rule("**/*.jar", &["m1"], RoutingRuleType::Deny),
        ]);
        let filter = MemberFilter::for_path(&group, "a/b/c.jar");
        assert!(!filter.allows(&key("m1")));
        assert!(filter.allows(&key("m2")));

        let all = self::group(vec![rule("secret/**", &["*"], RoutingRuleType::Deny)]);
        assert!(!MemberFilter::for_path(&all, "secret/x").allows(&key("m2")));
    }

    #[test]
    fn scope_accumulates_denials() {
        let outer = group(vec![rule("com/**", &["m1"], RoutingRuleType::Deny)]);
        let filter = MemberFilter::for_path(&outer, "com/x");
        let scope = ResolutionScope::default().enter(&key("public"), &filter);
        assert!(scope.is_visited(&key("public")));
        assert!(scope.is_denied(&key("m1")));
        assert!(!scope.is_denied(&key("m2")));
    }

    #[test]
    fn scope_carries_wildcard_denial() {
        let outer = group(vec![rule("secret/**", &["*"], RoutingRuleType::Deny)]);
        let scope = ResolutionScope::default()
            .enter(&key("public"), &MemberFilter::for_path(&outer, "secret/x"));
        assert!(scope.is_denied(&key("m1")));

        let inner = group(vec![]);
        let nested = scope.enter(&key("inner"), &MemberFilter::for_path(&inner, "secret/x"));
        assert!(nested.is_denied(&key("m2")));

        let open = ResolutionScope::default()
            .enter(&key("public"), &MemberFilter::for_path(&outer, "open/x"));
        assert!(!open.is_denied(&key("m1")));
    }
}
