//! Restriction sets: the apps, categories and web domains targeted by a block.
//!
//! App and category tokens are opaque handles issued by the OS picker; the
//! engine never inspects them beyond equality. Domains are user-entered and
//! normalized on insertion so that `https://www.Example.com/feed` and
//! `example.com` name the same site.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Opaque handle for a single application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppToken(pub String);

/// Opaque handle for an application category.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryToken(pub String);

impl From<&str> for AppToken {
    fn from(value: &str) -> Self {
        AppToken(value.to_string())
    }
}

impl From<&str> for CategoryToken {
    fn from(value: &str) -> Self {
        CategoryToken(value.to_string())
    }
}

impl fmt::Display for AppToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for CategoryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The three independently applied parts of a restriction set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacetKind {
    Apps,
    Categories,
    Domains,
}

impl FacetKind {
    pub const ALL: [FacetKind; 3] = [FacetKind::Apps, FacetKind::Categories, FacetKind::Domains];
}

impl fmt::Display for FacetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FacetKind::Apps => write!(f, "apps"),
            FacetKind::Categories => write!(f, "categories"),
            FacetKind::Domains => write!(f, "domains"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RestrictionSet {
    #[serde(default)]
    pub apps: BTreeSet<AppToken>,
    #[serde(default)]
    pub categories: BTreeSet<CategoryToken>,
    #[serde(default)]
    pub domains: BTreeSet<String>,
}

impl RestrictionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_apps<I, S>(mut self, apps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.apps.extend(apps.into_iter().map(|a| AppToken(a.into())));
        self
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories
            .extend(categories.into_iter().map(|c| CategoryToken(c.into())));
        self
    }

    /// Add domains, normalizing each and skipping entries that are not
    /// recognizable host names.
    pub fn with_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for domain in domains {
            self.insert_domain(domain.as_ref());
        }
        self
    }

    /// Returns false when the input does not normalize to a host name.
    pub fn insert_domain(&mut self, raw: &str) -> bool {
        match normalize_domain(raw) {
            Some(domain) => {
                self.domains.insert(domain);
                true
            }
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty() && self.categories.is_empty() && self.domains.is_empty()
    }

    pub fn len(&self) -> usize {
        self.apps.len() + self.categories.len() + self.domains.len()
    }

    pub fn contains_app(&self, token: &str) -> bool {
        self.apps.iter().any(|a| a.0 == token)
    }

    pub fn contains_category(&self, token: &str) -> bool {
        self.categories.iter().any(|c| c.0 == token)
    }

    pub fn contains_domain(&self, domain: &str) -> bool {
        normalize_domain(domain)
            .map(|d| self.domains.contains(&d))
            .unwrap_or(false)
    }

    /// Add every token and domain of `other` to this set.
    pub fn union_with(&mut self, other: &RestrictionSet) {
        self.apps.extend(other.apps.iter().cloned());
        self.categories.extend(other.categories.iter().cloned());
        self.domains.extend(other.domains.iter().cloned());
    }

    pub fn union<'a, I>(sets: I) -> RestrictionSet
    where
        I: IntoIterator<Item = &'a RestrictionSet>,
    {
        let mut merged = RestrictionSet::new();
        for set in sets {
            merged.union_with(set);
        }
        merged
    }

    /// The part of this set covered by one facet.
    pub fn facet(&self, kind: FacetKind) -> RestrictionSet {
        let mut part = RestrictionSet::new();
        match kind {
            FacetKind::Apps => part.apps = self.apps.clone(),
            FacetKind::Categories => part.categories = self.categories.clone(),
            FacetKind::Domains => part.domains = self.domains.clone(),
        }
        part
    }

    /// Keep only the listed facets.
    pub fn restricted_to(&self, kinds: &[FacetKind]) -> RestrictionSet {
        let parts: Vec<RestrictionSet> = kinds.iter().map(|k| self.facet(*k)).collect();
        RestrictionSet::union(&parts)
    }

    /// Replace one facet with the same facet of `from`.
    pub fn replace_facet(&mut self, kind: FacetKind, from: &RestrictionSet) {
        match kind {
            FacetKind::Apps => self.apps = from.apps.clone(),
            FacetKind::Categories => self.categories = from.categories.clone(),
            FacetKind::Domains => self.domains = from.domains.clone(),
        }
    }
}

impl fmt::Display for RestrictionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} apps, {} categories, {} domains",
            self.apps.len(),
            self.categories.len(),
            self.domains.len()
        )
    }
}

/// Normalize a user-entered website to a bare lower-case host.
///
/// Strips scheme, credentials, port, path, query and a leading `www.`.
pub fn normalize_domain(raw: &str) -> Option<String> {
    let mut rest = raw.trim();
    if let Some((_, after)) = rest.split_once("://") {
        rest = after;
    }
    let host_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let mut host = &rest[..host_end];
    if let Some((_, after)) = host.rsplit_once('@') {
        host = after;
    }
    if let Some((name, port)) = host.rsplit_once(':') {
        if port.chars().all(|c| c.is_ascii_digit()) {
            host = name;
        }
    }
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();

    let valid = !host.is_empty()
        && host.contains('.')
        && host
            .split('.')
            .all(|label| !label.is_empty() && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'));
    valid.then_some(host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn normalizes_user_entered_domains() {
        assert_eq!(normalize_domain("https://www.Reddit.com/r/rust"), Some("reddit.com".into()));
        assert_eq!(normalize_domain("  youtube.com:443 "), Some("youtube.com".into()));
        assert_eq!(normalize_domain("news.ycombinator.com/"), Some("news.ycombinator.com".into()));
        assert_eq!(normalize_domain("localhost"), None);
        assert_eq!(normalize_domain("not a domain.com"), None);
        assert_eq!(normalize_domain(""), None);
    }

    #[test]
    fn with_domains_deduplicates_after_normalization() {
        let set = RestrictionSet::new().with_domains(["x.com", "https://www.x.com", "bogus"]);
        assert_eq!(set.domains.len(), 1);
        assert!(set.contains_domain("WWW.X.COM"));
    }

    #[test]
    fn restricted_to_keeps_only_listed_facets() {
        let set = RestrictionSet::new()
            .with_apps(["app.one"])
            .with_categories(["social"])
            .with_domains(["x.com"]);
        let partial = set.restricted_to(&[FacetKind::Apps, FacetKind::Categories]);
        assert!(partial.contains_app("app.one"));
        assert!(partial.contains_category("social"));
        assert!(partial.domains.is_empty());
    }

    fn arb_set() -> impl Strategy<Value = RestrictionSet> {
        (
            prop::collection::vec("[a-e]", 0..4),
            prop::collection::vec("[f-h]", 0..3),
            prop::collection::vec("[a-c]\\.com", 0..3),
        )
            .prop_map(|(apps, cats, domains)| {
                RestrictionSet::new()
                    .with_apps(apps)
                    .with_categories(cats)
                    .with_domains(domains)
            })
    }

    proptest! {
        #[test]
        fn union_contains_both_operands(a in arb_set(), b in arb_set()) {
            let merged = RestrictionSet::union([&a, &b]);
            for app in a.apps.iter().chain(b.apps.iter()) {
                prop_assert!(merged.apps.contains(app));
            }
            for domain in a.domains.iter().chain(b.domains.iter()) {
                prop_assert!(merged.domains.contains(domain));
            }
            prop_assert!(merged.len() <= a.len() + b.len());
        }

        #[test]
        fn union_is_idempotent(a in arb_set()) {
            prop_assert_eq!(RestrictionSet::union([&a, &a]), a);
        }
    }
}
