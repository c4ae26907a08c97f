//! Hierarchical cache keys for every queryable chart resource.
//!
//! A key is a root namespace, a resource-kind segment and zero or more
//! parameter segments. Identical resources always produce identical keys;
//! that is the only way the cache deduplicates reads and targets
//! invalidations.

use std::fmt;

/// Root namespace for the chart entity family
pub const CHARTS: &str = "charts";

const MY: &str = "my";
const EDITED: &str = "edited";
const PUBLISHED: &str = "published";
const EDITORS: &str = "editors";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeySegment {
    Name(String),
    /// A set of ids, stored sorted and deduplicated.
    Set(Vec<String>),
}

impl KeySegment {
    pub fn set<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut items: Vec<String> = items.into_iter().map(Into::into).collect();
        items.sort();
        items.dedup();
        KeySegment::Set(items)
    }
}

impl From<&str> for KeySegment {
    fn from(s: &str) -> Self {
        KeySegment::Name(s.to_string())
    }
}

impl From<String> for KeySegment {
    fn from(s: String) -> Self {
        KeySegment::Name(s)
    }
}

impl fmt::Display for KeySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySegment::Name(name) => write!(f, "{}", name),
            KeySegment::Set(items) => write!(f, "[{}]", items.join(",")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(Vec<KeySegment>);

impl QueryKey {
    pub fn new<I>(segments: I) -> Self
    where
        I: IntoIterator<Item = KeySegment>,
    {
        Self(segments.into_iter().collect())
    }

    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }

    fn child(&self, segment: impl Into<KeySegment>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join("/"))
    }
}

/// Selects cache entries for invalidation or removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyFilter {
    Exact(QueryKey),
    /// Every entry whose key begins with these segments.
    Prefix(QueryKey),
}

impl KeyFilter {
    pub fn matches(&self, key: &QueryKey) -> bool {
        match self {
            KeyFilter::Exact(k) => k == key,
            KeyFilter::Prefix(prefix) => key.starts_with(prefix),
        }
    }
}

impl fmt::Display for KeyFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyFilter::Exact(k) => write!(f, "{}", k),
            KeyFilter::Prefix(k) => write!(f, "{}/*", k),
        }
    }
}

/// Key constructors for chart resources.
pub mod chart_keys {
    use super::*;

    pub fn all() -> QueryKey {
        QueryKey::new([KeySegment::from(CHARTS)])
    }

    pub fn my_chart() -> QueryKey {
        all().child(MY)
    }

    pub fn edited_charts() -> QueryKey {
        all().child(EDITED)
    }

    pub fn published_charts() -> QueryKey {
        all().child(PUBLISHED)
    }

    /// Prefix shared by every editor-list variant of one chart.
    pub fn editors_of(chart_id: &str) -> QueryKey {
        all().child(EDITORS).child(chart_id)
    }

    pub fn editors(chart_id: &str, editor_ids: &[String]) -> QueryKey {
        editors_of(chart_id).child(KeySegment::set(editor_ids.iter().cloned()))
    }
}
