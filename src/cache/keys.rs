//! Query key definitions.
//!
//! A `QueryKey` is a namespace tag followed by zero or more parameter values. A `KeyPattern`
//! selects keys for invalidation: either one exact key or every key under a namespace.

use std::fmt;

/// Namespace tag: the first element of every query key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
    /// Admin user listing, parameterised by search term and limit.
    Users,
    /// Ban view derived from the user listing.
    Bans,
    /// Notification inbox.
    Notifications,
    /// Unread badge counter.
    NotificationUnreadCount,
    /// Aggregate counters (total, unread, per type).
    NotificationCounts,
    /// Delivery preferences.
    NotificationPreferences,
}

impl Namespace {
    pub const ALL: [Namespace; 6] = [
        Namespace::Users,
        Namespace::Bans,
        Namespace::Notifications,
        Namespace::NotificationUnreadCount,
        Namespace::NotificationCounts,
        Namespace::NotificationPreferences,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::Users => "users",
            Namespace::Bans => "bans",
            Namespace::Notifications => "notifications",
            Namespace::NotificationUnreadCount => "notification-unread-count",
            Namespace::NotificationCounts => "notification-counts",
            Namespace::NotificationPreferences => "notification-preferences",
        }
    }

    pub fn parse(tag: &str) -> Option<Namespace> {
        Namespace::ALL.into_iter().find(|ns| ns.as_str() == tag)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of one cacheable read.
///
/// Two keys are equal iff their namespace and parameter sequences are element-wise equal.
/// Fields are private so a key cannot change after construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
    namespace: Namespace,
    params: Vec<String>,
}

impl QueryKey {
    pub fn new(namespace: Namespace) -> Self {
        Self {
            namespace,
            params: Vec::new(),
        }
    }

    /// Append one parameter value, consuming the builder.
    pub fn with_param(mut self, value: impl Into<String>) -> Self {
        self.params.push(value.into());
        self
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    // Well-known keys

    /// User search: `[users, <search>, <limit>]`. An absent search is an empty string.
    pub fn user_search(search: Option<&str>, limit: u32) -> Self {
        Self::new(Namespace::Users)
            .with_param(search.unwrap_or_default())
            .with_param(limit.to_string())
    }

    pub fn bans() -> Self {
        Self::new(Namespace::Bans)
    }

    pub fn notifications() -> Self {
        Self::new(Namespace::Notifications)
    }

    pub fn notification_unread_count() -> Self {
        Self::new(Namespace::NotificationUnreadCount)
    }

    pub fn notification_counts() -> Self {
        Self::new(Namespace::NotificationCounts)
    }

    pub fn notification_preferences() -> Self {
        Self::new(Namespace::NotificationPreferences)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}", self.namespace)?;
        for param in &self.params {
            write!(f, ", {param:?}")?;
        }
        f.write_str("]")
    }
}

/// Selector used by invalidation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyPattern {
    /// Every key whose first element is the namespace, regardless of parameters.
    Namespace(Namespace),
    /// Exactly one key.
    Exact(QueryKey),
}

impl KeyPattern {
    pub fn matches(&self, key: &QueryKey) -> bool {
        match self {
            KeyPattern::Namespace(namespace) => key.namespace() == *namespace,
            KeyPattern::Exact(exact) => exact == key,
        }
    }

    pub fn namespace(&self) -> Namespace {
        match self {
            KeyPattern::Namespace(namespace) => *namespace,
            KeyPattern::Exact(key) => key.namespace(),
        }
    }
}

impl From<Namespace> for KeyPattern {
    fn from(namespace: Namespace) -> Self {
        KeyPattern::Namespace(namespace)
    }
}

/// A parameterless key used as a pattern means "the whole namespace".
impl From<QueryKey> for KeyPattern {
    fn from(key: QueryKey) -> Self {
        if key.params.is_empty() {
            KeyPattern::Namespace(key.namespace)
        } else {
            KeyPattern::Exact(key)
        }
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPattern::Namespace(namespace) => write!(f, "{namespace}/*"),
            KeyPattern::Exact(key) => write!(f, "{key}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_compare_element_wise() {
        let a = QueryKey::user_search(Some("ann"), 20);
        let b = QueryKey::user_search(Some("ann"), 20);
        let c = QueryKey::user_search(Some("ann"), 50);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(QueryKey::bans(), QueryKey::notifications());
    }

    #[test]
    fn namespace_pattern_ignores_parameters() {
        let pattern = KeyPattern::from(Namespace::Users);

        assert!(pattern.matches(&QueryKey::user_search(None, 20)));
        assert!(pattern.matches(&QueryKey::user_search(Some("bob"), 5)));
        assert!(pattern.matches(&QueryKey::new(Namespace::Users)));
        assert!(!pattern.matches(&QueryKey::bans()));
    }

    #[test]
    fn exact_pattern_requires_full_match() {
        let pattern = KeyPattern::Exact(QueryKey::user_search(Some("bob"), 5));

        assert!(pattern.matches(&QueryKey::user_search(Some("bob"), 5)));
        assert!(!pattern.matches(&QueryKey::user_search(Some("bob"), 6)));
        assert!(!pattern.matches(&QueryKey::new(Namespace::Users)));
    }

    #[test]
    fn parameterless_key_converts_to_namespace_pattern() {
        assert_eq!(
            KeyPattern::from(QueryKey::notifications()),
            KeyPattern::Namespace(Namespace::Notifications)
        );
        assert!(matches!(
            KeyPattern::from(QueryKey::user_search(None, 1)),
            KeyPattern::Exact(_)
        ));
    }

    #[test]
    fn namespace_tags_round_trip() {
        for namespace in Namespace::ALL {
            assert_eq!(Namespace::parse(namespace.as_str()), Some(namespace));
        }
        assert_eq!(Namespace::parse("posts"), None);
    }

    #[test]
    fn display_is_readable() {
        let key = QueryKey::user_search(Some("ann"), 20);
        assert_eq!(key.to_string(), r#"[users, "ann", "20"]"#);
        assert_eq!(
            KeyPattern::from(Namespace::NotificationCounts).to_string(),
            "notification-counts/*"
        );
    }
}
