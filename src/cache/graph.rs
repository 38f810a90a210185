//! Invalidation graph.
//!
//! Static mapping from each mutation kind to the query-key patterns it makes stale. The mapping
//! is built and checked once per engine; every call site reads it through `lookup`.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::domain::mutation::MutationKind;

use super::keys::{KeyPattern, Namespace};

/// Wiring mistakes detected when the engine is assembled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("mutation `{0}` has no invalidation declaration")]
    UnmappedMutation(MutationKind),
    #[error("mutation `{0}` is declared more than once")]
    DuplicateDeclaration(MutationKind),
    #[error("no fetcher registered for namespace `{0}`")]
    MissingFetcher(Namespace),
    #[error("cascade `{cascade}` step {step} expects `{expected}` but built `{actual}`")]
    StepKindMismatch {
        cascade: String,
        step: usize,
        expected: MutationKind,
        actual: MutationKind,
    },
}

#[derive(Debug, Clone, Default)]
pub struct InvalidationGraph {
    edges: BTreeMap<MutationKind, Vec<KeyPattern>>,
}

impl InvalidationGraph {
    pub fn builder() -> InvalidationGraphBuilder {
        InvalidationGraphBuilder::default()
    }

    /// The declarations used by the admin and notification surfaces.
    pub fn standard() -> Result<Self, ConfigurationError> {
        let notification_views = [
            KeyPattern::from(Namespace::Notifications),
            KeyPattern::from(Namespace::NotificationUnreadCount),
            KeyPattern::from(Namespace::NotificationCounts),
        ];

        Self::builder()
            .declare(
                MutationKind::BanUser,
                [Namespace::Users.into(), Namespace::Bans.into()],
            )
            .declare(
                MutationKind::UnbanUser,
                [Namespace::Users.into(), Namespace::Bans.into()],
            )
            // Only ever runs as a cascade step after a ban, which already covers the user views.
            .declare(MutationKind::DeleteUserMessages, [])
            .declare(MutationKind::UpdateUserRole, [Namespace::Users.into()])
            .declare(
                MutationKind::MarkNotificationRead,
                notification_views.clone(),
            )
            .declare(MutationKind::MarkAllRead, notification_views.clone())
            .declare(MutationKind::DeleteNotification, notification_views.clone())
            .declare(MutationKind::DeleteAllNotifications, notification_views)
            .declare(
                MutationKind::UpdateNotificationPreferences,
                [Namespace::NotificationPreferences.into()],
            )
            .build()
    }

    /// Patterns invalidated by `kind`. An empty slice is a valid declaration.
    pub fn lookup(&self, kind: MutationKind) -> Result<&[KeyPattern], ConfigurationError> {
        self.edges
            .get(&kind)
            .map(Vec::as_slice)
            .ok_or(ConfigurationError::UnmappedMutation(kind))
    }

    pub fn declared_kinds(&self) -> impl Iterator<Item = MutationKind> + '_ {
        self.edges.keys().copied()
    }
}

#[derive(Debug, Default)]
pub struct InvalidationGraphBuilder {
    edges: BTreeMap<MutationKind, Vec<KeyPattern>>,
    duplicate: Option<MutationKind>,
}

impl InvalidationGraphBuilder {
    pub fn declare(
        mut self,
        kind: MutationKind,
        patterns: impl IntoIterator<Item = KeyPattern>,
    ) -> Self {
        let mut collected: Vec<KeyPattern> = Vec::new();
        for pattern in patterns {
            if !collected.contains(&pattern) {
                collected.push(pattern);
            }
        }
        if self.edges.insert(kind, collected).is_some() && self.duplicate.is_none() {
            self.duplicate = Some(kind);
        }
        self
    }

    /// Finish the graph, requiring a declaration for every mutation kind.
    pub fn build(self) -> Result<InvalidationGraph, ConfigurationError> {
        if let Some(missing) = MutationKind::ALL
            .into_iter()
            .find(|kind| !self.edges.contains_key(kind))
        {
            return Err(ConfigurationError::UnmappedMutation(missing));
        }
        self.build_partial()
    }

    /// Finish the graph without the totality check. Lookups of undeclared kinds then fail with
    /// `UnmappedMutation`.
    pub fn build_partial(self) -> Result<InvalidationGraph, ConfigurationError> {
        if let Some(kind) = self.duplicate {
            return Err(ConfigurationError::DuplicateDeclaration(kind));
        }
        Ok(InvalidationGraph { edges: self.edges })
    }
}
