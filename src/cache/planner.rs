//! Invalidation plan generation.
//!
//! Merges the declared patterns of one or more mutation kinds into a single deduplicated plan.

use std::collections::BTreeSet;
use std::fmt;

use crate::domain::mutation::MutationKind;

use super::graph::{ConfigurationError, InvalidationGraph};
use super::keys::KeyPattern;
use super::store::QueryCache;

/// Patterns to mark stale after a set of successful mutations.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InvalidationPlan {
    /// Mutation kinds the plan was built from.
    pub kinds: BTreeSet<MutationKind>,
    /// Patterns to invalidate, deduplicated.
    pub patterns: BTreeSet<KeyPattern>,
}

impl fmt::Display for InvalidationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InvalidationPlan {{ kinds: [")?;
        for (i, kind) in self.kinds.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{kind}")?;
        }
        f.write_str("], patterns: [")?;
        for (i, pattern) in self.patterns.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{pattern}")?;
        }
        f.write_str("] }")
    }
}

impl InvalidationPlan {
    /// Merge the graph declarations of `kinds` into one plan.
    ///
    /// Fails on the first kind the graph does not declare.
    pub fn from_kinds(
        graph: &InvalidationGraph,
        kinds: impl IntoIterator<Item = MutationKind>,
    ) -> Result<Self, ConfigurationError> {
        let mut plan = Self::default();
        for kind in kinds {
            if !plan.kinds.insert(kind) {
                continue;
            }
            plan.patterns.extend(graph.lookup(kind)?.iter().cloned());
        }
        Ok(plan)
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Mark every planned pattern stale. Returns the number of entries touched.
    pub fn apply(&self, cache: &QueryCache) -> usize {
        self.patterns
            .iter()
            .map(|pattern| cache.invalidate(pattern))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::keys::Namespace;

    fn graph() -> InvalidationGraph {
        InvalidationGraph::standard().expect("standard graph")
    }

    #[test]
    fn ban_and_role_change_share_user_pattern() {
        let plan = InvalidationPlan::from_kinds(
            &graph(),
            [MutationKind::BanUser, MutationKind::UpdateUserRole],
        )
        .expect("plan");

        assert_eq!(plan.kinds.len(), 2);
        assert_eq!(plan.patterns.len(), 2);
        assert!(plan.patterns.contains(&KeyPattern::Namespace(Namespace::Users)));
        assert!(plan.patterns.contains(&KeyPattern::Namespace(Namespace::Bans)));
    }

    #[test]
    fn message_deletion_plans_nothing() {
        let plan = InvalidationPlan::from_kinds(&graph(), [MutationKind::DeleteUserMessages])
            .expect("plan");
        assert!(plan.is_empty());
    }

    #[test]
    fn unknown_kind_propagates_configuration_error() {
        let partial = InvalidationGraph::builder()
            .build_partial()
            .expect("empty graph");
        let err = InvalidationPlan::from_kinds(&partial, [MutationKind::MarkAllRead])
            .expect_err("unmapped");
        assert_eq!(
            err,
            ConfigurationError::UnmappedMutation(MutationKind::MarkAllRead)
        );
    }

    #[test]
    fn display_lists_kinds_and_patterns() {
        let plan = InvalidationPlan::from_kinds(
            &graph(),
            [MutationKind::UpdateNotificationPreferences],
        )
        .expect("plan");
        assert_eq!(
            plan.to_string(),
            "InvalidationPlan { kinds: [update_notification_preferences], \
             patterns: [notification-preferences/*] }"
        );
    }
}
