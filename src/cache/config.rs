//! Engine configuration.
//!
//! Polling cadence and query defaults, derived from the `polling` and `cache` settings sections.

use std::num::NonZeroU32;
use std::time::Duration;

use super::polling::PollConfig;

const DEFAULT_POLL_INTERVAL_MS: u64 = 30_000;
const DEFAULT_USER_SEARCH_LIMIT: u32 = 20;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Watcher settings for the notification counters view.
    pub notification_counts_poll: PollConfig,
    /// Watcher settings for the unread badge.
    pub unread_count_poll: PollConfig,
    /// Page size used when a user search does not name one.
    pub user_search_limit: NonZeroU32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let poll = PollConfig::every(Duration::from_millis(DEFAULT_POLL_INTERVAL_MS));
        Self {
            notification_counts_poll: poll,
            unread_count_poll: poll,
            user_search_limit: NonZeroU32::new(DEFAULT_USER_SEARCH_LIMIT)
                .unwrap_or(NonZeroU32::MIN),
        }
    }
}

impl From<&crate::config::Settings> for EngineConfig {
    fn from(settings: &crate::config::Settings) -> Self {
        let polling = &settings.polling;
        Self {
            notification_counts_poll: PollConfig {
                interval: polling.notification_counts_interval,
                refetch_on_regain_focus: polling.refetch_on_focus,
            },
            unread_count_poll: PollConfig {
                interval: polling.unread_count_interval,
                refetch_on_regain_focus: polling.refetch_on_focus,
            },
            user_search_limit: settings.cache.user_search_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = EngineConfig::default();
        assert_eq!(
            config.notification_counts_poll.interval,
            Duration::from_millis(30_000)
        );
        assert!(config.notification_counts_poll.refetch_on_regain_focus);
        assert_eq!(config.unread_count_poll, config.notification_counts_poll);
        assert_eq!(config.user_search_limit.get(), 20);
    }
}
