#![deny(clippy::all, clippy::pedantic)]

use coherence::application::error::AppError;
use coherence::cache::{ConsistencyEngine, QueryKey};
use coherence::config::WatchArgs;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::print::print_refresh;

/// Print notification counters, then every polled refresh until Ctrl-C.
pub async fn handle(engine: &ConsistencyEngine, args: WatchArgs) -> Result<(), AppError> {
    let mut keys = vec![QueryKey::notification_counts()];
    if args.unread {
        keys.push(QueryKey::notification_unread_count());
    }

    for key in &keys {
        let value = engine.fetch(key).await?;
        print_refresh(key, &value)?;
    }

    let mut updates = engine.cache().subscribe();
    engine.watch_notification_counts();
    if args.unread {
        engine.watch_unread_count();
    }
    info!(watchers = engine.poller().len(), "Watching notification counters");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            update = updates.recv() => match update {
                Ok(key) if keys.contains(&key) => {
                    if let Some(value) = engine.entry(&key).and_then(|entry| entry.value) {
                        print_refresh(&key, &value)?;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Dropped refresh notifications"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    engine.reset_session();
    Ok(())
}
