#![deny(clippy::all, clippy::pedantic)]

use coherence::application::error::AppError;
use coherence::cache::{ConsistencyEngine, QueryKey};
use coherence::config::{NotificationsCmd, SetPreferencesArgs};
use coherence_api_types::NotificationPreferences;

use crate::print::print_json;

pub async fn handle(engine: &ConsistencyEngine, cmd: NotificationsCmd) -> Result<(), AppError> {
    match cmd {
        NotificationsCmd::List => show(engine, QueryKey::notifications()).await,
        NotificationsCmd::Counts => show(engine, QueryKey::notification_counts()).await,
        NotificationsCmd::Unread => show(engine, QueryKey::notification_unread_count()).await,
        NotificationsCmd::Preferences => show(engine, QueryKey::notification_preferences()).await,
        NotificationsCmd::Read { id } => {
            let res = engine.mark_notification_read(&id).await?;
            print_json(&res)
        }
        NotificationsCmd::ReadAll => {
            let res = engine.mark_all_read().await?;
            print_json(&res)
        }
        NotificationsCmd::Delete { id } => {
            let res = engine.delete_notification(&id).await?;
            print_json(&res)
        }
        NotificationsCmd::DeleteAll => {
            let res = engine.delete_all_notifications().await?;
            print_json(&res)
        }
        NotificationsCmd::SetPreferences(args) => set_preferences(engine, args).await,
    }
}

async fn show(engine: &ConsistencyEngine, key: QueryKey) -> Result<(), AppError> {
    let value = engine.fetch(&key).await?;
    print_json(&value)
}

async fn set_preferences(
    engine: &ConsistencyEngine,
    args: SetPreferencesArgs,
) -> Result<(), AppError> {
    let current: NotificationPreferences = engine
        .fetch_as(&QueryKey::notification_preferences())
        .await?;
    let updated = merge_preferences(current, args);
    engine.update_notification_preferences(updated.clone()).await?;
    print_json(&updated)
}

pub(crate) fn merge_preferences(
    mut current: NotificationPreferences,
    args: SetPreferencesArgs,
) -> NotificationPreferences {
    if let Some(email) = args.email {
        current.email_enabled = email;
    }
    if let Some(push) = args.push {
        current.push_enabled = push;
    }
    current.muted_types.retain(|kind| !args.unmute.contains(kind));
    for kind in args.mute {
        if !current.muted_types.contains(&kind) {
            current.muted_types.push(kind);
        }
    }
    current
}
