#![deny(clippy::all, clippy::pedantic)]

use coherence::application::error::AppError;
use coherence::cache::{ConsistencyEngine, QueryKey};
use coherence::config::UsersCmd;
use tracing::info;

use crate::print::{print_cascade, print_json};

pub async fn handle(engine: &ConsistencyEngine, cmd: UsersCmd) -> Result<(), AppError> {
    match cmd {
        UsersCmd::List { search, limit } => list(engine, search.as_deref(), limit).await,
        UsersCmd::Bans => bans(engine).await,
    }
}

async fn list(
    engine: &ConsistencyEngine,
    search: Option<&str>,
    limit: Option<u32>,
) -> Result<(), AppError> {
    let key = engine.user_search_key(search, limit);
    let users = engine.fetch(&key).await?;
    print_json(&users)
}

async fn bans(engine: &ConsistencyEngine) -> Result<(), AppError> {
    let bans = engine.fetch(&QueryKey::bans()).await?;
    print_json(&bans)
}

/// Ban, then optionally delete messages. A partial failure is printed and returned as an error.
pub async fn ban(
    engine: &ConsistencyEngine,
    user_id: &str,
    reason: Option<String>,
    delete_messages: bool,
) -> Result<(), AppError> {
    let outcome = engine.ban_user(user_id, reason, delete_messages).await;
    print_cascade(&outcome)?;
    outcome.into_result()?;
    info!(user_id, delete_messages, "User banned");
    Ok(())
}

pub async fn unban(engine: &ConsistencyEngine, user_id: &str) -> Result<(), AppError> {
    let res = engine.unban_user(user_id).await?;
    print_json(&res)
}

pub async fn set_role(engine: &ConsistencyEngine, user_id: &str, role: &str) -> Result<(), AppError> {
    let res = engine.update_user_role(user_id, role).await?;
    print_json(&res)
}
