//! coherence-admin: admin and notification client built on the consistency engine.
#![deny(clippy::all, clippy::pedantic)]

mod handlers;
mod print;

use std::{process, sync::Arc};

use coherence::{
    application::error::AppError,
    cache::{ConsistencyEngine, EngineConfig},
    config::{self, Command},
    infra::{http::HttpGateway, telemetry},
};
use tracing::{Dispatch, Level, dispatcher, error};
use tracing_subscriber::fmt as tracing_fmt;

use handlers::{notifications, users, watch};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        eprintln!("error: {}", error.presentation_message());
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    let report = error.report();
    if dispatcher::has_been_set() {
        error!(error = %error, chain = ?report.messages, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(std::io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, chain = ?report.messages, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;

    let gateway = HttpGateway::from_settings(&settings.gateway)?;
    let engine = ConsistencyEngine::new(Arc::new(gateway), EngineConfig::from(&settings))?;

    dispatch(&engine, cli.command).await
}

async fn dispatch(engine: &ConsistencyEngine, command: Command) -> Result<(), AppError> {
    match command {
        Command::Users(args) => users::handle(engine, args.action).await,
        Command::Ban {
            user_id,
            reason,
            delete_messages,
        } => users::ban(engine, &user_id, reason, delete_messages).await,
        Command::Unban { user_id } => users::unban(engine, &user_id).await,
        Command::Role { user_id, role } => users::set_role(engine, &user_id, &role).await,
        Command::Notifications(args) => notifications::handle(engine, args.action).await,
        Command::Watch(args) => watch::handle(engine, args).await,
    }
}
