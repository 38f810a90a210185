use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the `coherence-admin` binary.
#[derive(Debug, Parser)]
#[command(
    name = "coherence-admin",
    version,
    about = "Admin and notification client with cache-consistent mutations"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "COHERENCE_CONFIG_FILE",
        value_name = "PATH",
        global = true
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// API base URL, e.g. <https://example.com>
    #[arg(long = "site", env = "COHERENCE_SITE_URL", value_name = "URL", global = true)]
    pub site: Option<String>,

    /// Path to a file holding the session token (takes precedence over env)
    #[arg(
        long = "key-file",
        env = "COHERENCE_SESSION_TOKEN_FILE",
        value_name = "PATH",
        global = true
    )]
    pub key_file: Option<PathBuf>,

    /// Override the request timeout.
    #[arg(long = "timeout-seconds", value_name = "SECONDS", global = true)]
    pub timeout_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// User listing and ban view
    Users(UsersArgs),
    /// Ban a user, optionally deleting all of their messages
    Ban {
        user_id: String,
        #[arg(long)]
        reason: Option<String>,
        #[arg(long, default_value_t = false)]
        delete_messages: bool,
    },
    /// Lift a ban
    Unban { user_id: String },
    /// Change a user's role
    Role { user_id: String, role: String },
    /// Notification inbox and preferences
    Notifications(NotificationsArgs),
    /// Poll notification counters and print every refresh until Ctrl-C
    Watch(WatchArgs),
}

#[derive(Debug, Args, Clone)]
pub struct UsersArgs {
    #[command(subcommand)]
    pub action: UsersCmd,
}

#[derive(Debug, Subcommand, Clone)]
pub enum UsersCmd {
    /// Search users
    List {
        #[arg(long)]
        search: Option<String>,
        /// Page size; defaults to the configured user search limit
        #[arg(long)]
        limit: Option<u32>,
    },
    /// List banned users
    Bans,
}

#[derive(Debug, Args, Clone)]
pub struct NotificationsArgs {
    #[command(subcommand)]
    pub action: NotificationsCmd,
}

#[derive(Debug, Subcommand, Clone)]
pub enum NotificationsCmd {
    /// List notifications
    List,
    /// Show aggregate counters
    Counts,
    /// Show the unread badge count
    Unread,
    /// Mark one notification read
    Read { id: String },
    /// Mark every notification read
    ReadAll,
    /// Delete one notification
    Delete { id: String },
    /// Delete every notification
    DeleteAll,
    /// Show delivery preferences
    Preferences,
    /// Update delivery preferences; unspecified fields keep their current value
    SetPreferences(SetPreferencesArgs),
}

#[derive(Debug, Args, Clone, Default)]
pub struct SetPreferencesArgs {
    #[arg(long, value_parser = BoolishValueParser::new())]
    pub email: Option<bool>,
    #[arg(long, value_parser = BoolishValueParser::new())]
    pub push: Option<bool>,
    /// Notification type to mute (repeatable)
    #[arg(long = "mute", value_name = "TYPE")]
    pub mute: Vec<String>,
    /// Notification type to unmute (repeatable)
    #[arg(long = "unmute", value_name = "TYPE")]
    pub unmute: Vec<String>,
}

#[derive(Debug, Args, Clone, Default)]
pub struct WatchArgs {
    /// Override the polling interval in milliseconds.
    #[arg(long = "interval-ms", value_name = "MS")]
    pub interval_ms: Option<u64>,

    /// Also poll the unread badge count.
    #[arg(long, default_value_t = false)]
    pub unread: bool,
}
