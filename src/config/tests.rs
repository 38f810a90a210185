use std::io::Write;

use serial_test::serial;

use super::*;

#[test]
fn defaults_are_applied() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert!(settings.gateway.base_url.is_none());
    assert_eq!(settings.gateway.timeout, Duration::from_secs(10));
    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
    assert_eq!(
        settings.polling.notification_counts_interval,
        Duration::from_millis(30_000)
    );
    assert_eq!(
        settings.polling.unread_count_interval,
        Duration::from_millis(30_000)
    );
    assert!(settings.polling.refetch_on_focus);
    assert_eq!(settings.cache.user_search_limit.get(), 20);
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.gateway.base_url = Some("https://file.example".to_string());
    raw.logging.level = Some("info".to_string());

    let overrides = GlobalOverrides {
        site: Some("https://cli.example".to_string()),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_global_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(
        settings.gateway.base_url.as_ref().map(Url::as_str),
        Some("https://cli.example/")
    );
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    raw.apply_global_overrides(&GlobalOverrides {
        log_json: Some(true),
        ..Default::default()
    });
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn watch_interval_overrides_both_pollers() {
    let mut raw = RawSettings::default();
    raw.apply_watch_overrides(&WatchArgs {
        interval_ms: Some(5_000),
        unread: true,
    });
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(
        settings.polling.notification_counts_interval,
        Duration::from_millis(5_000)
    );
    assert_eq!(
        settings.polling.unread_count_interval,
        Duration::from_millis(5_000)
    );
}

#[test]
fn zero_poll_interval_is_rejected() {
    let mut raw = RawSettings::default();
    raw.polling.notification_counts_interval_ms = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero interval");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "polling.notification_counts_interval_ms",
            ..
        }
    ));
}

#[test]
fn base_url_must_be_http() {
    let mut raw = RawSettings::default();
    raw.gateway.base_url = Some("ftp://example.com".to_string());

    let err = Settings::from_raw(raw).expect_err("bad scheme");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "gateway.base_url",
            ..
        }
    ));
}

#[test]
fn invalid_log_level_is_rejected() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("chatty".to_string());
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn user_search_limit_must_fit_u32() {
    let mut raw = RawSettings::default();
    raw.cache.user_search_limit = Some(u64::from(u32::MAX) + 1);
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
#[serial]
fn config_file_layer_is_read() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("tmp file");
    writeln!(
        file,
        "[gateway]\nbase_url = \"https://admin.example\"\ntimeout_seconds = 3\n\n\
         [polling]\nrefetch_on_focus = false\n"
    )
    .expect("write config");

    let args = CliArgs::parse_from([
        "coherence-admin",
        "--config-file",
        file.path().to_str().expect("utf-8 path"),
        "notifications",
        "counts",
    ]);
    let settings = load(&args).expect("settings");

    assert_eq!(
        settings.gateway.base_url.as_ref().map(Url::as_str),
        Some("https://admin.example/")
    );
    assert_eq!(settings.gateway.timeout, Duration::from_secs(3));
    assert!(!settings.polling.refetch_on_focus);
}

#[test]
#[serial]
fn environment_layer_sits_between_file_and_cli() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("tmp file");
    writeln!(
        file,
        "[polling]\nunread_count_interval_ms = 60000\nnotification_counts_interval_ms = 60000\n"
    )
    .expect("write config");

    // SAFETY: env mutation is confined to #[serial] tests.
    unsafe { std::env::set_var("COHERENCE__POLLING__UNREAD_COUNT_INTERVAL_MS", "5000") };
    let args = CliArgs::parse_from([
        "coherence-admin",
        "--config-file",
        file.path().to_str().expect("utf-8 path"),
        "notifications",
        "unread",
    ]);
    let settings = load(&args);
    unsafe { std::env::remove_var("COHERENCE__POLLING__UNREAD_COUNT_INTERVAL_MS") };
    let settings = settings.expect("settings");

    assert_eq!(
        settings.polling.unread_count_interval,
        Duration::from_millis(5_000)
    );
    assert_eq!(
        settings.polling.notification_counts_interval,
        Duration::from_millis(60_000)
    );
}

#[test]
fn parse_ban_arguments() {
    let args = CliArgs::parse_from([
        "coherence-admin",
        "ban",
        "u1",
        "--reason",
        "spam",
        "--delete-messages",
    ]);

    match args.command {
        Command::Ban {
            user_id,
            reason,
            delete_messages,
        } => {
            assert_eq!(user_id, "u1");
            assert_eq!(reason.as_deref(), Some("spam"));
            assert!(delete_messages);
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_global_flags_after_subcommand() {
    let args = CliArgs::parse_from([
        "coherence-admin",
        "users",
        "list",
        "--search",
        "ann",
        "--site",
        "https://example.com",
    ]);

    assert_eq!(args.overrides.site.as_deref(), Some("https://example.com"));
    match args.command {
        Command::Users(users) => match users.action {
            UsersCmd::List { search, limit } => {
                assert_eq!(search.as_deref(), Some("ann"));
                assert_eq!(limit, None);
            }
            UsersCmd::Bans => panic!("wrong users action"),
        },
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_set_preferences_arguments() {
    let args = CliArgs::parse_from([
        "coherence-admin",
        "notifications",
        "set-preferences",
        "--email",
        "false",
        "--mute",
        "mention",
        "--mute",
        "reply",
    ]);

    match args.command {
        Command::Notifications(n) => match n.action {
            NotificationsCmd::SetPreferences(prefs) => {
                assert_eq!(prefs.email, Some(false));
                assert_eq!(prefs.push, None);
                assert_eq!(prefs.mute, vec!["mention", "reply"]);
            }
            _ => panic!("wrong notifications action"),
        },
        _ => panic!("wrong command parsed"),
    }
}
