//! Side-effecting operations the client may issue, and their local input validation.

use std::fmt;

use coherence_api_types::{
    BanUserRequest, DeleteUserMessagesRequest, FieldError, NotificationPreferences,
    SetRoleRequest, UnbanUserRequest,
};
use serde_json::{Value, json};

const MAX_BAN_REASON_CHARS: usize = 500;

/// Tag identifying a mutation independently of its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MutationKind {
    BanUser,
    UnbanUser,
    DeleteUserMessages,
    UpdateUserRole,
    MarkNotificationRead,
    MarkAllRead,
    DeleteNotification,
    DeleteAllNotifications,
    UpdateNotificationPreferences,
}

impl MutationKind {
    pub const ALL: [MutationKind; 9] = [
        MutationKind::BanUser,
        MutationKind::UnbanUser,
        MutationKind::DeleteUserMessages,
        MutationKind::UpdateUserRole,
        MutationKind::MarkNotificationRead,
        MutationKind::MarkAllRead,
        MutationKind::DeleteNotification,
        MutationKind::DeleteAllNotifications,
        MutationKind::UpdateNotificationPreferences,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MutationKind::BanUser => "ban_user",
            MutationKind::UnbanUser => "unban_user",
            MutationKind::DeleteUserMessages => "delete_user_messages",
            MutationKind::UpdateUserRole => "update_user_role",
            MutationKind::MarkNotificationRead => "mark_notification_read",
            MutationKind::MarkAllRead => "mark_all_read",
            MutationKind::DeleteNotification => "delete_notification",
            MutationKind::DeleteAllNotifications => "delete_all_notifications",
            MutationKind::UpdateNotificationPreferences => "update_notification_preferences",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A mutation together with its typed input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    BanUser {
        user_id: String,
        reason: Option<String>,
    },
    UnbanUser {
        user_id: String,
    },
    DeleteUserMessages {
        user_id: String,
    },
    UpdateUserRole {
        user_id: String,
        role: String,
    },
    MarkNotificationRead {
        notification_id: String,
    },
    MarkAllRead,
    DeleteNotification {
        notification_id: String,
    },
    DeleteAllNotifications,
    UpdateNotificationPreferences(NotificationPreferences),
}

impl Mutation {
    pub fn kind(&self) -> MutationKind {
        match self {
            Mutation::BanUser { .. } => MutationKind::BanUser,
            Mutation::UnbanUser { .. } => MutationKind::UnbanUser,
            Mutation::DeleteUserMessages { .. } => MutationKind::DeleteUserMessages,
            Mutation::UpdateUserRole { .. } => MutationKind::UpdateUserRole,
            Mutation::MarkNotificationRead { .. } => MutationKind::MarkNotificationRead,
            Mutation::MarkAllRead => MutationKind::MarkAllRead,
            Mutation::DeleteNotification { .. } => MutationKind::DeleteNotification,
            Mutation::DeleteAllNotifications => MutationKind::DeleteAllNotifications,
            Mutation::UpdateNotificationPreferences(_) => {
                MutationKind::UpdateNotificationPreferences
            }
        }
    }

    /// Check the input before any request leaves the client.
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();
        match self {
            Mutation::BanUser { user_id, reason } => {
                require_id(&mut errors, "userId", user_id);
                if let Some(reason) = reason
                    && reason.chars().count() > MAX_BAN_REASON_CHARS
                {
                    errors.push(FieldError::new(
                        "banReason",
                        format!("ban reason must be at most {MAX_BAN_REASON_CHARS} characters"),
                    ));
                }
            }
            Mutation::UnbanUser { user_id } | Mutation::DeleteUserMessages { user_id } => {
                require_id(&mut errors, "userId", user_id);
            }
            Mutation::UpdateUserRole { user_id, role } => {
                require_id(&mut errors, "userId", user_id);
                let role = role.trim();
                if role.is_empty() {
                    errors.push(FieldError::new("role", "role is required"));
                } else if !role
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
                {
                    errors.push(FieldError::new(
                        "role",
                        "role may only contain letters, digits, '-' and '_'",
                    ));
                }
            }
            Mutation::MarkNotificationRead { notification_id }
            | Mutation::DeleteNotification { notification_id } => {
                require_id(&mut errors, "notificationId", notification_id);
            }
            Mutation::UpdateNotificationPreferences(preferences) => {
                if preferences
                    .muted_types
                    .iter()
                    .any(|kind| kind.trim().is_empty())
                {
                    errors.push(FieldError::new(
                        "mutedTypes",
                        "muted notification types must not be blank",
                    ));
                }
            }
            Mutation::MarkAllRead | Mutation::DeleteAllNotifications => {}
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Request parameters sent to the gateway.
    pub fn params(&self) -> Value {
        let value = match self {
            Mutation::BanUser { user_id, reason } => serde_json::to_value(BanUserRequest {
                user_id: user_id.clone(),
                ban_reason: reason.clone(),
            }),
            Mutation::UnbanUser { user_id } => serde_json::to_value(UnbanUserRequest {
                user_id: user_id.clone(),
            }),
            Mutation::DeleteUserMessages { user_id } => {
                serde_json::to_value(DeleteUserMessagesRequest {
                    user_id: user_id.clone(),
                })
            }
            Mutation::UpdateUserRole { user_id, role } => serde_json::to_value(SetRoleRequest {
                user_id: user_id.clone(),
                role: role.trim().to_string(),
            }),
            Mutation::MarkNotificationRead { notification_id }
            | Mutation::DeleteNotification { notification_id } => {
                return json!({ "notificationId": notification_id });
            }
            Mutation::MarkAllRead | Mutation::DeleteAllNotifications => return json!({}),
            Mutation::UpdateNotificationPreferences(preferences) => {
                serde_json::to_value(preferences)
            }
        };
        // Request structs hold only strings and bools; serialization is infallible.
        value.unwrap_or(Value::Null)
    }
}

fn require_id(errors: &mut Vec<FieldError>, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.push(FieldError::new(field, format!("{field} is required")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_cover_every_variant() {
        let samples = [
            Mutation::BanUser {
                user_id: "u1".into(),
                reason: None,
            },
            Mutation::UnbanUser {
                user_id: "u1".into(),
            },
            Mutation::DeleteUserMessages {
                user_id: "u1".into(),
            },
            Mutation::UpdateUserRole {
                user_id: "u1".into(),
                role: "admin".into(),
            },
            Mutation::MarkNotificationRead {
                notification_id: "n1".into(),
            },
            Mutation::MarkAllRead,
            Mutation::DeleteNotification {
                notification_id: "n1".into(),
            },
            Mutation::DeleteAllNotifications,
            Mutation::UpdateNotificationPreferences(NotificationPreferences::default()),
        ];
        let kinds: Vec<_> = samples.iter().map(Mutation::kind).collect();
        assert_eq!(kinds, MutationKind::ALL.to_vec());
    }

    #[test]
    fn blank_user_id_is_rejected_locally() {
        let errors = Mutation::BanUser {
            user_id: "  ".into(),
            reason: Some("spam".into()),
        }
        .validate()
        .expect_err("blank id");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "userId");
    }

    #[test]
    fn overlong_ban_reason_is_rejected() {
        let errors = Mutation::BanUser {
            user_id: "u1".into(),
            reason: Some("x".repeat(MAX_BAN_REASON_CHARS + 1)),
        }
        .validate()
        .expect_err("long reason");
        assert_eq!(errors[0].field, "banReason");
    }

    #[test]
    fn role_must_be_a_simple_token() {
        let bad = Mutation::UpdateUserRole {
            user_id: "u1".into(),
            role: "super admin".into(),
        };
        assert!(bad.validate().is_err());

        let good = Mutation::UpdateUserRole {
            user_id: "u1".into(),
            role: " moderator ".into(),
        };
        assert!(good.validate().is_ok());
        assert_eq!(good.params()["role"], "moderator");
    }

    #[test]
    fn params_use_wire_field_names() {
        let params = Mutation::BanUser {
            user_id: "u1".into(),
            reason: Some("spam".into()),
        }
        .params();
        assert_eq!(params["userId"], "u1");
        assert_eq!(params["banReason"], "spam");

        let params = Mutation::MarkNotificationRead {
            notification_id: "n9".into(),
        }
        .params();
        assert_eq!(params["notificationId"], "n9");
    }
}
