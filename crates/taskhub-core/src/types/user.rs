//! Recipient identities as seen by the notification layer.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    #[default]
    Active,
    Pending,
    Inactive,
    Deleted,
    Banned,
    Declined,
}

impl AccountStatus {
    pub fn is_active(&self) -> bool {
        !matches!(
            self,
            AccountStatus::Inactive
                | AccountStatus::Deleted
                | AccountStatus::Banned
                | AccountStatus::Declined
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "ACTIVE",
            AccountStatus::Pending => "PENDING",
            AccountStatus::Inactive => "INACTIVE",
            AccountStatus::Deleted => "DELETED",
            AccountStatus::Banned => "BANNED",
            AccountStatus::Declined => "DECLINED",
        }
    }

    /// Unknown strings map to `Active`; only the four blocked statuses filter.
    pub fn parse(s: &str) -> Self {
        match s {
            "PENDING" => AccountStatus::Pending,
            "INACTIVE" => AccountStatus::Inactive,
            "DELETED" => AccountStatus::Deleted,
            "BANNED" => AccountStatus::Banned,
            "DECLINED" => AccountStatus::Declined,
            _ => AccountStatus::Active,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub push_token: Option<String>,
    pub display_name: String,
    #[serde(default)]
    pub account_status: AccountStatus,
}

impl User {
    pub fn new(uid: &str, display_name: &str, email: Option<&str>) -> Self {
        Self {
            uid: uid.to_string(),
            email: email.map(String::from),
            push_token: None,
            display_name: display_name.to_string(),
            account_status: AccountStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.account_status.is_active()
    }
}

/// Keep only users whose account may receive notifications.
pub fn active_only(users: Vec<User>) -> Vec<User> {
    users.into_iter().filter(User::is_active).collect()
}
