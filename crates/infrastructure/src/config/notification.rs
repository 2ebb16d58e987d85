//! Where report digests are sent.

use serde::{Deserialize, Serialize};

use super::common::{ConfigError, check_non_zero};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Emit the digest as a structured log line.
    #[default]
    Log,
    /// POST the digest as JSON.
    Webhook,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotificationConfig {
    #[serde(default)]
    pub kind: NotificationKind,

    #[serde(default)]
    pub webhook_url: Option<String>,

    #[serde(default = "default_webhook_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_webhook_timeout_secs() -> u64 {
    10
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            kind: NotificationKind::default(),
            webhook_url: None,
            timeout_secs: default_webhook_timeout_secs(),
        }
    }
}

impl NotificationConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.kind == NotificationKind::Webhook {
            match self.webhook_url.as_deref() {
                None | Some("") => {
                    return Err(ConfigError::validation(
                        "notification.webhook_url",
                        "required when notification.kind is webhook",
                    ));
                }
                Some(url) if !url.starts_with("http://") && !url.starts_with("https://") => {
                    return Err(ConfigError::validation(
                        "notification.webhook_url",
                        format!("'{url}' must be an http(s) URL"),
                    ));
                }
                Some(_) => {}
            }
        }
        check_non_zero("notification.timeout_secs", self.timeout_secs)
    }
}
