use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

// ---------------------------------------------------------------------------
// AccountData
// ---------------------------------------------------------------------------

/// Opaque authentication payload handed to a plugin (tokens, secrets, ...).
pub type AuthPayload = BTreeMap<String, serde_json::Value>;

/// One unit of polling work: a plugin, an account and one of its services.
///
/// Identity (`Eq`/`Hash`) covers `plugin_id`, `account_id` and `service_id`
/// only. The auth payload can be refreshed without changing which work item
/// this is, so it takes no part in comparisons.
#[derive(Clone, Serialize, Deserialize)]
pub struct AccountData {
    pub plugin_id: String,
    pub account_id: u32,
    pub service_id: String,
    #[serde(default)]
    pub auth: AuthPayload,
}

impl AccountData {
    pub fn new(
        plugin_id: impl Into<String>,
        account_id: u32,
        service_id: impl Into<String>,
        auth: AuthPayload,
    ) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            account_id,
            service_id: service_id.into(),
            auth,
        }
    }

    pub fn has_auth(&self) -> bool {
        !self.auth.is_empty()
    }
}

impl PartialEq for AccountData {
    fn eq(&self, other: &Self) -> bool {
        self.plugin_id == other.plugin_id
            && self.account_id == other.account_id
            && self.service_id == other.service_id
    }
}

impl Eq for AccountData {}

impl Hash for AccountData {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.plugin_id.hash(state);
        self.account_id.hash(state);
        self.service_id.hash(state);
    }
}

// Hand-written so credentials never reach a log line through `{:?}`.
impl fmt::Debug for AccountData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountData")
            .field("plugin_id", &self.plugin_id)
            .field("account_id", &self.account_id)
            .field("service_id", &self.service_id)
            .field("auth_keys", &self.auth.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl fmt::Display for AccountData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}/{}",
            self.plugin_id, self.account_id, self.service_id
        )
    }
}

// ---------------------------------------------------------------------------
// NotificationRecord
// ---------------------------------------------------------------------------

/// A finished notification, ready for the push sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    /// Application the push is addressed to (e.g. `com.example.mail_mail`).
    pub app_id: String,
    pub payload: PushMessage,
}

// ---------------------------------------------------------------------------
// PushMessage: the payload schema understood by the push service
// ---------------------------------------------------------------------------

/// What gets posted to the push service: an opaque message for the target
/// application plus an optional user-facing notification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    /// Passed as-is to the application.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification: Option<Notification>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Path to a sound file, searched within `XDG_DATA_DIRS`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<Card>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vibrate: Option<Vibrate>,
    #[serde(
        rename = "emblem-counter",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub emblem_counter: Option<EmblemCounter>,
    /// Identifies persistent notifications so later pushes can replace them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

/// The visible bubble. `summary` is required: a card without one is never shown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub summary: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub popup: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub icon: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub persist: bool,
}

/// Haptic feedback. `duration` cannot be combined with `pattern`/`repeat`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vibrate {
    /// Milliseconds.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub duration: u32,
    /// On/off durations in milliseconds.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pattern: Vec<u32>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub repeat: u32,
}

impl Vibrate {
    pub fn is_valid(&self) -> bool {
        self.duration == 0 || (self.pattern.is_empty() && self.repeat == 0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmblemCounter {
    pub count: u32,
    pub visible: bool,
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn token(v: &str) -> AuthPayload {
        let mut auth = AuthPayload::new();
        auth.insert("AccessToken".into(), serde_json::json!(v));
        auth
    }

    #[test]
    fn identity_ignores_auth_payload() {
        let a = AccountData::new("mail", 4, "coolmail", token("old"));
        let b = AccountData::new("mail", 4, "coolmail", token("new"));
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(!set.insert(b), "refreshed auth must not create a new item");
    }

    #[test]
    fn identity_distinguishes_services() {
        let a = AccountData::new("mail", 4, "coolmail", AuthPayload::new());
        let b = AccountData::new("mail", 4, "coolshare", AuthPayload::new());
        assert_ne!(a, b);
    }

    #[test]
    fn debug_output_hides_secret_values() {
        let data = AccountData::new("mail", 4, "coolmail", token("s3cr3t"));
        let dbg = format!("{data:?}");
        assert!(dbg.contains("AccessToken"));
        assert!(!dbg.contains("s3cr3t"));
    }

    #[test]
    fn parse_push_message_with_emblem_counter() {
        let json = r#"{
            "message": {"unread": 3},
            "notification": {
                "card": {"summary": "3 new mails", "popup": true, "actions": ["mail://inbox"]},
                "emblem-counter": {"count": 3, "visible": true},
                "vibrate": {"duration": 200},
                "tag": "mail"
            }
        }"#;
        let msg: PushMessage = serde_json::from_str(json).unwrap();
        let n = msg.notification.unwrap();
        assert_eq!(n.card.unwrap().summary, "3 new mails");
        assert_eq!(n.emblem_counter.unwrap().count, 3);
        assert!(n.vibrate.unwrap().is_valid());
    }

    #[test]
    fn card_without_summary_is_rejected() {
        let json = r#"{"notification": {"card": {"body": "no title"}}}"#;
        assert!(serde_json::from_str::<PushMessage>(json).is_err());
    }

    #[test]
    fn vibrate_duration_conflicts_with_pattern() {
        let v = Vibrate {
            duration: 100,
            pattern: vec![100, 50],
            repeat: 0,
        };
        assert!(!v.is_valid());
    }
}
