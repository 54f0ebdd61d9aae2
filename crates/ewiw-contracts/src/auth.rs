use std::env;

use serde::{Deserialize, Serialize};

pub const DEMO_USER_ID: &str = "demo-user";
pub const DEMO_DISPLAY_NAME: &str = "Demo User";

/// Who is driving the chat. The engine only looks at `is_authenticated`;
/// the rest is carried through for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub user_id: Option<String>,
    pub display_name: Option<String>,
    pub is_authenticated: bool,
}

impl AuthSession {
    pub fn signed_in(user_id: impl Into<String>, display_name: Option<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            display_name,
            is_authenticated: true,
        }
    }

    /// Demo bypass: a fixed signed-in user, no identity provider involved.
    pub fn demo() -> Self {
        Self::signed_in(DEMO_USER_ID, Some(DEMO_DISPLAY_NAME.to_string()))
    }

    pub fn anonymous() -> Self {
        Self {
            user_id: None,
            display_name: None,
            is_authenticated: false,
        }
    }

    /// `EWIW_USER_ID` (+ optional `EWIW_DISPLAY_NAME`) signs in that user.
    /// Otherwise the demo user is used unless `EWIW_DEMO` is `0`/`false`/`off`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        if let Some(user_id) = non_empty("EWIW_USER_ID") {
            return Self::signed_in(user_id, non_empty("EWIW_DISPLAY_NAME"));
        }
        let demo_disabled = non_empty("EWIW_DEMO")
            .map(|value| matches!(value.to_ascii_lowercase().as_str(), "0" | "false" | "off" | "no"))
            .unwrap_or(false);
        if demo_disabled {
            Self::anonymous()
        } else {
            Self::demo()
        }
    }

    pub fn display_label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.user_id.as_deref())
            .unwrap_or("guest")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn explicit_user_wins() {
        let session = AuthSession::from_lookup(lookup(&[
            ("EWIW_USER_ID", "u-42"),
            ("EWIW_DISPLAY_NAME", "Ada"),
            ("EWIW_DEMO", "0"),
        ]));
        assert!(session.is_authenticated);
        assert_eq!(session.user_id.as_deref(), Some("u-42"));
        assert_eq!(session.display_label(), "Ada");
    }

    #[test]
    fn demo_is_the_default() {
        let session = AuthSession::from_lookup(lookup(&[]));
        assert_eq!(session, AuthSession::demo());
    }

    #[test]
    fn demo_can_be_disabled() {
        let session = AuthSession::from_lookup(lookup(&[("EWIW_DEMO", "off")]));
        assert!(!session.is_authenticated);
        assert_eq!(session.display_label(), "guest");
    }
}
