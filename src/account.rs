use serde::{Deserialize, Serialize};

/// Name shown when an account has neither a username nor a display name.
pub const DEFAULT_DISPLAY_NAME: &str = "User";

/// The signed-in account, as vouched for by the external identity provider.
///
/// Passed explicitly to every action that touches account data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountContext {
    pub uid: String,
}

impl AccountContext {
    pub fn new(uid: impl Into<String>) -> Self {
        AccountContext { uid: uid.into() }
    }
}

/// Profile document stored per account.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl AccountProfile {
    /// Username, else display name, else [`DEFAULT_DISPLAY_NAME`]. Blank names are ignored.
    pub fn shown_name(&self) -> &str {
        [&self.username, &self.display_name]
            .into_iter()
            .flatten()
            .map(|name| name.as_str())
            .find(|name| !name.trim().is_empty())
            .unwrap_or(DEFAULT_DISPLAY_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shown_name_fallbacks() {
        let mut profile = AccountProfile::default();
        assert_eq!(profile.shown_name(), "User");

        profile.display_name = Some("Display".into());
        assert_eq!(profile.shown_name(), "Display");

        profile.username = Some("".into());
        assert_eq!(profile.shown_name(), "Display");

        profile.username = Some("alice".into());
        assert_eq!(profile.shown_name(), "alice");
    }
}
