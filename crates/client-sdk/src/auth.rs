use serde::{Deserialize, Serialize};

pub const PLACEHOLDER_NAME: &str = "User";
pub const PLACEHOLDER_EMAIL: &str = "user@example.com";

/// Credential and identity of the signed-in user.
///
/// The authenticated flag is never stored separately: it is always derived
/// from token presence, so no mutation can make the two disagree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthSession {
    token: Option<String>,
    server_session_id: Option<String>,
    username: Option<String>,
    email: Option<String>,
}

/// On-disk shape of the `auth-storage` record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthRecord {
    pub token: Option<String>,
    pub is_authenticated: bool,
    pub session_id: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
}

impl AuthSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populates every field in one step. Only call after the backend accepted the credentials.
    pub fn login(
        &mut self,
        token: &str,
        username: &str,
        email: &str,
        server_session_id: Option<&str>,
    ) {
        self.token = non_empty(token);
        self.username = non_empty(username);
        self.email = non_empty(email);
        if let Some(id) = server_session_id.and_then(non_empty) {
            self.server_session_id = Some(id);
        }
    }

    /// Restores a bare credential (from the cookie mirror) without touching identity.
    pub fn set_token(&mut self, token: &str) {
        self.token = non_empty(token);
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn server_session_id(&self) -> Option<&str> {
        self.server_session_id.as_deref()
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or(PLACEHOLDER_NAME)
    }

    pub fn display_email(&self) -> &str {
        self.email.as_deref().unwrap_or(PLACEHOLDER_EMAIL)
    }

    /// Two-letter avatar initials from the display name.
    pub fn initials(&self) -> String {
        let mut words = self.display_name().split_whitespace();
        let first = words.next().and_then(|w| w.chars().next());
        let second = words.next().and_then(|w| w.chars().next());
        first
            .into_iter()
            .chain(second)
            .flat_map(char::to_uppercase)
            .collect()
    }

    pub fn to_record(&self) -> AuthRecord {
        AuthRecord {
            token: self.token.clone(),
            is_authenticated: self.is_authenticated(),
            session_id: self.server_session_id.clone(),
            username: self.username.clone(),
            email: self.email.clone(),
        }
    }

    /// The stored flag is ignored; authentication is re-derived from the token.
    pub fn from_record(record: AuthRecord) -> Self {
        Self {
            token: record.token.as_deref().and_then(non_empty),
            server_session_id: record.session_id.as_deref().and_then(non_empty),
            username: record.username,
            email: record.email,
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_flag_mirrors_token(auth: &AuthSession) {
        assert_eq!(auth.is_authenticated(), auth.token().is_some());
        assert_eq!(auth.to_record().is_authenticated, auth.token().is_some());
    }

    #[test]
    fn login_populates_all_fields() {
        let mut auth = AuthSession::new();
        assert_flag_mirrors_token(&auth);
        auth.login("abc", "Ranger Rick", "rick@reef.org", Some("S1"));
        assert!(auth.is_authenticated());
        assert_eq!(auth.token(), Some("abc"));
        assert_eq!(auth.server_session_id(), Some("S1"));
        assert_eq!(auth.display_name(), "Ranger Rick");
        assert_eq!(auth.initials(), "RR");
        assert_flag_mirrors_token(&auth);
    }

    #[test]
    fn flag_tracks_token_through_every_mutation() {
        let mut auth = AuthSession::new();
        for token in ["abc", "", "  ", "xyz"] {
            auth.set_token(token);
            assert_flag_mirrors_token(&auth);
        }
        auth.login("", "u", "e@x.io", None);
        assert!(!auth.is_authenticated());
        assert_flag_mirrors_token(&auth);
        auth.clear();
        assert_flag_mirrors_token(&auth);
    }

    #[test]
    fn clear_resets_to_placeholders() {
        let mut auth = AuthSession::new();
        auth.login("abc", "u", "u@x.io", Some("S1"));
        auth.clear();
        assert_eq!(auth, AuthSession::default());
        assert_eq!(auth.display_name(), PLACEHOLDER_NAME);
        assert_eq!(auth.display_email(), PLACEHOLDER_EMAIL);
        assert_eq!(auth.server_session_id(), None);
    }

    #[test]
    fn record_restore_rederives_flag() {
        let tampered = AuthRecord {
            token: None,
            is_authenticated: true,
            session_id: Some("S1".into()),
            username: Some("u".into()),
            email: None,
        };
        let auth = AuthSession::from_record(tampered);
        assert!(!auth.is_authenticated());
        assert_eq!(auth.server_session_id(), Some("S1"));

        let json = serde_json::to_value(AuthSession::from_record(AuthRecord {
            token: Some("t".into()),
            ..AuthRecord::default()
        })
        .to_record())
        .unwrap();
        assert_eq!(json["isAuthenticated"], true);
        assert_eq!(json["token"], "t");
    }
}
