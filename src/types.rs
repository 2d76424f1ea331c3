//! Type definitions for sessions and query clauses

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Authenticated user identity as returned by the auth endpoints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Remaining backend fields (metadata, timestamps, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Persisted session: the bearer credential plus the identity it belongs to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Raw payload of the signup and token endpoints
///
/// Signup nests the credential under `session`; the password grant returns it
/// at the top level next to `user`. Everything else is kept in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<Session>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AuthPayload {
    /// Session built from a password-grant payload, where the token fields sit
    /// at the top level. `None` unless both `user` and `access_token` are present.
    pub fn token_session(&self) -> Option<Session> {
        if self.user.is_none() || self.access_token.is_none() {
            return None;
        }
        let value = serde_json::to_value(self).ok()?;
        serde_json::from_value(value).ok()
    }

    /// Session nested in a signup payload. `None` unless `user` is present too.
    pub fn signup_session(&self) -> Option<Session> {
        self.user.as_ref()?;
        self.session.clone()
    }
}

/// Authentication state broadcast to subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    SignedOut,
    SignedIn(Session),
}

/// Sort direction for `order` clauses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Ascending => "asc",
            Direction::Descending => "desc",
        }
    }
}

/// Comparison operators accepted by negated filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    Ilike,
    Is,
    In,
}

impl FilterOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "eq",
            FilterOperator::Neq => "neq",
            FilterOperator::Gt => "gt",
            FilterOperator::Gte => "gte",
            FilterOperator::Lt => "lt",
            FilterOperator::Lte => "lte",
            FilterOperator::Like => "like",
            FilterOperator::Ilike => "ilike",
            FilterOperator::Is => "is",
            FilterOperator::In => "in",
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_token_session_from_password_grant() {
        let payload: AuthPayload = serde_json::from_value(json!({
            "access_token": "tok123",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "r1",
            "user": {"id": "u1", "email": "a@b.com", "role": "authenticated"}
        }))
        .unwrap();

        let session = payload.token_session().unwrap();
        assert_eq!(session.access_token, "tok123");
        assert_eq!(session.token_type.as_deref(), Some("bearer"));
        assert_eq!(session.expires_in, Some(3600));
        assert_eq!(session.refresh_token.as_deref(), Some("r1"));

        let user = session.user.unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(user.email.as_deref(), Some("a@b.com"));
        assert_eq!(user.extra.get("role"), Some(&json!("authenticated")));
    }

    #[test]
    fn test_token_session_requires_user_and_token() {
        let no_user: AuthPayload = serde_json::from_value(json!({"access_token": "tok"})).unwrap();
        assert!(no_user.token_session().is_none());

        let no_token: AuthPayload = serde_json::from_value(json!({"user": {"id": "u1"}})).unwrap();
        assert!(no_token.token_session().is_none());
    }

    #[test]
    fn test_signup_session() {
        let payload: AuthPayload = serde_json::from_value(json!({
            "user": {"id": "u2"},
            "session": {"access_token": "tok456", "user": {"id": "u2"}}
        }))
        .unwrap();
        assert_eq!(payload.signup_session().unwrap().access_token, "tok456");

        // Email confirmation pending: user without session
        let pending: AuthPayload = serde_json::from_value(json!({"user": {"id": "u3"}})).unwrap();
        assert!(pending.signup_session().is_none());
    }

    #[test]
    fn test_operator_names() {
        assert_eq!(FilterOperator::Is.to_string(), "is");
        assert_eq!(FilterOperator::Ilike.as_str(), "ilike");
        assert_eq!(Direction::default().as_str(), "asc");
        assert_eq!(Direction::Descending.as_str(), "desc");
    }
}
