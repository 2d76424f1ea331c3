// Authentication vertical: password sign-up/sign-in, sign-out and local session access

use crate::client::{Client, PreparedRequest, RETURN_REPRESENTATION};
use crate::error::{ApiError, ApiResult};
use crate::token_store::redact;
use crate::types::{AuthPayload, AuthState, Session};
use reqwest::Method;
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Auth operations bound to a [`Client`]
///
/// Obtained through [`Client::auth`]. Successful sign-up and sign-in persist
/// the credential through the client's token store, so every later request
/// carries it.
pub struct Auth<'a> {
    client: &'a Client,
}

impl<'a> Auth<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Register a new account
    ///
    /// The session is persisted only when the backend returns both `user` and
    /// `session`; with email confirmation enabled it returns the user alone.
    pub async fn sign_up(&self, email: &str, password: &str) -> ApiResult<AuthPayload> {
        let payload = self.post_credentials("signup", email, password).await?;

        match payload.signup_session() {
            Some(session) => self.persist(session).await,
            None => debug!("Sign-up returned no session, nothing persisted"),
        }

        Ok(payload)
    }

    /// Exchange email and password for an access token
    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> ApiResult<AuthPayload> {
        let payload = self
            .post_credentials("token?grant_type=password", email, password)
            .await?;

        match payload.token_session() {
            Some(session) => self.persist(session).await,
            None => warn!("Sign-in response carried no user or access token, nothing persisted"),
        }

        Ok(payload)
    }

    /// Forget the stored credential, session and user record
    ///
    /// Purely local. Subscribers see [`AuthState::SignedOut`] even when a
    /// durable removal fails; the failure is still returned.
    pub async fn sign_out(&self) -> ApiResult<()> {
        let cleared = self.client.token_store().clear().await;
        self.client.auth_state().send_replace(AuthState::SignedOut);

        match cleared {
            Ok(()) => {
                info!("Signed out");
                Ok(())
            }
            Err(e) => Err(ApiError::Storage(e)),
        }
    }

    /// Last persisted session, without contacting the backend
    ///
    /// Also copies the durable credential into the memory tier.
    pub async fn get_session(&self) -> ApiResult<Option<Session>> {
        let tokens = self.client.token_store();

        match tokens.refresh_from_durable().await {
            Ok(Some(token)) => debug!(token = %redact(&token), "Session credential available"),
            Ok(None) => debug!("No access token found in storage or memory"),
            Err(e) => warn!(error = %e, "Failed to read access token, keeping memory copy"),
        }

        let session = tokens.load_session().await?;
        if let Some(session) = &session {
            self.client.auth_state().send_if_modified(|state| match state {
                AuthState::SignedIn(current) if current == session => false,
                _ => {
                    *state = AuthState::SignedIn(session.clone());
                    true
                }
            });
        }

        Ok(session)
    }

    /// Make sure the freshest credential is loaded; `true` when one exists
    pub async fn ensure_access_token(&self) -> bool {
        let tokens = self.client.token_store();
        match tokens.refresh_from_durable().await {
            Ok(token) => token.is_some(),
            Err(e) => {
                warn!(error = %e, "Failed to read access token, falling back to memory copy");
                tokens.memory().get().is_some()
            }
        }
    }

    /// Watch sign-in and sign-out transitions
    ///
    /// The channel starts at [`AuthState::SignedOut`] even when a session is
    /// persisted, because constructing a [`Client`] does no I/O. Call
    /// [`Auth::get_session`] after subscribing to publish a restored session.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.client.auth_state().subscribe()
    }

    async fn post_credentials(&self, path: &str, email: &str, password: &str) -> ApiResult<AuthPayload> {
        let response = self
            .client
            .send(PreparedRequest {
                method: Method::POST,
                url: self.client.config().auth_url(path),
                prefer: RETURN_REPRESENTATION,
                body: Some(json!({ "email": email, "password": password })),
                timeout: None,
            })
            .await?;

        serde_json::from_value(response.body).map_err(|source| ApiError::Decode {
            status: response.status,
            source,
        })
    }

    async fn persist(&self, session: Session) {
        self.client
            .token_store()
            .save(&session.access_token, &session)
            .await;

        info!(
            user_id = session.user.as_ref().map(|u| u.id.as_str()).unwrap_or_default(),
            token = %redact(&session.access_token),
            "Signed in"
        );
        self.client.auth_state().send_replace(AuthState::SignedIn(session));
    }
}
