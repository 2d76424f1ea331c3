//! Athlehub Rust Client
//!
//! A Rust client for the Athlehub match-logging backend's REST API, with a
//! fluent query builder and persisted bearer-token sessions that survive
//! process restarts.
//!
//! ```rust,no_run
//! use athlehub_client::{Client, ClientConfig, FileStorage};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::from_env()?;
//! let client = Client::new(config, Arc::new(FileStorage::new(".athlehub-session")))?;
//!
//! client.auth().sign_in_with_password("a@b.com", "pw").await?;
//!
//! let sports: Vec<serde_json::Value> = client
//!     .from("sports")
//!     .select("*")
//!     .order("name")
//!     .execute()
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod auth_client;
pub mod client;
pub mod config;
pub mod error;
pub mod query;
pub mod storage;
pub mod token_store;
pub mod types;

pub use auth_client::Auth;
pub use client::Client;
pub use config::ClientConfig;
pub use error::{ApiError, ApiResult, ClientError, Result, StorageError};
pub use query::{Mutation, QueryBuilder, SingleQuery};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage};
pub use token_store::{resolve_credential, CredentialSource, TokenStore};
pub use types::{AuthPayload, AuthState, Direction, FilterOperator, Session, User};
