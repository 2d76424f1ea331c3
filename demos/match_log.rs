//! Sign in, list sports and log a match result
//!
//! Usage:
//!   ATHLEHUB_URL=https://<project>.supabase.co ATHLEHUB_ANON_KEY=<key> \
//!   ATHLEHUB_EMAIL=a@b.com ATHLEHUB_PASSWORD=pw cargo run --example match_log

use athlehub_client::{Client, ClientConfig, Direction, FileStorage};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct Sport {
    id: i64,
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ClientConfig::from_env()?;
    let session_dir = std::env::var("ATHLEHUB_SESSION_DIR")
        .unwrap_or_else(|_| ".athlehub-session".to_string());

    println!("=== Athlehub Client Example ===");
    println!("Backend: {}", config.base_url);
    println!("Session dir: {}", session_dir);
    println!();

    let client = Client::new(config, Arc::new(FileStorage::new(session_dir)))?;

    // Reuse a persisted session when there is one
    let session = match client.auth().get_session().await? {
        Some(session) => {
            println!("✓ Restored session from disk");
            session
        }
        None => {
            let email = std::env::var("ATHLEHUB_EMAIL")?;
            let password = std::env::var("ATHLEHUB_PASSWORD")?;
            client.auth().sign_in_with_password(&email, &password).await?;
            println!("✓ Signed in as {}", email);
            client
                .auth()
                .get_session()
                .await?
                .ok_or("sign-in returned no session")?
        }
    };

    let user_id = session
        .user
        .as_ref()
        .map(|u| u.id.clone())
        .ok_or("session carries no user")?;

    let sports: Vec<Sport> = client.from("sports").select("*").order("name").execute().await?;
    println!("Sports:");
    for sport in &sports {
        println!("  - [{}] {}", sport.id, sport.name);
    }
    println!();

    let Some(sport) = sports.first() else {
        println!("No sports configured, nothing to log");
        return Ok(());
    };

    let created: Vec<Value> = client
        .from("matches")
        .insert(json!([{
            "user_id": user_id,
            "sport_id": sport.id,
            "team_a_name": "Team A",
            "team_b_name": "Team B",
            "team_a_score": 21,
            "team_b_score": 18,
        }]))
        .execute()
        .await?;
    println!("✓ Logged {} match(es) for {}", created.len(), sport.name);

    let history: Vec<Value> = client
        .from("matches")
        .select("*")
        .eq("user_id", &user_id)
        .order_by("match_date", Direction::Descending)
        .limit(5)
        .execute()
        .await?;
    println!("Recent matches: {}", history.len());

    Ok(())
}
