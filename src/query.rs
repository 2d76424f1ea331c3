//! Per-resource query builders
//!
//! Chain methods are synchronous and only accumulate clauses. The single
//! suspend point is `execute`, which consumes the builder and issues exactly
//! one request.

use crate::client::{Client, PreparedRequest, MERGE_DUPLICATES, RETURN_REPRESENTATION};
use crate::error::{ApiError, ApiResult};
use crate::types::{Direction, FilterOperator};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Display;
use std::time::Duration;
use tracing::{debug, warn};

/// Read query against a single resource
///
/// ```rust,no_run
/// # use athlehub_client::{Client, Direction};
/// # async fn example(client: Client) -> athlehub_client::ApiResult<()> {
/// let matches: Vec<serde_json::Value> = client
///     .from("matches")
///     .select("*")
///     .eq("user_id", "u1")
///     .order_by("match_date", Direction::Descending)
///     .execute()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[must_use = "a query does nothing until `execute` is awaited"]
pub struct QueryBuilder {
    client: Client,
    resource: String,
    selection: Option<String>,
    clauses: Vec<String>,
    timeout: Option<Duration>,
}

impl QueryBuilder {
    pub(crate) fn new(client: Client, resource: &str) -> Self {
        Self {
            client,
            resource: resource.to_string(),
            selection: None,
            clauses: Vec::new(),
            timeout: None,
        }
    }

    /// Column selection, e.g. `"*"` or `"id,name"`. Replaces any earlier selection.
    pub fn select(mut self, columns: &str) -> Self {
        self.selection = Some(format!("select={columns}"));
        self
    }

    /// `column = value`. Repeated calls are ANDed.
    pub fn eq(mut self, column: &str, value: impl Display) -> Self {
        self.clauses
            .push(format!("{column}=eq.{}", encode_value(value)));
        self
    }

    /// Ascending order on `column`
    pub fn order(self, column: &str) -> Self {
        self.order_by(column, Direction::Ascending)
    }

    pub fn order_by(mut self, column: &str, direction: Direction) -> Self {
        self.clauses
            .push(format!("order={column}.{}", direction.as_str()));
        self
    }

    /// Cap the number of returned rows
    pub fn limit(mut self, count: usize) -> Self {
        self.clauses.push(format!("limit={count}"));
        self
    }

    /// Negated comparison: `column NOT <operator> value`
    pub fn not(mut self, column: &str, operator: FilterOperator, value: impl Display) -> Self {
        self.clauses
            .push(format!("{column}=not.{operator}.{}", encode_value(value)));
        self
    }

    /// Deadline for this request, overriding the client-wide one
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Selection and clauses joined with `&`, in call order
    pub fn query_string(&self) -> String {
        self.selection
            .iter()
            .chain(self.clauses.iter())
            .filter(|segment| !segment.is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Expect at most one row. Adds a `limit=1` clause.
    pub fn single(mut self) -> SingleQuery {
        self.clauses.push("limit=1".to_string());
        SingleQuery { query: self }
    }

    /// Insert `rows` (one object or an array), echoing the created rows
    pub fn insert(self, rows: impl Serialize) -> Mutation {
        Mutation::new(self, rows, RETURN_REPRESENTATION)
    }

    /// Insert or, on primary-key conflict, merge `rows`
    pub fn upsert(self, rows: impl Serialize) -> Mutation {
        Mutation::new(self, rows, MERGE_DUPLICATES)
    }

    /// Fetch all matching rows
    ///
    /// A success body that is not an array resolves to
    /// [`ApiError::UnexpectedShape`].
    pub async fn execute<T: DeserializeOwned>(self) -> ApiResult<Vec<T>> {
        let client = self.client.clone();
        let request = self.read_request();
        let response = client.send(request).await?;

        match response.body {
            body @ Value::Array(_) => {
                serde_json::from_value(body).map_err(|source| ApiError::Decode {
                    status: response.status,
                    source,
                })
            }
            other => Err(ApiError::UnexpectedShape(other)),
        }
    }

    fn read_request(self) -> PreparedRequest {
        let query = self.query_string();
        let mut url = self.client.config().rest_url(&self.resource);
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query);
        }
        debug!(resource = %self.resource, query = %query, "Executing read");

        PreparedRequest {
            method: Method::GET,
            url,
            prefer: RETURN_REPRESENTATION,
            body: None,
            timeout: self.timeout,
        }
    }
}

/// Read query resolving to at most one row
#[must_use = "a query does nothing until `execute` is awaited"]
pub struct SingleQuery {
    query: QueryBuilder,
}

impl SingleQuery {
    pub fn query_string(&self) -> String {
        self.query.query_string()
    }

    /// `Ok(None)` when nothing matched. A bare-object body is accepted as the row.
    pub async fn execute<T: DeserializeOwned>(self) -> ApiResult<Option<T>> {
        let client = self.query.client.clone();
        let response = client.send(self.query.read_request()).await?;

        let row = match response.body {
            Value::Array(rows) => rows.into_iter().next(),
            Value::Null => None,
            other => Some(other),
        };

        row.map(serde_json::from_value)
            .transpose()
            .map_err(|source| ApiError::Decode {
                status: response.status,
                source,
            })
    }
}

/// Insert or upsert, executed as a single POST
///
/// Mutations always target the bare resource URL. Filters, ordering, limits
/// and selection accumulated on the builder beforehand are not sent; they are
/// logged at `warn` and exposed through [`Mutation::ignored`].
#[must_use = "a mutation does nothing until `execute` is awaited"]
pub struct Mutation {
    client: Client,
    resource: String,
    body: Result<Value, serde_json::Error>,
    prefer: &'static str,
    timeout: Option<Duration>,
    ignored: String,
}

impl Mutation {
    fn new(query: QueryBuilder, rows: impl Serialize, prefer: &'static str) -> Self {
        let ignored = query.query_string();
        if !ignored.is_empty() {
            warn!(
                resource = %query.resource,
                ignored = %ignored,
                "Mutation does not send filters or selection"
            );
        }

        Self {
            client: query.client,
            resource: query.resource,
            body: serde_json::to_value(rows),
            prefer,
            timeout: query.timeout,
            ignored,
        }
    }

    /// Clauses accumulated before `insert`/`upsert` that will not be sent
    pub fn ignored(&self) -> &str {
        &self.ignored
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Send the rows; resolves to whatever the backend echoes back
    pub async fn execute<T: DeserializeOwned>(self) -> ApiResult<T> {
        let body = self.body.map_err(ApiError::Encode)?;

        self.client.auth().ensure_access_token().await;

        debug!(resource = %self.resource, prefer = self.prefer, "Executing mutation");
        let response = self
            .client
            .send(PreparedRequest {
                method: Method::POST,
                url: self.client.config().rest_url(&self.resource),
                prefer: self.prefer,
                body: Some(body),
                timeout: self.timeout,
            })
            .await?;

        serde_json::from_value(response.body).map_err(|source| ApiError::Decode {
            status: response.status,
            source,
        })
    }
}

fn encode_value(value: impl Display) -> String {
    urlencoding::encode(&value.to_string()).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::storage::MemoryStorage;
    use std::sync::Arc;

    fn client() -> Client {
        Client::new(
            ClientConfig::new("http://localhost:54321", "anon"),
            Arc::new(MemoryStorage::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_select_then_order() {
        let query = client().from("sports").select("*").order("name");
        assert_eq!(query.query_string(), "select=*&order=name.asc");
    }

    #[test]
    fn test_select_last_call_wins() {
        let query = client()
            .from("profiles")
            .select("id")
            .eq("id", "u1")
            .select("id,username");
        assert_eq!(query.query_string(), "select=id,username&id=eq.u1");
    }

    #[test]
    fn test_clauses_keep_call_order() {
        let query = client()
            .from("matches")
            .eq("user_id", "u1")
            .order_by("match_date", Direction::Descending)
            .not("team_a_score", FilterOperator::Is, "null")
            .limit(20)
            .eq("sport_id", 3)
            .order("id");

        assert_eq!(
            query.query_string(),
            "user_id=eq.u1&order=match_date.desc&team_a_score=not.is.null&limit=20&sport_id=eq.3&order=id.asc"
        );
    }

    #[test]
    fn test_no_clauses() {
        assert_eq!(client().from("sports").query_string(), "");
    }

    #[test]
    fn test_values_are_percent_encoded() {
        let query = client()
            .from("profiles")
            .eq("email", "a@b.com")
            .not("username", FilterOperator::Eq, "two words&more");
        assert_eq!(
            query.query_string(),
            "email=eq.a%40b.com&username=not.eq.two%20words%26more"
        );
    }

    #[test]
    fn test_single_appends_limit() {
        let single = client().from("profiles").select("*").eq("id", "u1").single();
        assert_eq!(single.query_string(), "select=*&id=eq.u1&limit=1");
    }

    #[test]
    fn test_mutation_records_dropped_clauses() {
        let mutation = client()
            .from("matches")
            .select("id")
            .eq("user_id", "u1")
            .limit(5)
            .insert(serde_json::json!({"sport_id": 1}));
        assert_eq!(mutation.ignored(), "select=id&user_id=eq.u1&limit=5");

        let plain = client().from("matches").upsert(serde_json::json!({"id": 1}));
        assert_eq!(plain.ignored(), "");
    }

    #[tokio::test]
    async fn test_unserializable_rows_fail_at_execute() {
        use std::collections::HashMap;

        // Non-string map keys cannot become JSON object keys
        let mut rows = HashMap::new();
        rows.insert((1, 2), "x");

        let result = client().from("matches").insert(rows).execute::<Value>().await;
        assert!(matches!(result, Err(ApiError::Encode(_))));
    }
}
