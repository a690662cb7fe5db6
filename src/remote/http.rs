//! PostgREST-style REST client.
//!
//! Collections live under `{base}/rest/v1/{collection}`. Rows are selected
//! with `column=eq.value` filters, ordered with `order=col.asc`, and writes
//! ask for the stored row back with `Prefer: return=representation`.

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response};

use super::{Filter, RemoteError, RemoteResult, RemoteStore, Row};
use crate::model::EntityKind;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// REST client for the remote store.
#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    access_token: Option<String>,
}

impl HttpRemoteStore {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            access_token: None,
        }
    }

    /// Authenticate as a signed-in user instead of the anonymous key.
    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    fn endpoint(&self, kind: EntityKind) -> String {
        format!("{}/rest/v1/{}", self.base_url, kind.collection())
    }

    fn request(&self, method: Method, kind: EntityKind) -> RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.api_key);
        self.client
            .request(method, self.endpoint(kind))
            .timeout(REQUEST_TIMEOUT)
            .header("apikey", &self.api_key)
            .bearer_auth(bearer)
    }

    async fn rows(response: Response) -> RemoteResult<Vec<Row>> {
        let response = check_status(response).await?;
        Ok(response.json::<Vec<Row>>().await?)
    }
}

async fn check_status(response: Response) -> RemoteResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(RemoteError::status(status.as_u16(), message))
}

fn order_clause(kind: EntityKind) -> Option<String> {
    let cols = kind.order_by();
    if cols.is_empty() {
        return None;
    }
    Some(
        cols.iter()
            .map(|c| format!("{c}.asc"))
            .collect::<Vec<_>>()
            .join(","),
    )
}

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

/// Double-quote a value for use inside a logic tree or array literal, where
/// commas and parentheses are syntax.
fn quoted(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

fn list_query(kind: EntityKind, filter: &Filter) -> Vec<(&'static str, String)> {
    let mut query = vec![("select", "*".to_string())];
    match filter {
        Filter::Trip(trip_id) => query.push(("trip_id", eq(trip_id))),
        Filter::VisibleTo(user) => {
            let user = quoted(user);
            query.push(("or", format!("(owner_id.eq.{user},shared_with.cs.{{{user}}})")));
        }
    }
    if let Some(order) = order_clause(kind) {
        query.push(("order", order));
    }
    query
}

impl RemoteStore for HttpRemoteStore {
    async fn get(
        &self,
        kind: EntityKind,
        id: &str,
        columns: Option<&'static [&'static str]>,
    ) -> RemoteResult<Option<Row>> {
        let select = columns.map_or_else(|| "*".to_string(), |cols| cols.join(","));
        let response = self
            .request(Method::GET, kind)
            .query(&[("id", eq(id)), ("select", select)])
            .send()
            .await?;
        Ok(Self::rows(response).await?.into_iter().next())
    }

    async fn list(&self, kind: EntityKind, filter: &Filter) -> RemoteResult<Vec<Row>> {
        let query = list_query(kind, filter);
        let response = self.request(Method::GET, kind).query(&query).send().await?;
        Self::rows(response).await
    }

    async fn insert(&self, kind: EntityKind, row: Row) -> RemoteResult<Row> {
        let response = self
            .request(Method::POST, kind)
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await?;
        Self::rows(response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::Decode(format!("insert into {kind} returned no row")))
    }

    async fn update(&self, kind: EntityKind, id: &str, row: Row) -> RemoteResult<Row> {
        let response = self
            .request(Method::PATCH, kind)
            .header("Prefer", "return=representation")
            .query(&[("id", eq(id))])
            .json(&row)
            .send()
            .await?;
        Self::rows(response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::status(404, format!("{kind} {id} not found")))
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> RemoteResult<()> {
        let response = self
            .request(Method::DELETE, kind)
            .query(&[("id", eq(id))])
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}
