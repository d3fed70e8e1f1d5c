use async_trait::async_trait;
use media_sync_models::RemoteTable;
use reqwest::{Client, Method, RequestBuilder};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::RemoteError;
use crate::postgrest::api;
use crate::traits::{Order, RemoteStore};

pub fn create_postgrest_client(timeout: Duration) -> Client {
    Client::builder()
        .user_agent(concat!("mediashelf/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

#[derive(Clone)]
pub struct PostgrestRemote {
    client: Arc<Client>,
    base_url: String,
    api_key: String,
    access_token: Option<String>,
}

impl PostgrestRemote {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Arc::new(create_postgrest_client(timeout)),
            base_url: base_url.into(),
            api_key: api_key.into(),
            access_token: None,
        }
    }

    /// Act as a signed-in user instead of the anonymous key
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.api_key);
        self.client
            .request(method, url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", bearer))
            .header("Accept", "application/json")
    }
}

#[async_trait]
impl RemoteStore for PostgrestRemote {
    fn name(&self) -> &str {
        "postgrest"
    }

    async fn insert(&self, table: RemoteTable, row: Value) -> Result<Value, RemoteError> {
        let url = api::table_url(&self.base_url, table);
        debug!(table = %table, "PostgREST upsert");

        let response = self
            .request(Method::POST, &url)
            .header("Prefer", api::UPSERT_PREFER)
            .json(&[&row])
            .send()
            .await?;
        let body = api::check(response).await?.text().await?;

        Ok(api::parse_rows(&body)?.into_iter().next().unwrap_or(row))
    }

    async fn update(&self, table: RemoteTable, id: &str, fields: Value) -> Result<(), RemoteError> {
        let url = api::record_url(&self.base_url, table, id);
        debug!(table = %table, id = %id, "PostgREST patch");

        let response = self
            .request(Method::PATCH, &url)
            .header("Prefer", api::MINIMAL_PREFER)
            .json(&fields)
            .send()
            .await?;
        api::check(response).await?;
        Ok(())
    }

    async fn delete(&self, table: RemoteTable, id: &str) -> Result<(), RemoteError> {
        let url = api::record_url(&self.base_url, table, id);
        debug!(table = %table, id = %id, "PostgREST delete");

        // Deleting a missing row matches nothing and still succeeds
        let response = self
            .request(Method::DELETE, &url)
            .header("Prefer", api::MINIMAL_PREFER)
            .send()
            .await?;
        api::check(response).await?;
        Ok(())
    }

    async fn select(&self, table: RemoteTable, order: Order) -> Result<Vec<Value>, RemoteError> {
        let url = api::select_url(&self.base_url, table, &order);
        debug!(table = %table, "PostgREST select");

        let response = self.request(Method::GET, &url).send().await?;
        let body = api::check(response).await?.text().await?;
        api::parse_rows(&body)
    }

    async fn ping(&self) -> Result<(), RemoteError> {
        let response = self
            .request(Method::GET, &api::rest_root(&self.base_url))
            .send()
            .await?;
        let status = response.status().as_u16();
        if status < 500 {
            Ok(())
        } else {
            Err(RemoteError::from_status(status, ""))
        }
    }
}
