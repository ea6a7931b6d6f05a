use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderValue, USER_AGENT};
use reqwest::{Method, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use thiserror::Error;

use crate::model::{Page, Profile, TeamInfo};

const PAGE_LIMIT: usize = 1000;

#[derive(Debug, Clone)]
pub struct ResponseData {
    pub status: u16,
    pub body: String,
    pub json: Option<Value>,
}

impl ResponseData {
    /// Deserializes the body; an empty body decodes as JSON `null`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let text = if self.body.trim().is_empty() {
            "null"
        } else {
            self.body.as_str()
        };
        serde_json::from_str(text).context("decoding response body")
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{method} {path} failed with HTTP {status}: {body}")]
    Status {
        method: Method,
        path: String,
        status: u16,
        body: String,
    },
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: Url,
    http: Client,
    api_key: String,
}

impl ApiClient {
    pub fn new(base_url: &str, api_key: &str, verify_tls: bool) -> Result<Self> {
        let mut normalized = base_url.trim().to_string();
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        let parsed = Url::parse(&normalized).context("parsing base URL")?;
        let http = Client::builder()
            .user_agent(HeaderValue::from_static("afadmin/0.1"))
            .danger_accept_invalid_certs(!verify_tls)
            .timeout(Duration::from_secs(60))
            .build()
            .context("building HTTP client")?;

        if !verify_tls {
            tracing::warn!("TLS certificate verification is disabled");
        }

        Ok(Self {
            base_url: parsed,
            http,
            api_key: api_key.to_string(),
        })
    }

    pub fn get(&self, path: &str, query: &[(&str, String)]) -> Result<ResponseData> {
        self.request(Method::GET, path, query, Option::<&Value>::None)
    }

    pub fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        query: &[(&str, String)],
        body: Option<&T>,
    ) -> Result<ResponseData> {
        self.request(Method::POST, path, query, body)
    }

    pub fn put_json<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<ResponseData> {
        self.request(Method::PUT, path, &[], Some(body))
    }

    /// Walks an offset/limit search endpoint until `totalItems` is reached.
    pub fn fetch_all_pages<T, B>(&self, path: &str, body: &B) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let mut items = Vec::new();
        let mut offset = 0usize;

        loop {
            let query = [
                ("offset", offset.to_string()),
                ("limit", PAGE_LIMIT.to_string()),
            ];
            let page: Page<T> = self
                .post_json(path, &query, Some(body))?
                .decode()
                .with_context(|| format!("decoding page at offset {offset} of {path}"))?;

            let received = page.items.len();
            items.extend(page.items);
            offset += received;
            tracing::debug!(path, received, offset, total = page.total_items, "fetched page");

            if received == 0 || offset >= page.total_items {
                break;
            }
        }

        Ok(items)
    }

    pub fn current_user_id(&self) -> Result<String> {
        let profile: Profile = self.get("/api/profile", &[])?.decode()?;
        Ok(profile.id)
    }

    pub fn team_info(&self) -> Result<TeamInfo> {
        self.get("/api/team", &[])?.decode()
    }

    fn request<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&T>,
    ) -> Result<ResponseData> {
        let normalized = path.trim_start_matches('/');
        let url = self
            .base_url
            .join(normalized)
            .with_context(|| format!("joining path `{}` to base URL", path))?;

        tracing::debug!(%method, %url, "sending request");

        let mut request = self
            .http
            .request(method.clone(), url)
            .bearer_auth(&self.api_key)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .header(USER_AGENT, HeaderValue::from_static("afadmin/0.1"));

        if !query.is_empty() {
            request = request.query(query);
        }

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .with_context(|| format!("sending {method} {path}"))?;

        let status = response.status();
        let text = response.text().context("reading response body")?;

        if !status.is_success() {
            return Err(ApiError::Status {
                method,
                path: path.to_string(),
                status: status.as_u16(),
                body: text,
            }
            .into());
        }

        let json = serde_json::from_str(&text).ok();

        Ok(ResponseData {
            status: status.as_u16(),
            body: text,
            json,
        })
    }
}

/// Body shared by the archived-aware search endpoints.
pub fn active_search() -> Value {
    json!({ "archived": false })
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn sends_bearer_token_and_parses_json() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/profile")
                .header("Authorization", "Bearer test-key");
            then.status(200).json_body(json!({"id": "user-1"}));
        });

        let client = ApiClient::new(&server.base_url(), "test-key", true).unwrap();
        let id = client.current_user_id().unwrap();

        mock.assert();
        assert_eq!(id, "user-1");
    }

    #[test]
    fn keeps_base_url_path_prefix() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/tenant/api/team");
            then.status(200)
                .json_body(json!({"state": {"seats": {"any": {"total": 10, "used": 4, "free": 6}}}}));
        });

        let client = ApiClient::new(&server.url("/tenant"), "k", true).unwrap();
        let team = client.team_info().unwrap();

        mock.assert();
        assert_eq!(team.seats().total, 10);
        assert_eq!(team.seats().free, 6);
    }

    #[test]
    fn surfaces_error_status_and_body() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/team/users/role");
            then.status(403).body("forbidden for this key");
        });

        let client = ApiClient::new(&server.base_url(), "k", true).unwrap();
        let err = client
            .post_json("/api/team/users/role", &[], Some(&json!({"role": "editor"})))
            .unwrap_err();

        let api = err.downcast_ref::<ApiError>().expect("typed api error");
        let ApiError::Status { status, body, .. } = api;
        assert_eq!(*status, 403);
        assert!(body.contains("forbidden"));
    }

    #[test]
    fn empty_body_decodes_as_null() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(PUT).path("/api/fields/f-1");
            then.status(204);
        });

        let client = ApiClient::new(&server.base_url(), "k", true).unwrap();
        let response = client.put_json("/api/fields/f-1", &json!({})).unwrap();
        let decoded: Option<Value> = response.decode().unwrap();
        assert!(decoded.is_none());
        assert!(response.json.is_none());
    }

    #[test]
    fn follows_pagination_until_total_is_reached() {
        let server = MockServer::start();
        let first = server.mock(|when, then| {
            when.method(POST)
                .path("/api/workspaces/search")
                .query_param("offset", "0")
                .query_param("limit", "1000")
                .json_body(json!({"archived": false}));
            then.status(200).json_body(json!({
                "items": [{"id": "ws-1"}, {"id": "ws-2"}],
                "totalItems": 3
            }));
        });
        let second = server.mock(|when, then| {
            when.method(POST)
                .path("/api/workspaces/search")
                .query_param("offset", "2");
            then.status(200).json_body(json!({
                "items": [{"id": "ws-3"}],
                "totalItems": 3
            }));
        });

        let client = ApiClient::new(&server.base_url(), "k", true).unwrap();
        let items: Vec<Value> = client
            .fetch_all_pages("/api/workspaces/search", &active_search())
            .unwrap();

        first.assert();
        second.assert();
        assert_eq!(items.len(), 3);
        assert_eq!(items[2]["id"], "ws-3");
    }

    #[test]
    fn stops_on_empty_page() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/api/team/user-groups/search");
            then.status(200).json_body(json!({"items": [], "totalItems": 50}));
        });

        let client = ApiClient::new(&server.base_url(), "k", true).unwrap();
        let items: Vec<Value> = client
            .fetch_all_pages("/api/team/user-groups/search", &active_search())
            .unwrap();

        mock.assert_hits(1);
        assert!(items.is_empty());
    }
}
