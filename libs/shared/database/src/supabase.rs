use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
    Method, StatusCode,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use shared_config::AppConfig;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid header value: {0}")]
    Header(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl DatabaseError {
    /// Failures worth retrying: the request never reached the store, or the store
    /// answered with a server-side or throttling status.
    pub fn is_transient(&self) -> bool {
        match self {
            DatabaseError::Transport(_) => true,
            DatabaseError::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Unique-constraint violations surface as HTTP 409 from PostgREST.
    pub fn is_conflict(&self) -> bool {
        matches!(self, DatabaseError::Api { status: 409, .. })
    }
}

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.clone(),
            anon_key: config.supabase_anon_key.clone(),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>) -> Result<HeaderMap, DatabaseError> {
        let mut headers = HeaderMap::new();

        headers.insert(
            "apikey",
            HeaderValue::from_str(&self.anon_key)
                .map_err(|e| DatabaseError::Header(e.to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = auth_token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| DatabaseError::Header(e.to_string()))?,
            );
        }

        Ok(headers)
    }

    pub async fn request<T>(&self, method: Method, path: &str,
                            auth_token: Option<&str>, body: Option<Value>)
                            -> Result<T, DatabaseError>
    where T: DeserializeOwned {
        self.request_with_headers(method, path, auth_token, body, None).await
    }

    pub async fn request_with_headers<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
        extra_headers: Option<HeaderMap>,
    ) -> Result<T, DatabaseError>
    where T: DeserializeOwned {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut headers = self.get_headers(auth_token)?;
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url)
            .headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("API error ({}): {}", status, error_text);

            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => DatabaseError::Auth(error_text),
                StatusCode::NOT_FOUND => DatabaseError::NotFound(error_text),
                _ => DatabaseError::Api { status: status.as_u16(), message: error_text },
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| DatabaseError::Decode(e.to_string()))
    }

    /// Ask PostgREST to echo the written rows back.
    pub fn return_representation() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        headers
    }
}
