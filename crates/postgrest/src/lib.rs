//! PostgREST client for the Lapas session component
//!
//! Covers the query surface the profile store needs:
//!
//! - `select` with `eq` filters and `limit`
//! - `single` lookups with a distinguishable *no rows* error
//! - `insert` and `update` returning the written representation

use std::fmt;

use log::debug;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;

/// PostgREST error code for "JSON object requested, multiple (or no) rows returned".
pub const NO_ROWS_CODE: &str = "PGRST116";

const OBJECT_MEDIA_TYPE: &str = "application/vnd.pgrst.object+json";

/// PostgREST APIエラーの詳細情報
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PostgrestApiErrorDetails {
    pub code: Option<String>,
    pub message: Option<String>,
    pub details: Option<String>,
    pub hint: Option<String>,
}

impl fmt::Display for PostgrestApiErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(code) = &self.code {
            parts.push(format!("Code: {}", code));
        }
        if let Some(message) = &self.message {
            parts.push(format!("Message: {}", message));
        }
        if let Some(details) = &self.details {
            parts.push(format!("Details: {}", details));
        }
        if let Some(hint) = &self.hint {
            parts.push(format!("Hint: {}", hint));
        }
        write!(f, "{}", parts.join(", "))
    }
}

/// エラー型
#[derive(Error, Debug)]
pub enum PostgrestError {
    #[error("API error: {details} (Status: {status})")]
    ApiError {
        details: PostgrestApiErrorDetails,
        status: StatusCode,
    },

    #[error("API error (unparsed): {message} (Status: {status})")]
    UnparsedApiError { message: String, status: StatusCode },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

impl PostgrestError {
    /// True when a `single` lookup matched no row.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            PostgrestError::ApiError { details, .. }
                if details.code.as_deref() == Some(NO_ROWS_CODE)
        )
    }

    /// The HTTP status the server answered with, if it answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            PostgrestError::ApiError { status, .. }
            | PostgrestError::UnparsedApiError { status, .. } => Some(*status),
            PostgrestError::NetworkError(e) => e.status(),
            _ => None,
        }
    }

    async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error response".to_string());

        match serde_json::from_str::<PostgrestApiErrorDetails>(&error_text) {
            Ok(details) => PostgrestError::ApiError { details, status },
            Err(_) => PostgrestError::UnparsedApiError {
                message: error_text,
                status,
            },
        }
    }
}

/// PostgREST クライアント
#[derive(Debug, Clone)]
pub struct PostgrestClient {
    base_url: String,
    table: String,
    http_client: Client,
    headers: HeaderMap,
    query_params: Vec<(String, String)>,
}

impl PostgrestClient {
    /// 新しい PostgREST クライアントを作成
    pub fn new(
        base_url: &str,
        api_key: &str,
        table: &str,
        http_client: Client,
    ) -> Result<Self, PostgrestError> {
        let client = Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            table: table.to_string(),
            http_client,
            headers: HeaderMap::new(),
            query_params: Vec::new(),
        };
        client
            .with_header("apikey", api_key)?
            .with_header("Content-Type", "application/json")
    }

    /// ヘッダーを追加
    pub fn with_header(mut self, key: &str, value: &str) -> Result<Self, PostgrestError> {
        let header_value = HeaderValue::from_str(value).map_err(|_| {
            PostgrestError::InvalidParameters(format!("Invalid header value for {}", key))
        })?;
        let header_name = HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
            PostgrestError::InvalidParameters(format!("Invalid header name: {}", key))
        })?;

        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    /// 認証トークンを設定
    pub fn with_auth(self, token: &str) -> Result<Self, PostgrestError> {
        self.with_header("Authorization", &format!("Bearer {}", token))
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// 取得するカラムを指定
    pub fn select(mut self, columns: &str) -> Self {
        self.set_param("select", columns.to_string());
        self
    }

    /// 等価フィルター
    pub fn eq(mut self, column: &str, value: &str) -> Self {
        self.set_param(column, format!("eq.{}", value));
        self
    }

    /// 取得件数の上限
    pub fn limit(mut self, count: u32) -> Self {
        self.set_param("limit", count.to_string());
        self
    }

    fn set_param(&mut self, key: &str, value: String) {
        match self.query_params.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.query_params.push((key.to_string(), value)),
        }
    }

    fn build_url(&self) -> Result<String, PostgrestError> {
        let mut url = Url::parse(&format!("{}/rest/v1/{}", self.base_url, self.table))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query_params {
                pairs.append_pair(key, value);
            }
        }
        Ok(url.to_string())
    }

    /// データを取得
    pub async fn execute<T: DeserializeOwned>(&self) -> Result<Vec<T>, PostgrestError> {
        let response = self.send(Method::GET, self.headers.clone(), None).await?;
        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| PostgrestError::DeserializationError(e.to_string()))
    }

    /// 1行だけ取得
    ///
    /// Zero or several matching rows yield an [`PostgrestError::ApiError`]
    /// with code [`NO_ROWS_CODE`]; see [`PostgrestError::is_not_found`].
    pub async fn single<T: DeserializeOwned>(&self) -> Result<T, PostgrestError> {
        let mut headers = self.headers.clone();
        headers.insert(ACCEPT, HeaderValue::from_static(OBJECT_MEDIA_TYPE));

        let response = self.send(Method::GET, headers, None).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| PostgrestError::DeserializationError(e.to_string()))
    }

    /// データを挿入
    pub async fn insert<T: Serialize>(&self, values: T) -> Result<Value, PostgrestError> {
        let body = serde_json::to_value(values)?;
        let response = self
            .send(Method::POST, self.representation_headers(), Some(body))
            .await?;
        Self::read_representation(response).await
    }

    /// データを更新
    pub async fn update<T: Serialize>(&self, values: T) -> Result<Value, PostgrestError> {
        let body = serde_json::to_value(values)?;
        let response = self
            .send(Method::PATCH, self.representation_headers(), Some(body))
            .await?;
        Self::read_representation(response).await
    }

    fn representation_headers(&self) -> HeaderMap {
        let mut headers = self.headers.clone();
        headers.insert(
            HeaderName::from_static("prefer"),
            HeaderValue::from_static("return=representation"),
        );
        headers
    }

    async fn send(
        &self,
        method: Method,
        headers: HeaderMap,
        body: Option<Value>,
    ) -> Result<reqwest::Response, PostgrestError> {
        let url = self.build_url()?;
        debug!("{} {}", method, url);

        let mut request = self.http_client.request(method, &url).headers(headers);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(PostgrestError::NetworkError)?;
        if !response.status().is_success() {
            return Err(PostgrestError::from_response(response).await);
        }
        Ok(response)
    }

    async fn read_representation(response: reqwest::Response) -> Result<Value, PostgrestError> {
        let body_text = response.text().await.map_err(|e| {
            PostgrestError::DeserializationError(format!("Failed to read response body: {}", e))
        })?;

        // 204 No Content happens when the server ignores the Prefer header.
        if body_text.trim().is_empty() {
            Ok(Value::Null)
        } else {
            serde_json::from_str::<Value>(&body_text)
                .map_err(|e| PostgrestError::DeserializationError(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> PostgrestClient {
        PostgrestClient::new("https://example.supabase.co/", "anon", "profiles", Client::new())
            .unwrap()
    }

    #[test]
    fn build_url_keeps_filter_order_and_overrides_duplicates() {
        let url = client()
            .select("*")
            .eq("email", "admin@lapas.demo")
            .eq("is_demo", "true")
            .eq("email", "mitra@company.demo")
            .build_url()
            .unwrap();

        assert_eq!(
            url,
            "https://example.supabase.co/rest/v1/profiles?select=*&email=eq.mitra%40company.demo&is_demo=eq.true"
        );
    }

    #[test]
    fn not_found_is_detected_from_code() {
        let err = PostgrestError::ApiError {
            details: PostgrestApiErrorDetails {
                code: Some(NO_ROWS_CODE.to_string()),
                message: Some("JSON object requested, multiple (or no) rows returned".into()),
                details: Some("The result contains 0 rows".into()),
                hint: None,
            },
            status: StatusCode::NOT_ACCEPTABLE,
        };
        assert!(err.is_not_found());
        assert_eq!(err.status(), Some(StatusCode::NOT_ACCEPTABLE));

        let other = PostgrestError::UnparsedApiError {
            message: "boom".into(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
        };
        assert!(!other.is_not_found());
    }

    #[test]
    fn rejects_invalid_api_key_header() {
        let result = PostgrestClient::new("https://example.supabase.co", "bad\nkey", "profiles", Client::new());
        assert!(matches!(result, Err(PostgrestError::InvalidParameters(_))));
    }
}
