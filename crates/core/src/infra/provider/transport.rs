use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;

use crate::domain::error::ApiError;

/// 成功レスポンスの本文。retrieve は JSON の代わりに動画本体を返すことがある。
#[derive(Debug)]
pub(crate) enum Payload {
    Json(serde_json::Value),
    Video { content_type: String, data: Vec<u8> },
}

/// 直接接続・プロキシ経由で共有する HTTP 部分
pub(crate) struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    bearer: Option<String>,
}

impl HttpTransport {
    pub(crate) fn new(
        base_url: &str,
        bearer: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bearer,
        })
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer {
            Some(token) => builder.header(AUTHORIZATION, format!("Bearer {token}")),
            None => builder,
        }
    }

    pub(crate) async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Payload, ApiError> {
        let response = self
            .authorize(self.client.post(self.url(path)))
            .json(body)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        read_payload(response).await
    }

    pub(crate) async fn get_json(&self, path: &str) -> Result<serde_json::Value, ApiError> {
        let response = self
            .authorize(self.client.get(self.url(path)))
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        match read_payload(response).await? {
            Payload::Json(value) => Ok(value),
            Payload::Video { content_type, .. } => Err(ApiError::protocol(format!(
                "expected JSON but received {content_type}"
            ))),
        }
    }

    /// 動画URLの本体を取得する。プロバイダー配下のURLにだけ資格情報を付ける。
    pub(crate) async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        let mut builder = self.client.get(url);
        if is_under_base(&self.base_url, url) {
            builder = self.authorize(builder);
        }
        let response = builder.send().await.map_err(classify_reqwest_error)?;
        let response = ensure_success(response).await?;
        let bytes = response.bytes().await.map_err(classify_reqwest_error)?;
        Ok(bytes.to_vec())
    }
}

/// url が base と同じオリジンで、かつパスが base のパス配下にあるか
fn is_under_base(base: &str, url: &str) -> bool {
    let (Ok(base), Ok(target)) = (reqwest::Url::parse(base), reqwest::Url::parse(url)) else {
        return false;
    };
    if base.scheme() != target.scheme()
        || base.host_str() != target.host_str()
        || base.port_or_known_default() != target.port_or_known_default()
    {
        return false;
    }

    let prefix = base.path().trim_end_matches('/');
    match target.path().strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// タイムアウトと接続失敗を区別する
pub(crate) fn classify_reqwest_error(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::timeout("The server is taking too long to respond.")
    } else if e.is_decode() {
        ApiError::protocol(format!("Response decode failed: {e}"))
    } else {
        ApiError::network(format!("Unable to reach the video API: {e}"))
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    log::debug!("Provider error response {status}: {body}");
    Err(ApiError::provider(status.as_u16(), &extract_detail(&body)))
}

/// エラー本文から詳細メッセージを取り出す（JSON でなければ本文そのもの）
pub(crate) fn extract_detail(body: &str) -> String {
    let trimmed = body.trim();
    let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(trimmed)
    else {
        return trimmed.to_string();
    };

    let as_text = |v: &serde_json::Value| match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    let mut detail = ["message", "error", "detail"]
        .iter()
        .find_map(|key| map.get(*key).map(as_text))
        .unwrap_or_else(|| trimmed.to_string());

    for key in ["details", "errors"] {
        if let Some(extra) = map.get(key) {
            detail.push_str(&format!(": {extra}"));
        }
    }

    detail
}

async fn read_payload(response: reqwest::Response) -> Result<Payload, ApiError> {
    let response = ensure_success(response).await?;

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase())
        .unwrap_or_default();

    let bytes = response.bytes().await.map_err(classify_reqwest_error)?;

    // ステータスコードではなく Content-Type で動画本体を判別する
    if content_type.starts_with("video/") {
        return Ok(Payload::Video {
            content_type,
            data: bytes.to_vec(),
        });
    }

    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(Payload::Json(serde_json::Value::Object(Default::default())));
    }

    serde_json::from_slice(&bytes)
        .map(Payload::Json)
        .map_err(|e| ApiError::protocol(format!("Response is not valid JSON: {e}")))
}
