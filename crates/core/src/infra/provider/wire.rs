//! 5つのルート共通のリクエスト/レスポンス変換。

use serde::{Deserialize, Serialize};

use super::transport::{HttpTransport, Payload};
use super::{CleanupResult, Quote, SubmitReceipt};
use crate::domain::error::{ApiError, RequestField};
use crate::domain::job::{JobStatusSnapshot, VideoResource};
use crate::domain::model::{parse_catalog, ModelDescriptor};
use crate::domain::request::{GenerationRequest, RequestPurpose};

#[derive(Debug, Deserialize)]
struct QueueResponse {
    #[serde(default)]
    queue_id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Serialize)]
struct RetrieveRequest<'a> {
    queue_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    delete_media_on_completion: bool,
}

#[derive(Debug, Default, Deserialize)]
struct RetrieveResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    video_url: Option<String>,
    #[serde(default)]
    average_execution_time: Option<serde_json::Value>,
    #[serde(default)]
    execution_duration: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteResponse {
    #[serde(default)]
    quote: Option<serde_json::Value>,
    #[serde(default)]
    estimated_cost: Option<serde_json::Value>,
    #[serde(default)]
    credits_required: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct CompleteRequest<'a> {
    queue_id: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct CompleteResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    message: Option<String>,
}

/// 数値または数値文字列を f64 として読む
fn number(value: Option<&serde_json::Value>) -> Option<f64> {
    let parsed = match value? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn expect_json(payload: Payload, operation: &str) -> Result<serde_json::Value, ApiError> {
    match payload {
        Payload::Json(value) => Ok(value),
        Payload::Video { content_type, .. } => Err(ApiError::protocol(format!(
            "{operation} returned {content_type} instead of JSON"
        ))),
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    value: serde_json::Value,
    operation: &str,
) -> Result<T, ApiError> {
    serde_json::from_value(value)
        .map_err(|e| ApiError::protocol(format!("Unexpected {operation} response: {e}")))
}

fn require_queue_id(queue_id: &str) -> Result<&str, ApiError> {
    let trimmed = queue_id.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation(RequestField::QueueId, "Queue ID is required"));
    }
    Ok(trimmed)
}

pub(crate) async fn submit(
    transport: &HttpTransport,
    request: &GenerationRequest,
) -> Result<SubmitReceipt, ApiError> {
    let body = request.shape(RequestPurpose::Submit)?;
    log::debug!(
        "Queue request body: {}",
        serde_json::to_string(&body).unwrap_or_default()
    );

    let payload = transport.post("/video/queue", &body).await?;
    let response: QueueResponse = decode(expect_json(payload, "queue")?, "queue")?;

    let queue_id = response
        .queue_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::protocol("queue_id not found in queue response"))?;

    Ok(SubmitReceipt {
        queue_id,
        model_id: response.model.unwrap_or(body.model),
        message: response.message,
    })
}

pub(crate) async fn poll(
    transport: &HttpTransport,
    queue_id: &str,
    model_id: Option<&str>,
    delete_media_on_completion: bool,
) -> Result<JobStatusSnapshot, ApiError> {
    let queue_id = require_queue_id(queue_id)?;
    let body = RetrieveRequest {
        queue_id,
        model: model_id.filter(|m| !m.is_empty()),
        delete_media_on_completion,
    };

    match transport.post("/video/retrieve", &body).await? {
        Payload::Video { content_type, data } => {
            log::debug!("Retrieve returned {} bytes of {content_type}", data.len());
            Ok(JobStatusSnapshot::completed(VideoResource::inline(content_type, data)))
        }
        Payload::Json(value) => {
            let response: RetrieveResponse = decode(value, "retrieve")?;
            let status = response
                .status
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "processing".to_string());

            let error = response.error.map(|e| match e {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            });

            Ok(JobStatusSnapshot {
                status,
                average_execution_ms: number(response.average_execution_time.as_ref()),
                elapsed_execution_ms: number(response.execution_duration.as_ref()),
                video: response
                    .video_url
                    .filter(|u| !u.trim().is_empty())
                    .map(|url| VideoResource::Remote { url }),
                error,
            })
        }
    }
}

pub(crate) async fn quote(
    transport: &HttpTransport,
    request: &GenerationRequest,
) -> Result<Quote, ApiError> {
    let body = request.shape(RequestPurpose::Quote)?;
    log::debug!(
        "Quote request body: {}",
        serde_json::to_string(&body).unwrap_or_default()
    );

    let payload = transport.post("/video/quote", &body).await?;
    let response: QuoteResponse = decode(expect_json(payload, "quote")?, "quote")?;

    let quoted = number(response.quote.as_ref());
    Ok(Quote {
        estimated_cost: quoted.or_else(|| number(response.estimated_cost.as_ref())),
        credits_required: quoted.or_else(|| number(response.credits_required.as_ref())),
    })
}

pub(crate) async fn cleanup(
    transport: &HttpTransport,
    queue_id: &str,
) -> Result<CleanupResult, ApiError> {
    let queue_id = require_queue_id(queue_id)?;
    let payload = transport
        .post("/video/complete", &CompleteRequest { queue_id })
        .await?;
    let response: CompleteResponse = decode(expect_json(payload, "complete")?, "complete")?;

    Ok(CleanupResult {
        success: response.success != Some(false),
        message: response
            .message
            .unwrap_or_else(|| "Storage cleanup completed".to_string()),
    })
}

pub(crate) async fn list_models(transport: &HttpTransport) -> Result<Vec<ModelDescriptor>, ApiError> {
    let value = transport.get_json("/models?type=video").await?;
    parse_catalog(value).map_err(|e| ApiError::protocol(format!("Unexpected models response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_number_accepts_strings() {
        assert_eq!(number(Some(&json!(1500))), Some(1500.0));
        assert_eq!(number(Some(&json!("2500.5"))), Some(2500.5));
        assert_eq!(number(Some(&json!("soon"))), None);
        assert_eq!(number(Some(&json!(null))), None);
        assert_eq!(number(None), None);
    }

    #[test]
    fn test_retrieve_body_shape() {
        let body = RetrieveRequest {
            queue_id: "q-1",
            model: None,
            delete_media_on_completion: false,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, json!({"queue_id": "q-1", "delete_media_on_completion": false}));
    }

    #[test]
    fn test_blank_queue_id_rejected() {
        let err = require_queue_id("  ").unwrap_err();
        assert!(matches!(
            err,
            ApiError::Validation {
                field: RequestField::QueueId,
                ..
            }
        ));
    }
}
