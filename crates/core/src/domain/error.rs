use serde::Serialize;

/// アプリケーション共通エラーコード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCode {
    #[serde(rename = "E_VALIDATION")]
    Validation,
    #[serde(rename = "E_NETWORK")]
    Network,
    #[serde(rename = "E_TIMEOUT")]
    Timeout,
    #[serde(rename = "E_PROTOCOL")]
    Protocol,
    #[serde(rename = "E_PROVIDER")]
    Provider,
    #[serde(rename = "E_GENERATION")]
    Generation,
    #[serde(rename = "E_CONFIG")]
    Config,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "E_VALIDATION",
            Self::Network => "E_NETWORK",
            Self::Timeout => "E_TIMEOUT",
            Self::Protocol => "E_PROTOCOL",
            Self::Provider => "E_PROVIDER",
            Self::Generation => "E_GENERATION",
            Self::Config => "E_CONFIG",
        }
    }
}

/// プロバイダーが返した HTTP ステータスの分類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderErrorKind {
    BadRequest,
    Unauthorized,
    PaymentRequired,
    NotFound,
    PayloadTooLarge,
    Validation,
    RateLimited,
    ServerError,
    HttpError,
}

impl ProviderErrorKind {
    /// ステータスコード → 種別（1:1 対応、それ以外は HttpError）
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => Self::BadRequest,
            401 => Self::Unauthorized,
            402 => Self::PaymentRequired,
            404 => Self::NotFound,
            413 => Self::PayloadTooLarge,
            422 => Self::Validation,
            429 => Self::RateLimited,
            500 => Self::ServerError,
            _ => Self::HttpError,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "bad-request",
            Self::Unauthorized => "unauthorized",
            Self::PaymentRequired => "payment-required",
            Self::NotFound => "not-found",
            Self::PayloadTooLarge => "payload-too-large",
            Self::Validation => "validation",
            Self::RateLimited => "rate-limited",
            Self::ServerError => "server-error",
            Self::HttpError => "http-error",
        }
    }

    /// ステータス別のメッセージ。detail はプロバイダーが返した構造化情報。
    pub fn describe(&self, status: u16, detail: &str) -> String {
        let base = match self {
            Self::BadRequest => return format!("Bad Request: {detail}"),
            Self::Validation => return format!("Validation Error: {detail}"),
            Self::HttpError if detail.is_empty() => return format!("HTTP Error: {status}"),
            Self::HttpError => return format!("HTTP Error: {status} - {detail}"),
            Self::Unauthorized => "Unauthorized: Invalid API token. Please check your API key.",
            Self::PaymentRequired => "Payment Required: Insufficient credits in your account.",
            Self::NotFound => "Not Found: The requested resource was not found.",
            Self::PayloadTooLarge => "Payload Too Large: Your prompt exceeds the maximum length.",
            Self::RateLimited => "Rate Limited: Too many requests. Please wait a moment.",
            Self::ServerError => "Server Error: The video API is experiencing issues. Try again later.",
        };
        if detail.is_empty() {
            base.to_string()
        } else {
            format!("{base} ({detail})")
        }
    }

    /// UI 向けの対処文言
    pub fn remediation(&self) -> &'static str {
        match self {
            Self::BadRequest | Self::Validation => {
                "Invalid parameters. Please check your input and try again."
            }
            Self::Unauthorized => "Authentication failed. Please check your API token.",
            Self::PaymentRequired => {
                "Insufficient credits. Please add more credits to your account."
            }
            Self::NotFound => {
                "Resource not found. The requested video or queue may have expired."
            }
            Self::PayloadTooLarge => {
                "Your prompt is too long. Please shorten your prompt and try again."
            }
            Self::RateLimited => "Too many requests. Please wait a moment and try again.",
            Self::ServerError => "Server error. Please try again later.",
            Self::HttpError => "The request failed. Please try again.",
        }
    }

    /// ポーリング中に再試行してよい種別か
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ServerError | Self::RateLimited)
    }
}

/// バリデーション対象フィールド
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestField {
    Model,
    Prompt,
    SourceImage,
    QueueId,
}

impl std::fmt::Display for RequestField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Model => "model",
            Self::Prompt => "prompt",
            Self::SourceImage => "source_image",
            Self::QueueId => "queue_id",
        };
        f.write_str(name)
    }
}

/// Provider Client の呼び出し元に返るエラー
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApiError {
    #[error("Validation error ({field}): {message}")]
    Validation { field: RequestField, message: String },
    #[error("Network error: {message}")]
    Network { message: String },
    #[error("Request timeout: {message}")]
    Timeout { message: String },
    #[error("Invalid response: {message}")]
    Protocol { message: String },
    #[error("{message}")]
    Provider {
        kind: ProviderErrorKind,
        status: u16,
        message: String,
    },
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl ApiError {
    pub fn validation(field: RequestField, msg: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: msg.into(),
        }
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network {
            message: msg.into(),
        }
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout {
            message: msg.into(),
        }
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// HTTP ステータスと本文の詳細からプロバイダーエラーを作る
    pub fn provider(status: u16, detail: &str) -> Self {
        let kind = ProviderErrorKind::from_status(status);
        Self::Provider {
            kind,
            status,
            message: kind.describe(status, detail),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { .. } => ErrorCode::Validation,
            Self::Network { .. } => ErrorCode::Network,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::Protocol { .. } => ErrorCode::Protocol,
            Self::Provider { .. } => ErrorCode::Provider,
            Self::Config { .. } => ErrorCode::Config,
        }
    }

    pub fn provider_kind(&self) -> Option<ProviderErrorKind> {
        match self {
            Self::Provider { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.provider_kind() == Some(ProviderErrorKind::NotFound)
    }

    /// ポーリング1回分の失敗として扱い、ループを継続してよいか
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => true,
            Self::Provider { kind, .. } => kind.is_transient(),
            _ => false,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Provider { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}
