use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_API_BASE_URL: &str = "https://api.venice.ai/api/v1";

/// クライアント設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// プロバイダーのベースURL（`/video/*` と `/models` の親）
    pub api_base_url: String,
    /// 直接接続用のトークン。None ならプロキシ経由。
    #[serde(skip_serializing)]
    pub api_token: Option<String>,
    /// 資格情報を隠すプロキシのベースURL（例: http://localhost:3000/api）
    pub proxy_base_url: Option<String>,
    /// 1リクエストのタイムアウト（秒）
    pub request_timeout_secs: u64,
    pub poll: PollPolicy,
}

/// ポーリング方針
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    /// 最初のポーリング前の待機（インデックス遅延の吸収）
    pub initial_delay_ms: u64,
    pub interval_ms: u64,
    /// これを超えたら TimedOut
    pub max_attempts: u32,
    /// not-found を一時的とみなす初期の試行回数
    pub not_found_grace_attempts: u32,
    /// 猶予期間中の not-found 後の待機
    pub not_found_backoff_ms: u64,
    /// 連続した一時エラーの上限
    pub max_consecutive_errors: u32,
    pub delete_media_on_completion: bool,
    /// 完了後に `/complete` でストレージを掃除する
    pub cleanup_on_completion: bool,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 3_000,
            interval_ms: 10_000,
            max_attempts: 120,
            not_found_grace_attempts: 3,
            not_found_backoff_ms: 20_000,
            max_consecutive_errors: 5,
            delete_media_on_completion: false,
            cleanup_on_completion: false,
        }
    }
}

impl PollPolicy {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn not_found_backoff(&self) -> Duration {
        Duration::from_millis(self.not_found_backoff_ms)
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_token: None,
            proxy_base_url: None,
            request_timeout_secs: 60,
            poll: PollPolicy::default(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Option<T> {
    match value.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("Ignoring unparsable {key}={value}");
            None
        }
    }
}

impl ClientSettings {
    /// 環境変数で既定値を上書きする
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 任意のキー検索関数から設定を組み立てる
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("VQ_API_BASE") {
            settings.api_base_url = v.trim().trim_end_matches('/').to_string();
        }
        if let Some(v) = get("VQ_API_TOKEN") {
            settings.api_token = Some(v.trim().to_string());
        }
        if let Some(v) = get("VQ_PROXY_URL") {
            settings.proxy_base_url = Some(v.trim().trim_end_matches('/').to_string());
        }
        if let Some(secs) = get("VQ_TIMEOUT_SECS").and_then(|v| parse_env::<u64>("VQ_TIMEOUT_SECS", &v)) {
            settings.request_timeout_secs = secs;
        }
        if let Some(secs) =
            get("VQ_POLL_INTERVAL_SECS").and_then(|v| parse_env::<u64>("VQ_POLL_INTERVAL_SECS", &v))
        {
            settings.poll.interval_ms = secs.saturating_mul(1000);
        }
        if let Some(n) = get("VQ_MAX_ATTEMPTS").and_then(|v| parse_env::<u32>("VQ_MAX_ATTEMPTS", &v)) {
            settings.poll.max_attempts = n;
        }
        if let Some(flag) = get("VQ_AUTO_CLEANUP").and_then(|v| parse_env::<bool>("VQ_AUTO_CLEANUP", &v)) {
            settings.poll.cleanup_on_completion = flag;
        }

        settings
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
