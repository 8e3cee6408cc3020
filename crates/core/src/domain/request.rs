use serde::{Deserialize, Serialize};

use super::error::{ApiError, RequestField};
use super::model::{GenerationKind, ModelDescriptor};

/// プロンプトの最大長（Unicode コードポイント数）
pub const MAX_PROMPT_CHARS: usize = 5000;

/// アスペクト比
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
    #[serde(rename = "1:1")]
    Square,
}

impl AspectRatio {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Landscape => "16:9",
            Self::Portrait => "9:16",
            Self::Square => "1:1",
        }
    }
}

impl std::str::FromStr for AspectRatio {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "16:9" => Ok(Self::Landscape),
            "9:16" => Ok(Self::Portrait),
            "1:1" => Ok(Self::Square),
            other => Err(format!("unsupported aspect ratio: {other}")),
        }
    }
}

/// 秒数の入力値。数値でも "5s" のような文字列でも受け付ける。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DurationInput {
    Seconds(f64),
    Text(String),
}

/// 秒数テキストを読む。末尾の "s" は1つだけ許す（"7s", "7.5", "+5s" → 7, 7, 5 / "5ms", "10 s" → None）
fn parse_seconds_text(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    let body = trimmed.strip_suffix('s').unwrap_or(trimmed);
    if body.is_empty() || body.chars().any(|c| c.is_whitespace()) {
        return None;
    }
    body.parse::<f64>().ok()
}

fn whole_seconds(secs: f64) -> Option<String> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.trunc() as i64;
    (whole > 0).then(|| format!("{whole}s"))
}

impl DurationInput {
    /// プロバイダー向けの "<int>s" 表現。不正値・0以下は None（省略する）。
    pub fn to_wire(&self) -> Option<String> {
        match self {
            Self::Seconds(secs) => whole_seconds(*secs),
            Self::Text(text) => whole_seconds(parse_seconds_text(text)?),
        }
    }
}

impl From<u32> for DurationInput {
    fn from(secs: u32) -> Self {
        Self::Seconds(f64::from(secs))
    }
}

impl From<&str> for DurationInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// 動画生成リクエスト（ユーザー入力）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: Option<String>,
    /// 画像URL（ローカル画像は外部でURL化してから渡す）
    pub source_image: Option<String>,
    /// 画像起点モデルでは prompt より優先して送る
    pub motion_prompt: Option<String>,
    pub duration: Option<DurationInput>,
    pub aspect_ratio: Option<AspectRatio>,
    pub resolution: Option<String>,
    /// カタログから選択したモデル情報（制約の判定に使う）
    #[serde(skip)]
    pub model_info: Option<ModelDescriptor>,
}

/// リクエストの用途
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPurpose {
    Submit,
    Quote,
}

/// `/queue` と `/quote` に送る本文
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueBody {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty())
}

fn is_resolvable_image(url: &str) -> bool {
    url.starts_with("https://") || url.starts_with("http://") || url.starts_with("data:image/")
}

impl GenerationRequest {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    /// カタログのモデル情報を紐付ける
    pub fn with_model_info(mut self, info: ModelDescriptor) -> Self {
        self.model = info.id.clone();
        self.model_info = Some(info);
        self
    }

    pub fn kind(&self) -> GenerationKind {
        match &self.model_info {
            Some(info) if info.id == self.model.trim() => info.kind,
            _ => GenerationKind::from_model_id(&self.model),
        }
    }

    fn declared_ratios(&self) -> &[String] {
        match &self.model_info {
            Some(info) => &info.constraints.aspect_ratios,
            None => &[],
        }
    }

    fn prompt_required_for_image(&self) -> bool {
        self.model_info
            .as_ref()
            .is_some_and(|info| info.constraints.prompt_required)
    }

    /// 送信するプロンプト: テキスト起点は prompt、画像起点は motion_prompt → prompt の順
    fn effective_prompt(&self) -> Option<&str> {
        match self.kind() {
            GenerationKind::TextToVideo => non_empty(self.prompt.as_ref()),
            GenerationKind::ImageToVideo => {
                non_empty(self.motion_prompt.as_ref()).or_else(|| non_empty(self.prompt.as_ref()))
            }
        }
    }

    /// ネットワーク呼び出し前のローカル検証
    pub fn validate(&self, purpose: RequestPurpose) -> Result<(), ApiError> {
        if self.model.trim().is_empty() {
            return Err(ApiError::validation(RequestField::Model, "Model is required"));
        }

        let prompt = self.effective_prompt();
        match self.kind() {
            GenerationKind::TextToVideo => {
                if prompt.is_none() {
                    return Err(ApiError::validation(
                        RequestField::Prompt,
                        "Prompt is required for text-to-video models",
                    ));
                }
            }
            GenerationKind::ImageToVideo => {
                match non_empty(self.source_image.as_ref()) {
                    Some(url) if is_resolvable_image(url) => {}
                    Some(_) => {
                        return Err(ApiError::validation(
                            RequestField::SourceImage,
                            "Image must be an http(s) or data:image URL",
                        ))
                    }
                    None => {
                        return Err(ApiError::validation(
                            RequestField::SourceImage,
                            "Image URL is required for image-to-video models",
                        ))
                    }
                }
                if prompt.is_none() && self.prompt_required_for_image() {
                    let action = match purpose {
                        RequestPurpose::Submit => "generation",
                        RequestPurpose::Quote => "a quote",
                    };
                    return Err(ApiError::validation(
                        RequestField::Prompt,
                        format!("This model requires a motion prompt for {action}"),
                    ));
                }
            }
        }

        if let Some(text) = prompt {
            if text.chars().count() > MAX_PROMPT_CHARS {
                return Err(ApiError::validation(
                    RequestField::Prompt,
                    format!("Prompt exceeds maximum length of {MAX_PROMPT_CHARS} characters"),
                ));
            }
        }

        Ok(())
    }

    /// 検証済みのリクエスト本文を組み立てる
    pub fn shape(&self, purpose: RequestPurpose) -> Result<QueueBody, ApiError> {
        self.validate(purpose)?;

        let image_url = match self.kind() {
            GenerationKind::ImageToVideo => non_empty(self.source_image.as_ref()).map(String::from),
            GenerationKind::TextToVideo => None,
        };

        let declared = self.declared_ratios();
        let aspect_ratio = if declared.is_empty() {
            None
        } else {
            // 非対応・未指定ならモデルの先頭の比率にフォールバック
            let requested = self
                .aspect_ratio
                .map(|r| r.as_str())
                .filter(|r| declared.iter().any(|d| d == r));
            Some(requested.map(String::from).unwrap_or_else(|| declared[0].clone()))
        };

        Ok(QueueBody {
            model: self.model.trim().to_string(),
            prompt: self.effective_prompt().map(String::from),
            image_url,
            duration: self.duration.as_ref().and_then(DurationInput::to_wire),
            aspect_ratio,
            resolution: non_empty(self.resolution.as_ref()).map(String::from),
        })
    }
}
