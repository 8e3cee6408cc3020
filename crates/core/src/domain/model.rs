use serde::{Deserialize, Serialize};

/// 生成の種別（テキスト起点 / 画像起点）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenerationKind {
    TextToVideo,
    ImageToVideo,
}

impl GenerationKind {
    /// モデルIDから種別を推定する（カタログ情報がない場合のフォールバック）
    pub fn from_model_id(model_id: &str) -> Self {
        if model_id.contains("image-to-video") {
            Self::ImageToVideo
        } else {
            Self::TextToVideo
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TextToVideo => "text-to-video",
            Self::ImageToVideo => "image-to-video",
        }
    }
}

/// モデルが宣言する入力制約
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConstraints {
    /// 対応秒数（昇順）
    pub durations: Vec<u32>,
    pub resolutions: Vec<String>,
    /// 空ならアスペクト比をリクエストに含めない
    pub aspect_ratios: Vec<String>,
    /// 画像起点でもプロンプトが必須か
    pub prompt_required: bool,
}

/// カタログ上のモデル情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub name: String,
    pub kind: GenerationKind,
    pub constraints: ModelConstraints,
    pub audio: bool,
    pub offline: bool,
}

impl ModelDescriptor {
    pub fn supports_ratio(&self, ratio: &str) -> bool {
        self.constraints.aspect_ratios.iter().any(|r| r == ratio)
    }
}

// ─── Catalog wire format ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CatalogEnvelope {
    Wrapped { data: Vec<serde_json::Value> },
    Bare(Vec<serde_json::Value>),
}

#[derive(Debug, Deserialize)]
struct RawModel {
    id: String,
    #[serde(default)]
    model_spec: RawModelSpec,
}

#[derive(Debug, Default, Deserialize)]
struct RawModelSpec {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    offline: bool,
    #[serde(default)]
    constraints: RawConstraints,
}

#[derive(Debug, Default, Deserialize)]
struct RawConstraints {
    #[serde(default)]
    durations: Vec<serde_json::Value>,
    #[serde(default)]
    resolutions: Vec<String>,
    #[serde(default)]
    aspect_ratios: Vec<String>,
    #[serde(default)]
    audio: bool,
    #[serde(default)]
    prompt_required: bool,
    #[serde(default)]
    model_type: Option<String>,
}

/// "5s" / 5 / "5" → 5。解釈できない値は None。
fn parse_duration_value(value: &serde_json::Value) -> Option<u32> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        serde_json::Value::String(s) => s.trim().trim_end_matches('s').parse().ok(),
        _ => None,
    }
}

impl From<RawModel> for ModelDescriptor {
    fn from(raw: RawModel) -> Self {
        let spec = raw.model_spec;
        let kind = match spec.constraints.model_type.as_deref() {
            Some("image-to-video") => GenerationKind::ImageToVideo,
            Some("text-to-video") => GenerationKind::TextToVideo,
            _ => GenerationKind::from_model_id(&raw.id),
        };

        let mut durations: Vec<u32> = spec
            .constraints
            .durations
            .iter()
            .filter_map(parse_duration_value)
            .collect();
        durations.sort_unstable();
        durations.dedup();

        Self {
            name: spec.name.unwrap_or_else(|| raw.id.clone()),
            id: raw.id,
            kind,
            constraints: ModelConstraints {
                durations,
                resolutions: spec.constraints.resolutions,
                aspect_ratios: spec.constraints.aspect_ratios,
                prompt_required: spec.constraints.prompt_required,
            },
            audio: spec.constraints.audio,
            offline: spec.offline,
        }
    }
}

/// `/models?type=video` のレスポンスを順序を保ったままパースする。
/// 形式が壊れたエントリはスキップする。
pub fn parse_catalog(body: serde_json::Value) -> Result<Vec<ModelDescriptor>, serde_json::Error> {
    let entries = match serde_json::from_value::<CatalogEnvelope>(body)? {
        CatalogEnvelope::Wrapped { data } => data,
        CatalogEnvelope::Bare(data) => data,
    };

    let models = entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<RawModel>(entry) {
            Ok(raw) => Some(ModelDescriptor::from(raw)),
            Err(e) => {
                log::warn!("Skipping malformed catalog entry: {e}");
                None
            }
        })
        .collect();

    Ok(models)
}
