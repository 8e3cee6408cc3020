//! キュー型の動画生成 API クライアント。
//!
//! - `domain`: リクエスト整形・ジョブ状態機械・設定（I/O なし）
//! - `infra`: プロバイダー HTTP クライアントとメトリクス
//! - `usecase`: ジョブのライフサイクル管理と表示アダプター

pub mod domain;
pub mod infra;
pub mod usecase;
