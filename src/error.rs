// LumosGestures エラー定義
// ジェスチャー認識そのものは失敗しない。ここで扱うのは設定とサービス周りのエラーのみ。

use thiserror::Error;

/// ジェスチャーエンジンの結果型
pub type GestureResult<T> = Result<T, GestureError>;

/// ジェスチャーエンジンのエラー
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GestureError {
    /// 設定値が不正
    #[error("設定エラー: {0}")]
    InvalidConfig(String),

    /// 設定ファイルの解析に失敗
    #[error("設定の解析に失敗しました: {0}")]
    ConfigParse(String),

    /// I/Oエラー
    #[error("I/Oエラー: {0}")]
    Io(String),

    /// サービスが停止済み
    #[error("ジェスチャーサービスは停止しています")]
    EngineStopped,

    /// 入力キューが満杯
    #[error("ジェスチャー入力キューが満杯です")]
    QueueFull,
}

impl GestureError {
    /// エラーのログレベルを取得する
    pub fn log_level(&self) -> log::Level {
        match self {
            GestureError::InvalidConfig(_) => log::Level::Error,
            GestureError::ConfigParse(_) => log::Level::Error,
            GestureError::Io(_) => log::Level::Error,
            GestureError::EngineStopped => log::Level::Warn,
            GestureError::QueueFull => log::Level::Warn,
        }
    }

    /// エラーコードを取得する
    pub fn error_code(&self) -> u32 {
        match self {
            GestureError::InvalidConfig(_) => 2001,
            GestureError::ConfigParse(_) => 2002,
            GestureError::Io(_) => 2003,
            GestureError::EngineStopped => 2004,
            GestureError::QueueFull => 2005,
        }
    }
}

impl From<std::io::Error> for GestureError {
    fn from(error: std::io::Error) -> Self {
        GestureError::Io(error.to_string())
    }
}

impl From<serde_json::Error> for GestureError {
    fn from(error: serde_json::Error) -> Self {
        GestureError::ConfigParse(error.to_string())
    }
}
