// LumosGestures 設定
// 各認識器のしきい値とタイムアウト。時間はすべて秒、距離はすべて入力座標系の単位。

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GestureError, GestureResult};

/// ジェスチャー認識の設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    /// タップとみなす接触時間の上限
    pub tap_event_duration: f64,
    /// 最後のイベントからタップを評価するまでの静止時間
    pub tap_timeout_duration: f64,
    /// タップ中に許容される正味の移動量
    pub tap_distance_limit: f64,
    /// タップ中に許容される経路長 (None なら検査しない)
    pub tap_path_length_limit: Option<f64>,

    /// ダブルタップとみなす2回のタップの間隔
    pub double_tap_interval: f64,

    /// 長押しとみなす接触時間の下限
    pub long_press_duration: f64,
    /// 長押し中に許容される正味の移動量
    pub long_press_distance_limit: f64,
    /// 長押し状態をリセットするまでの静止時間
    pub long_press_timeout_duration: f64,

    /// フリックとみなす移動量の下限
    pub flick_min_distance: f64,
    /// フリックとみなす接触時間の上限
    pub flick_max_duration: f64,
    /// フリック状態をリセットするまでの静止時間
    pub flick_timeout: f64,

    /// 購読チャネルごとのバッファ長
    pub channel_capacity: usize,
    /// サービスの受信キュー長
    pub command_queue_capacity: usize,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            tap_event_duration: 0.2,
            tap_timeout_duration: 0.0035,
            tap_distance_limit: 0.008,
            tap_path_length_limit: None,
            double_tap_interval: 0.25,
            long_press_duration: 0.4,
            long_press_distance_limit: 0.01,
            long_press_timeout_duration: 0.05,
            flick_min_distance: 0.09,
            flick_max_duration: 0.2,
            flick_timeout: 0.2,
            channel_capacity: 64,
            command_queue_capacity: 256,
        }
    }
}

impl GestureConfig {
    /// 設定値を検証する
    pub fn validate(&self) -> GestureResult<()> {
        let thresholds = [
            ("tap_event_duration", self.tap_event_duration),
            ("tap_timeout_duration", self.tap_timeout_duration),
            ("tap_distance_limit", self.tap_distance_limit),
            ("double_tap_interval", self.double_tap_interval),
            ("long_press_duration", self.long_press_duration),
            ("long_press_distance_limit", self.long_press_distance_limit),
            ("long_press_timeout_duration", self.long_press_timeout_duration),
            ("flick_min_distance", self.flick_min_distance),
            ("flick_max_duration", self.flick_max_duration),
            ("flick_timeout", self.flick_timeout),
        ];

        for (name, value) in thresholds {
            check_non_negative(name, value)?;
        }

        let timeouts = [
            ("tap_timeout_duration", self.tap_timeout_duration),
            ("double_tap_interval", self.double_tap_interval),
            ("long_press_timeout_duration", self.long_press_timeout_duration),
            ("flick_timeout", self.flick_timeout),
        ];

        for (name, value) in timeouts {
            check_representable(name, value)?;
        }

        if let Some(limit) = self.tap_path_length_limit {
            check_non_negative("tap_path_length_limit", limit)?;
        }

        if self.channel_capacity == 0 {
            return Err(GestureError::InvalidConfig(
                "channel_capacity は1以上である必要があります".to_string(),
            ));
        }
        if self.command_queue_capacity == 0 {
            return Err(GestureError::InvalidConfig(
                "command_queue_capacity は1以上である必要があります".to_string(),
            ));
        }

        Ok(())
    }

    /// JSON文字列から設定を読み込む
    pub fn from_json(json: &str) -> GestureResult<Self> {
        let config: GestureConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// 設定をJSON文字列に変換する
    pub fn to_json(&self) -> GestureResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// 設定ファイルを読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> GestureResult<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| {
            GestureError::Io(format!("設定ファイルを開けませんでした: {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    /// 設定ファイルに保存する
    pub fn save<P: AsRef<Path>>(&self, path: P) -> GestureResult<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn tap_timeout(&self) -> Duration {
        seconds(self.tap_timeout_duration)
    }

    pub fn double_tap_window(&self) -> Duration {
        seconds(self.double_tap_interval)
    }

    pub fn long_press_timeout(&self) -> Duration {
        seconds(self.long_press_timeout_duration)
    }

    pub fn flick_reset_timeout(&self) -> Duration {
        seconds(self.flick_timeout)
    }
}

fn check_non_negative(name: &str, value: f64) -> GestureResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(GestureError::InvalidConfig(format!(
            "{} は0以上の有限値である必要があります: {}",
            name, value
        )));
    }
    Ok(())
}

/// タイマーに使う秒数は Duration で表せる範囲に収まる必要がある
fn check_representable(name: &str, value: f64) -> GestureResult<()> {
    if Duration::try_from_secs_f64(value).is_err() {
        return Err(GestureError::InvalidConfig(format!(
            "{} はタイマーとして扱える範囲を超えています: {}",
            name, value
        )));
    }
    Ok(())
}

/// 秒数を Duration に変換する (負値・NaN は 0、大きすぎる値は上限に丸める)
fn seconds(value: f64) -> Duration {
    if value.is_nan() || value <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
}
