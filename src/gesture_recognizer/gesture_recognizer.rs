// LumosGestures ジェスチャー認識器の共通型
// 接触イベント、認識結果、認識器トレイトを定義する

use std::fmt;

use chrono::{DateTime, Utc};
use glam::{DVec2, DVec3};
use serde::{Deserialize, Serialize};

use crate::config::GestureConfig;
use crate::timer::{TimerScheduler, TimerToken};

/// 接触ストリームの識別子 (指・ポインタ単位)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContactId(pub u64);

/// 接触中のインタラクタブル (ターゲット) の識別子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId(pub u64);

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "contact#{}", self.0)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source#{}", self.0)
    }
}

/// 接触イベント
///
/// 外部の入力系が接触中に連続して発行する。`elapsed` と累積量は
/// 接触セッションの開始からの値。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContactEvent {
    /// 接触ストリーム
    pub contact: ContactId,
    /// 現在接触しているターゲット
    pub source: SourceId,
    /// 接触開始からの経過時間 (秒)
    pub elapsed: f64,
    /// 接触開始からの正味の変位
    #[serde(default)]
    pub cumulative_direction: DVec2,
    /// 接触開始からの経路長
    #[serde(default)]
    pub cumulative_distance: f64,
    /// 現在の接触位置
    #[serde(default)]
    pub position: DVec3,
}

impl ContactEvent {
    pub fn new(contact: ContactId, source: SourceId, elapsed: f64) -> Self {
        Self {
            contact,
            source,
            elapsed,
            cumulative_direction: DVec2::ZERO,
            cumulative_distance: 0.0,
            position: DVec3::ZERO,
        }
    }

    /// 変位を設定する。経路長は変位の大きさ以上に保たれる。
    pub fn with_direction(mut self, direction: DVec2) -> Self {
        self.cumulative_direction = direction;
        let length = direction.length();
        if self.cumulative_distance < length {
            self.cumulative_distance = length;
        }
        self
    }

    pub fn with_distance(mut self, distance: f64) -> Self {
        self.cumulative_distance = distance;
        self
    }

    pub fn with_position(mut self, position: DVec3) -> Self {
        self.position = position;
        self
    }

    /// 正味の変位の大きさ
    pub fn displacement(&self) -> f64 {
        self.cumulative_direction.length()
    }

    /// 評価に使える値か (負の経過時間や非有限値は不可)
    pub fn is_well_formed(&self) -> bool {
        self.elapsed.is_finite()
            && self.elapsed >= 0.0
            && self.cumulative_direction.is_finite()
            && self.cumulative_distance.is_finite()
            && self.position.is_finite()
    }
}

/// ジェスチャー種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GestureType {
    Tap,
    DoubleTap,
    LongPress,
    Flick,
}

impl GestureType {
    pub const ALL: [GestureType; 4] = [
        GestureType::Tap,
        GestureType::DoubleTap,
        GestureType::LongPress,
        GestureType::Flick,
    ];
}

impl fmt::Display for GestureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GestureType::Tap => write!(f, "タップ"),
            GestureType::DoubleTap => write!(f, "ダブルタップ"),
            GestureType::LongPress => write!(f, "長押し"),
            GestureType::Flick => write!(f, "フリック"),
        }
    }
}

impl std::str::FromStr for GestureType {
    type Err = String;

    /// `tap` / `double_tap` / `long_press` / `flick` (大文字小文字・区切り文字は問わない)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_lowercase();

        match normalized.as_str() {
            "tap" => Ok(GestureType::Tap),
            "doubletap" => Ok(GestureType::DoubleTap),
            "longpress" => Ok(GestureType::LongPress),
            "flick" => Ok(GestureType::Flick),
            _ => Err(format!("不明なジェスチャー種類: {}", s)),
        }
    }
}

/// フリックの主方向 (y 軸正方向が上)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlickDirection {
    Up,
    Down,
    Left,
    Right,
}

impl FlickDirection {
    /// 支配的な軸から方向を決める。ゼロベクトルなら None。
    pub fn from_vector(direction: DVec2) -> Option<Self> {
        if !direction.is_finite() || direction == DVec2::ZERO {
            return None;
        }

        if direction.x.abs() > direction.y.abs() {
            if direction.x > 0.0 {
                Some(FlickDirection::Right)
            } else {
                Some(FlickDirection::Left)
            }
        } else if direction.y > 0.0 {
            Some(FlickDirection::Up)
        } else {
            Some(FlickDirection::Down)
        }
    }
}

/// 認識されたジェスチャー
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureEvent {
    pub gesture_type: GestureType,
    /// 認識の根拠となった接触イベント
    pub event: ContactEvent,
    /// フリックの正規化方向 (フリック以外は None)
    pub direction: Option<DVec2>,
    pub recognized_at: DateTime<Utc>,
}

impl GestureEvent {
    pub fn new(gesture_type: GestureType, event: ContactEvent) -> Self {
        Self {
            gesture_type,
            event,
            direction: None,
            recognized_at: Utc::now(),
        }
    }

    pub fn with_direction(mut self, direction: DVec2) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn contact(&self) -> ContactId {
        self.event.contact
    }

    pub fn source(&self) -> SourceId {
        self.event.source
    }

    pub fn flick_direction(&self) -> Option<FlickDirection> {
        self.direction.and_then(FlickDirection::from_vector)
    }
}

/// 認識器の出力
#[derive(Debug, Clone, PartialEq)]
pub enum Recognition {
    /// ダブルタップ判定待ちのタップ候補
    TapCandidate(ContactEvent),
    /// 確定したジェスチャー
    Gesture(GestureEvent),
}

/// ジェスチャー認識器の基底トレイト
///
/// 認識器は1つの接触ストリームに属し、状態を他と共有しない。
/// 状態遷移は `update` と `on_timer` の中でのみ起こる。
pub trait GestureRecognizer: Send {
    fn name(&self) -> &'static str;
    fn gesture_type(&self) -> GestureType;

    /// 接触イベントを処理する
    fn update(
        &mut self,
        event: &ContactEvent,
        config: &GestureConfig,
        timers: &mut dyn TimerScheduler,
    ) -> Option<Recognition>;

    /// 自分のタイマーが発火したときに呼ばれる。置き換え済みのトークンは無視する。
    fn on_timer(&mut self, token: &TimerToken, config: &GestureConfig) -> Option<Recognition>;

    /// 状態を破棄し、保留中のタイマーをキャンセルする
    fn reset(&mut self, timers: &mut dyn TimerScheduler);

    /// セッション中またはタイマー保留中なら true
    fn is_active(&self) -> bool;
}
