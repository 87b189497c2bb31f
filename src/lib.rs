// LumosGestures
// LumosDesktop 向けの離散ジェスチャー認識エンジン

//! LumosGestures
//!
//! 接触イベントの連続からタップ・ダブルタップ・長押し・フリックを認識する。
//!
//! - [`GestureEngine`]: 認識器テーブルを所有する同期エンジン。時間は
//!   [`TimerScheduler`] を通して扱うので、仮想時計でも tokio 上でも動く。
//! - [`GestureService`]: エンジンを tokio タスクとして起動し、
//!   ハンドル経由でイベントを送る。
//! - [`GestureDispatcher`]: 認識結果の購読とコールバック登録。

pub mod config;
pub mod dispatch;
pub mod error;
pub mod gesture_recognizer;
pub mod service;
pub mod timer;

pub use config::GestureConfig;
pub use dispatch::{GestureCallback, GestureDispatcher, ListenerId};
pub use error::{GestureError, GestureResult};
pub use gesture_recognizer::{
    ContactEvent, ContactId, FlickDirection, GestureEngine, GestureEvent, GestureRecognizer,
    GestureType, Recognition, SourceId,
};
pub use service::{GestureService, GestureServiceHandle};
pub use timer::{ManualScheduler, TimerKey, TimerScheduler, TimerToken, TokioScheduler};
