// LumosGestures タップ認識器
// イベント列が静止してから最後のイベントを評価する (デバウンスサンプル方式)

use std::mem;

use log::debug;

use crate::config::GestureConfig;
use crate::gesture_recognizer::{
    ContactEvent, ContactId, GestureRecognizer, GestureType, Recognition, SourceId,
};
use crate::timer::{Debounce, TimerKey, TimerScheduler, TimerToken};

#[derive(Debug, Clone, PartialEq)]
enum TapSession {
    Idle,
    Active {
        source: SourceId,
        latest: ContactEvent,
    },
}

/// タップ認識器
///
/// イベントのたびに評価タイマーを再始動し、`tap_timeout_duration` の間
/// イベントが来なければ最後のイベントを評価してタップ候補を出す。
/// 接触の終了ではなく静止を待つので、離す直前に入力が途切れても判定できる。
/// 接触中にターゲットが変わるとセッションは即座に破棄され、そのイベントは
/// 評価されない。次のイベントから新しいセッションが始まる。
#[derive(Debug)]
pub struct TapRecognizer {
    contact: ContactId,
    session: TapSession,
    timer: Debounce,
}

impl TapRecognizer {
    pub fn new(contact: ContactId) -> Self {
        Self {
            contact,
            session: TapSession::Idle,
            timer: Debounce::new(),
        }
    }

    /// 現在のセッションが捕捉しているターゲット
    pub fn session_source(&self) -> Option<SourceId> {
        match &self.session {
            TapSession::Active { source, .. } => Some(*source),
            _ => None,
        }
    }

    fn accepts(event: &ContactEvent, config: &GestureConfig) -> bool {
        if !event.is_well_formed() {
            return false;
        }

        let within_path = config
            .tap_path_length_limit
            .map_or(true, |limit| event.cumulative_distance < limit);

        event.elapsed < config.tap_event_duration
            && event.displacement() < config.tap_distance_limit
            && within_path
    }
}

impl GestureRecognizer for TapRecognizer {
    fn name(&self) -> &'static str {
        "Tap Recognizer"
    }

    fn gesture_type(&self) -> GestureType {
        GestureType::Tap
    }

    fn update(
        &mut self,
        event: &ContactEvent,
        config: &GestureConfig,
        timers: &mut dyn TimerScheduler,
    ) -> Option<Recognition> {
        self.session = match mem::replace(&mut self.session, TapSession::Idle) {
            TapSession::Idle => TapSession::Active {
                source: event.source,
                latest: *event,
            },
            TapSession::Active { source, .. } if source != event.source => {
                debug!(
                    "タップ無効化: {} のターゲットが {} から {} に変わりました",
                    self.contact, source, event.source
                );
                TapSession::Idle
            }
            TapSession::Active { source, .. } => TapSession::Active {
                source,
                latest: *event,
            },
        };

        // 無効化したイベントでもタイマーは再始動する
        self.timer
            .restart(TimerKey::Tap(self.contact), config.tap_timeout(), timers);
        None
    }

    fn on_timer(&mut self, token: &TimerToken, config: &GestureConfig) -> Option<Recognition> {
        if !self.timer.claim(token) {
            return None;
        }

        match mem::replace(&mut self.session, TapSession::Idle) {
            TapSession::Active { latest, .. } if Self::accepts(&latest, config) => {
                Some(Recognition::TapCandidate(latest))
            }
            TapSession::Active { latest, .. } => {
                debug!(
                    "タップ却下: {} 経過時間 = {:.4}s, 変位 = {:.4}, 経路長 = {:.4}",
                    self.contact,
                    latest.elapsed,
                    latest.displacement(),
                    latest.cumulative_distance
                );
                None
            }
            TapSession::Idle => None,
        }
    }

    fn reset(&mut self, timers: &mut dyn TimerScheduler) {
        self.timer.cancel(timers);
        self.session = TapSession::Idle;
    }

    fn is_active(&self) -> bool {
        self.session != TapSession::Idle || self.timer.is_pending()
    }
}
