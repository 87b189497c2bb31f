// LumosGestures フリック認識器
// 短時間で一定距離以上動いた接触をフリックとして認識する

use log::debug;

use crate::config::GestureConfig;
use crate::gesture_recognizer::{
    ContactEvent, ContactId, GestureEvent, GestureRecognizer, GestureType, Recognition,
};
use crate::timer::{Debounce, TimerKey, TimerScheduler, TimerToken};

/// フリック認識の段階
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlickPhase {
    /// 待機中
    Unarmed,
    /// 最初のイベントを受け取り、判定待ち
    Armed,
    /// 発行済みまたは却下済み。リセットまで何もしない
    Resolved,
}

/// フリック認識器
#[derive(Debug)]
pub struct FlickRecognizer {
    contact: ContactId,
    phase: FlickPhase,
    timer: Debounce,
}

impl FlickRecognizer {
    pub fn new(contact: ContactId) -> Self {
        Self {
            contact,
            phase: FlickPhase::Unarmed,
            timer: Debounce::new(),
        }
    }

    pub fn phase(&self) -> FlickPhase {
        self.phase
    }

    fn evaluate(&mut self, event: &ContactEvent, config: &GestureConfig) -> Option<Recognition> {
        if !event.is_well_formed() {
            debug!("フリック却下: {} の入力値が不正です", self.contact);
            self.phase = FlickPhase::Resolved;
            return None;
        }

        // 時間超過の判定が距離の判定より先
        if event.elapsed > config.flick_max_duration {
            debug!(
                "フリック却下: {} 変位 = {:.4}, 経過時間 = {:.4}s",
                self.contact,
                event.displacement(),
                event.elapsed
            );
            self.phase = FlickPhase::Resolved;
            return None;
        }

        if event.displacement() >= config.flick_min_distance {
            let direction = event.cumulative_direction.normalize_or_zero();
            debug!("フリック: {} 方向 = {:?}", self.contact, direction);
            self.phase = FlickPhase::Resolved;
            return Some(Recognition::Gesture(
                GestureEvent::new(GestureType::Flick, *event).with_direction(direction),
            ));
        }

        None
    }
}

impl GestureRecognizer for FlickRecognizer {
    fn name(&self) -> &'static str {
        "Flick Recognizer"
    }

    fn gesture_type(&self) -> GestureType {
        GestureType::Flick
    }

    fn update(
        &mut self,
        event: &ContactEvent,
        config: &GestureConfig,
        timers: &mut dyn TimerScheduler,
    ) -> Option<Recognition> {
        let recognition = match self.phase {
            FlickPhase::Unarmed => {
                self.phase = FlickPhase::Armed;
                None
            }
            FlickPhase::Armed => self.evaluate(event, config),
            FlickPhase::Resolved => None,
        };

        self.timer.restart(
            TimerKey::Flick(self.contact),
            config.flick_reset_timeout(),
            timers,
        );
        recognition
    }

    fn on_timer(&mut self, token: &TimerToken, _config: &GestureConfig) -> Option<Recognition> {
        if self.timer.claim(token) {
            self.phase = FlickPhase::Unarmed;
        }
        None
    }

    fn reset(&mut self, timers: &mut dyn TimerScheduler) {
        self.timer.cancel(timers);
        self.phase = FlickPhase::Unarmed;
    }

    fn is_active(&self) -> bool {
        self.phase != FlickPhase::Unarmed || self.timer.is_pending()
    }
}
