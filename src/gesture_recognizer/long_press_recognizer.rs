// LumosGestures 長押し認識器
// 一定時間以上ほとんど動かない接触を長押しとして認識する

use std::mem;

use log::debug;

use crate::config::GestureConfig;
use crate::gesture_recognizer::{
    ContactEvent, ContactId, GestureEvent, GestureRecognizer, GestureType, Recognition, SourceId,
};
use crate::timer::{Debounce, TimerKey, TimerScheduler, TimerToken};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LongPressSession {
    Idle,
    Active { source: SourceId, triggered: bool },
}

/// 長押し認識器
///
/// 判定はイベントごとに同期的に行い、1セッションにつき1回だけ発行する。
/// タイマーは静止によるセッションのリセットにだけ使う。
/// 接触中にターゲットが変わるとセッションは即座に破棄され、発行済みの記録も消える。
#[derive(Debug)]
pub struct LongPressRecognizer {
    contact: ContactId,
    session: LongPressSession,
    timer: Debounce,
}

impl LongPressRecognizer {
    pub fn new(contact: ContactId) -> Self {
        Self {
            contact,
            session: LongPressSession::Idle,
            timer: Debounce::new(),
        }
    }

    /// 現在のセッションで長押しが発行済みか
    pub fn is_triggered(&self) -> bool {
        matches!(self.session, LongPressSession::Active { triggered: true, .. })
    }

    fn qualifies(event: &ContactEvent, config: &GestureConfig) -> bool {
        event.is_well_formed()
            && event.elapsed > config.long_press_duration
            && event.displacement() < config.long_press_distance_limit
    }
}

impl GestureRecognizer for LongPressRecognizer {
    fn name(&self) -> &'static str {
        "Long Press Recognizer"
    }

    fn gesture_type(&self) -> GestureType {
        GestureType::LongPress
    }

    fn update(
        &mut self,
        event: &ContactEvent,
        config: &GestureConfig,
        timers: &mut dyn TimerScheduler,
    ) -> Option<Recognition> {
        let mut recognition = None;

        self.session = match mem::replace(&mut self.session, LongPressSession::Idle) {
            LongPressSession::Idle => LongPressSession::Active {
                source: event.source,
                triggered: false,
            },
            LongPressSession::Active { source, .. } if source != event.source => {
                debug!(
                    "長押し無効化: {} のターゲットが {} から {} に変わりました",
                    self.contact, source, event.source
                );
                LongPressSession::Idle
            }
            active => active,
        };

        if let LongPressSession::Active { triggered, .. } = &mut self.session {
            if !*triggered && Self::qualifies(event, config) {
                *triggered = true;
                recognition = Some(Recognition::Gesture(GestureEvent::new(
                    GestureType::LongPress,
                    *event,
                )));
            }
        }

        self.timer.restart(
            TimerKey::LongPress(self.contact),
            config.long_press_timeout(),
            timers,
        );
        recognition
    }

    fn on_timer(&mut self, token: &TimerToken, config: &GestureConfig) -> Option<Recognition> {
        if !self.timer.claim(token) {
            return None;
        }

        if let LongPressSession::Active { triggered: false, .. } = self.session {
            debug!(
                "長押し却下: {} は {:.2}s 以内に静止しました",
                self.contact, config.long_press_duration
            );
        }
        self.session = LongPressSession::Idle;
        None
    }

    fn reset(&mut self, timers: &mut dyn TimerScheduler) {
        self.timer.cancel(timers);
        self.session = LongPressSession::Idle;
    }

    fn is_active(&self) -> bool {
        self.session != LongPressSession::Idle || self.timer.is_pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::ManualScheduler;
    use glam::DVec2;
    use std::time::Duration;

    fn event(source: u64, elapsed: f64, dx: f64) -> ContactEvent {
        ContactEvent::new(ContactId(3), SourceId(source), elapsed).with_direction(DVec2::new(dx, 0.0))
    }

    fn is_long_press(recognition: &Option<Recognition>) -> bool {
        matches!(
            recognition,
            Some(Recognition::Gesture(gesture)) if gesture.gesture_type == GestureType::LongPress
        )
    }

    #[test]
    fn test_long_press_fires_once_per_session() {
        let config = GestureConfig::default();
        let mut timers = ManualScheduler::new();
        let mut recognizer = LongPressRecognizer::new(ContactId(3));

        assert!(recognizer.update(&event(1, 0.1, 0.0), &config, &mut timers).is_none());
        assert!(recognizer.update(&event(1, 0.3, 0.001), &config, &mut timers).is_none());
        assert!(is_long_press(&recognizer.update(&event(1, 0.45, 0.002), &config, &mut timers)));
        assert!(recognizer.is_triggered());

        // 条件を満たし続けても再発行しない
        assert!(recognizer.update(&event(1, 0.5, 0.002), &config, &mut timers).is_none());
        assert!(recognizer.update(&event(1, 0.9, 0.003), &config, &mut timers).is_none());
    }

    #[test]
    fn test_long_press_requires_stillness() {
        let config = GestureConfig::default();
        let mut timers = ManualScheduler::new();
        let mut recognizer = LongPressRecognizer::new(ContactId(3));

        recognizer.update(&event(1, 0.1, 0.0), &config, &mut timers);
        assert!(recognizer.update(&event(1, 0.5, 0.02), &config, &mut timers).is_none());
        assert!(!recognizer.is_triggered());
    }

    #[test]
    fn test_first_event_can_trigger() {
        let config = GestureConfig::default();
        let mut timers = ManualScheduler::new();
        let mut recognizer = LongPressRecognizer::new(ContactId(3));

        assert!(is_long_press(&recognizer.update(&event(1, 0.6, 0.0), &config, &mut timers)));
    }

    #[test]
    fn test_quiescence_resets_latch() {
        let config = GestureConfig::default();
        let mut timers = ManualScheduler::new();
        let mut recognizer = LongPressRecognizer::new(ContactId(3));

        assert!(is_long_press(&recognizer.update(&event(1, 0.5, 0.0), &config, &mut timers)));

        let token = timers.pop_due(Duration::MAX).unwrap();
        assert!(recognizer.on_timer(&token, &config).is_none());
        assert!(!recognizer.is_active());

        // 新しいセッションでは再び発行できる
        assert!(is_long_press(&recognizer.update(&event(1, 0.5, 0.0), &config, &mut timers)));
    }

    #[test]
    fn test_source_change_resets_session_immediately() {
        let config = GestureConfig::default();
        let mut timers = ManualScheduler::new();
        let mut recognizer = LongPressRecognizer::new(ContactId(3));

        recognizer.update(&event(1, 0.1, 0.0), &config, &mut timers);
        // 無効化したイベントは条件を満たしていても評価しない
        assert!(recognizer.update(&event(2, 0.5, 0.0), &config, &mut timers).is_none());
        assert!(!recognizer.is_triggered());
        assert_eq!(timers.pending_count(), 1);

        // 次のイベントから新しいセッション
        assert!(is_long_press(&recognizer.update(&event(2, 0.6, 0.0), &config, &mut timers)));
        assert!(recognizer.update(&event(2, 0.7, 0.0), &config, &mut timers).is_none());
    }

    #[test]
    fn test_source_change_clears_trigger_latch() {
        let config = GestureConfig::default();
        let mut timers = ManualScheduler::new();
        let mut recognizer = LongPressRecognizer::new(ContactId(3));

        assert!(is_long_press(&recognizer.update(&event(1, 0.5, 0.0), &config, &mut timers)));
        recognizer.update(&event(2, 0.55, 0.0), &config, &mut timers);
        assert!(!recognizer.is_triggered());

        assert!(is_long_press(&recognizer.update(&event(2, 0.6, 0.0), &config, &mut timers)));

        let token = timers.pop_due(Duration::MAX).unwrap();
        recognizer.on_timer(&token, &config);
        assert!(!recognizer.is_active());
    }

    #[test]
    fn test_stale_timer_does_not_reset() {
        let config = GestureConfig::default();
        let mut timers = ManualScheduler::new();
        let mut recognizer = LongPressRecognizer::new(ContactId(3));

        recognizer.update(&event(1, 0.5, 0.0), &config, &mut timers);
        let stale = TimerToken {
            key: TimerKey::LongPress(ContactId(3)),
            id: 1,
        };
        recognizer.update(&event(1, 0.55, 0.0), &config, &mut timers);

        recognizer.on_timer(&stale, &config);
        assert!(recognizer.is_triggered());
    }
}
