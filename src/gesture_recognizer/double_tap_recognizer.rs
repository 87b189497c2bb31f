// LumosGestures ダブルタップ認識器
// タップ候補を受け取り、時間窓の中で単独タップかダブルタップかを決める

use std::collections::HashMap;

use log::debug;

use crate::config::GestureConfig;
use crate::gesture_recognizer::{ContactEvent, GestureEvent, GestureType, SourceId};
use crate::timer::{TimerKey, TimerScheduler, TimerToken};

/// 2回目のタップを待っている候補
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingTapCandidate {
    pub source: SourceId,
    pub event: ContactEvent,
    timer: TimerToken,
}

/// ダブルタップ認識器
///
/// 保留できる候補はターゲットごとに1つ。別のターゲットの候補は
/// 互いの待ち時間に影響しない。
#[derive(Debug, Default)]
pub struct DoubleTapRecognizer {
    pending: HashMap<SourceId, PendingTapCandidate>,
}

impl DoubleTapRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// タップ候補を処理する。ダブルタップが成立したときだけ結果を返す。
    pub fn on_candidate(
        &mut self,
        event: ContactEvent,
        config: &GestureConfig,
        timers: &mut dyn TimerScheduler,
    ) -> Option<GestureEvent> {
        if let Some(first) = self.pending.remove(&event.source) {
            timers.cancel(&first.timer);
            debug!("ダブルタップ: {}", event.source);
            return Some(GestureEvent::new(GestureType::DoubleTap, event));
        }

        let timer = timers.schedule(TimerKey::DoubleTap(event.source), config.double_tap_window());
        self.pending.insert(
            event.source,
            PendingTapCandidate {
                source: event.source,
                event,
                timer,
            },
        );
        None
    }

    /// 待ち時間が切れた候補を単独タップとして確定する
    pub fn on_timer(&mut self, token: &TimerToken) -> Option<GestureEvent> {
        let source = match token.key {
            TimerKey::DoubleTap(source) => source,
            _ => return None,
        };

        match self.pending.get(&source) {
            Some(candidate) if candidate.timer == *token => {
                let candidate = self.pending.remove(&source)?;
                debug!("タップ: {} (2回目のタップなし)", source);
                Some(GestureEvent::new(GestureType::Tap, candidate.event))
            }
            _ => None,
        }
    }

    pub fn pending(&self, source: SourceId) -> Option<&PendingTapCandidate> {
        self.pending.get(&source)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// 保留中の候補をすべて破棄する (タップは発行しない)
    pub fn reset(&mut self, timers: &mut dyn TimerScheduler) {
        for (_, candidate) in self.pending.drain() {
            timers.cancel(&candidate.timer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture_recognizer::ContactId;
    use crate::timer::ManualScheduler;
    use std::time::Duration;

    fn candidate(source: u64, elapsed: f64) -> ContactEvent {
        ContactEvent::new(ContactId(1), SourceId(source), elapsed)
    }

    #[test]
    fn test_single_tap_after_window() {
        let config = GestureConfig::default();
        let mut timers = ManualScheduler::new();
        let mut recognizer = DoubleTapRecognizer::new();

        assert!(recognizer.on_candidate(candidate(1, 0.05), &config, &mut timers).is_none());
        assert_eq!(recognizer.pending_count(), 1);

        let token = timers.pop_due(Duration::MAX).unwrap();
        assert_eq!(timers.now(), Duration::from_millis(250));

        let tap = recognizer.on_timer(&token).unwrap();
        assert_eq!(tap.gesture_type, GestureType::Tap);
        assert_eq!(tap.event, candidate(1, 0.05));
        assert_eq!(recognizer.pending_count(), 0);
    }

    #[test]
    fn test_double_tap_within_window() {
        let config = GestureConfig::default();
        let mut timers = ManualScheduler::new();
        let mut recognizer = DoubleTapRecognizer::new();

        recognizer.on_candidate(candidate(1, 0.05), &config, &mut timers);
        timers.set_now(Duration::from_millis(100));

        let double = recognizer
            .on_candidate(candidate(1, 0.07), &config, &mut timers)
            .unwrap();
        assert_eq!(double.gesture_type, GestureType::DoubleTap);
        assert_eq!(double.event, candidate(1, 0.07));

        // 待ち時間タイマーはキャンセル済み
        assert_eq!(timers.pending_count(), 0);
        assert_eq!(recognizer.pending_count(), 0);
    }

    #[test]
    fn test_other_source_does_not_complete_double_tap() {
        let config = GestureConfig::default();
        let mut timers = ManualScheduler::new();
        let mut recognizer = DoubleTapRecognizer::new();

        recognizer.on_candidate(candidate(1, 0.05), &config, &mut timers);
        timers.set_now(Duration::from_millis(100));
        assert!(recognizer.on_candidate(candidate(2, 0.05), &config, &mut timers).is_none());
        assert_eq!(recognizer.pending_count(), 2);

        let mut taps = Vec::new();
        while let Some(token) = timers.pop_due(Duration::MAX) {
            taps.extend(recognizer.on_timer(&token));
        }

        assert_eq!(taps.len(), 2);
        assert!(taps.iter().all(|tap| tap.gesture_type == GestureType::Tap));
        assert_eq!(taps[0].source(), SourceId(1));
        assert_eq!(taps[1].source(), SourceId(2));
    }

    #[test]
    fn test_third_tap_opens_new_window() {
        let config = GestureConfig::default();
        let mut timers = ManualScheduler::new();
        let mut recognizer = DoubleTapRecognizer::new();

        recognizer.on_candidate(candidate(1, 0.05), &config, &mut timers);
        assert!(recognizer.on_candidate(candidate(1, 0.05), &config, &mut timers).is_some());
        assert!(recognizer.on_candidate(candidate(1, 0.05), &config, &mut timers).is_none());
        assert!(recognizer.pending(SourceId(1)).is_some());
    }

    #[test]
    fn test_stale_window_token_is_ignored() {
        let config = GestureConfig::default();
        let mut timers = ManualScheduler::new();
        let mut recognizer = DoubleTapRecognizer::new();

        recognizer.on_candidate(candidate(1, 0.05), &config, &mut timers);
        let stale = recognizer.pending(SourceId(1)).unwrap().timer;
        recognizer.on_candidate(candidate(1, 0.05), &config, &mut timers);
        recognizer.on_candidate(candidate(1, 0.05), &config, &mut timers);

        assert!(recognizer.on_timer(&stale).is_none());
        assert_eq!(recognizer.pending_count(), 1);
    }

    #[test]
    fn test_reset_discards_pending_candidates() {
        let config = GestureConfig::default();
        let mut timers = ManualScheduler::new();
        let mut recognizer = DoubleTapRecognizer::new();

        recognizer.on_candidate(candidate(1, 0.05), &config, &mut timers);
        recognizer.on_candidate(candidate(2, 0.05), &config, &mut timers);
        recognizer.reset(&mut timers);

        assert_eq!(recognizer.pending_count(), 0);
        assert_eq!(timers.pending_count(), 0);
    }
}
