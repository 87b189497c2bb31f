// LumosGestures ジェスチャー認識モジュール
// 接触イベントの連続からタップ・ダブルタップ・長押し・フリックを検出する

//! ジェスチャー認識モジュール
//!
//! 接触ストリームごとにタップ・長押し・フリックの認識器が並行して動作し、
//! タップ候補はダブルタップ認識器を経由して単独タップかダブルタップに確定する。
//! 認識器の状態はすべて [`GestureEngine`] が所有するテーブルにあり、
//! 状態遷移はイベント処理とタイマー発火の中でのみ起こる。

pub mod gesture_recognizer;
pub mod tap_recognizer;
pub mod double_tap_recognizer;
pub mod long_press_recognizer;
pub mod flick_recognizer;

// 主要な型の再エクスポート
pub use gesture_recognizer::{
    ContactEvent, ContactId, FlickDirection, GestureEvent, GestureRecognizer, GestureType,
    Recognition, SourceId,
};
pub use double_tap_recognizer::{DoubleTapRecognizer, PendingTapCandidate};
pub use flick_recognizer::{FlickPhase, FlickRecognizer};
pub use long_press_recognizer::LongPressRecognizer;
pub use tap_recognizer::TapRecognizer;

use std::collections::HashMap;
use std::time::Duration;

use log::{debug, info};

use crate::config::GestureConfig;
use crate::dispatch::GestureDispatcher;
use crate::error::GestureResult;
use crate::timer::{ManualScheduler, TimerKey, TimerScheduler, TimerToken};

/// 1つの接触ストリームに属する認識器一式
#[derive(Debug)]
pub struct ContactRecognizers {
    pub tap: TapRecognizer,
    pub long_press: LongPressRecognizer,
    pub flick: FlickRecognizer,
}

impl ContactRecognizers {
    pub fn new(contact: ContactId) -> Self {
        Self {
            tap: TapRecognizer::new(contact),
            long_press: LongPressRecognizer::new(contact),
            flick: FlickRecognizer::new(contact),
        }
    }

    /// イベントを渡す順番で並べた認識器
    fn all_mut(&mut self) -> [&mut dyn GestureRecognizer; 3] {
        [&mut self.tap, &mut self.long_press, &mut self.flick]
    }

    fn for_timer(&mut self, key: &TimerKey) -> Option<&mut dyn GestureRecognizer> {
        match key {
            TimerKey::Tap(_) => Some(&mut self.tap),
            TimerKey::LongPress(_) => Some(&mut self.long_press),
            TimerKey::Flick(_) => Some(&mut self.flick),
            TimerKey::DoubleTap(_) => None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.tap.is_active() || self.long_press.is_active() || self.flick.is_active()
    }

    fn reset(&mut self, timers: &mut dyn TimerScheduler) {
        for recognizer in self.all_mut() {
            recognizer.reset(timers);
        }
    }
}

/// ジェスチャーエンジン
///
/// 接触ストリームごとの認識器テーブルとダブルタップ認識器を所有し、
/// 接触イベントとタイマー発火を振り分ける。認識されたジェスチャーは
/// 戻り値として返すと同時に [`GestureDispatcher`] へ配信する。
pub struct GestureEngine<S: TimerScheduler> {
    config: GestureConfig,
    contacts: HashMap<ContactId, ContactRecognizers>,
    double_tap: DoubleTapRecognizer,
    scheduler: S,
    dispatcher: GestureDispatcher,
}

impl<S: TimerScheduler> GestureEngine<S> {
    pub fn new(config: GestureConfig, scheduler: S) -> GestureResult<Self> {
        let dispatcher = GestureDispatcher::new(config.channel_capacity);
        Self::with_dispatcher(config, scheduler, dispatcher)
    }

    /// 既存の配信先を共有してエンジンを作成
    pub fn with_dispatcher(
        config: GestureConfig,
        scheduler: S,
        dispatcher: GestureDispatcher,
    ) -> GestureResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            contacts: HashMap::new(),
            double_tap: DoubleTapRecognizer::new(),
            scheduler,
            dispatcher,
        })
    }

    pub fn config(&self) -> &GestureConfig {
        &self.config
    }

    /// 設定を更新する。進行中のセッションと保留中の候補は破棄される。
    pub fn update_config(&mut self, config: GestureConfig) -> GestureResult<()> {
        config.validate()?;
        self.reset_all();
        self.config = config;
        info!("ジェスチャー設定を更新しました");
        Ok(())
    }

    pub fn dispatcher(&self) -> &GestureDispatcher {
        &self.dispatcher
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    /// 接触イベントを処理して、同期的に確定したジェスチャーを返す
    pub fn process_event(&mut self, event: &ContactEvent) -> Vec<GestureEvent> {
        let mut recognitions = Vec::new();

        let recognizers = self.contacts.entry(event.contact).or_insert_with(|| {
            debug!("接触ストリームを追跡開始: {}", event.contact);
            ContactRecognizers::new(event.contact)
        });

        for recognizer in recognizers.all_mut() {
            if let Some(recognition) = recognizer.update(event, &self.config, &mut self.scheduler) {
                recognitions.push(recognition);
            }
        }

        let mut gestures = Vec::new();
        for recognition in recognitions {
            self.handle(recognition, &mut gestures);
        }
        self.publish(&gestures);
        gestures
    }

    /// タイマー発火を処理する。置き換え済みのタイマーは何もしない。
    pub fn fire_timer(&mut self, token: &TimerToken) -> Vec<GestureEvent> {
        let mut gestures = Vec::new();

        match token.key {
            TimerKey::DoubleTap(_) => {
                gestures.extend(self.double_tap.on_timer(token));
            }
            TimerKey::Tap(contact) | TimerKey::LongPress(contact) | TimerKey::Flick(contact) => {
                let recognition = self
                    .contacts
                    .get_mut(&contact)
                    .and_then(|recognizers| recognizers.for_timer(&token.key))
                    .and_then(|recognizer| recognizer.on_timer(token, &self.config));

                if let Some(recognition) = recognition {
                    self.handle(recognition, &mut gestures);
                }
                self.release_if_idle(contact);
            }
        }

        self.publish(&gestures);
        gestures
    }

    /// 接触ストリームを明示的に終了する。保留中の評価は破棄される。
    pub fn end_contact(&mut self, contact: ContactId) -> bool {
        match self.contacts.remove(&contact) {
            Some(mut recognizers) => {
                recognizers.reset(&mut self.scheduler);
                debug!("接触ストリームを終了: {}", contact);
                true
            }
            None => false,
        }
    }

    /// すべての認識器とダブルタップ候補をリセット
    pub fn reset_all(&mut self) {
        for (_, mut recognizers) in self.contacts.drain() {
            recognizers.reset(&mut self.scheduler);
        }
        self.double_tap.reset(&mut self.scheduler);
    }

    /// 追跡中の接触ストリーム数
    pub fn tracked_contacts(&self) -> usize {
        self.contacts.len()
    }

    pub fn recognizers(&self, contact: ContactId) -> Option<&ContactRecognizers> {
        self.contacts.get(&contact)
    }

    pub fn double_tap(&self) -> &DoubleTapRecognizer {
        &self.double_tap
    }

    fn handle(&mut self, recognition: Recognition, gestures: &mut Vec<GestureEvent>) {
        match recognition {
            Recognition::TapCandidate(event) => {
                gestures.extend(
                    self.double_tap
                        .on_candidate(event, &self.config, &mut self.scheduler),
                );
            }
            Recognition::Gesture(gesture) => gestures.push(gesture),
        }
    }

    fn release_if_idle(&mut self, contact: ContactId) {
        let idle = self
            .contacts
            .get(&contact)
            .map_or(false, |recognizers| !recognizers.is_active());
        if idle {
            self.contacts.remove(&contact);
            debug!("接触ストリームが静止しました: {}", contact);
        }
    }

    fn publish(&self, gestures: &[GestureEvent]) {
        for gesture in gestures {
            self.dispatcher.emit(gesture);
        }
    }
}

impl GestureEngine<ManualScheduler> {
    /// 仮想時計で動作するエンジンを作成
    pub fn manual(config: GestureConfig) -> GestureResult<Self> {
        Self::new(config, ManualScheduler::new())
    }

    /// 現在の仮想時刻
    pub fn now(&self) -> Duration {
        self.scheduler.now()
    }

    /// 仮想時刻を `by` だけ進め、その間に発火したタイマーを処理する
    pub fn advance(&mut self, by: Duration) -> Vec<GestureEvent> {
        let until = self.scheduler.now().saturating_add(by);
        self.advance_to(until)
    }

    /// 仮想時刻を `until` まで進める
    pub fn advance_to(&mut self, until: Duration) -> Vec<GestureEvent> {
        let mut gestures = Vec::new();
        while let Some(token) = self.scheduler.pop_due(until) {
            gestures.extend(self.fire_timer(&token));
        }
        self.scheduler.set_now(until);
        gestures
    }

    /// 保留中のタイマーがなくなるまで時間を進める
    pub fn settle(&mut self) -> Vec<GestureEvent> {
        let mut gestures = Vec::new();
        while let Some(deadline) = self.scheduler.next_deadline() {
            gestures.extend(self.advance_to(deadline));
        }
        gestures
    }
}

impl<S: TimerScheduler> std::fmt::Debug for GestureEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GestureEngine")
            .field("config", &self.config)
            .field("contacts", &self.contacts.len())
            .field("pending_double_taps", &self.double_tap.pending_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec2;

    fn touch(contact: u64, source: u64, elapsed: f64, dx: f64, dy: f64) -> ContactEvent {
        ContactEvent::new(ContactId(contact), SourceId(source), elapsed)
            .with_direction(DVec2::new(dx, dy))
    }

    fn kinds(gestures: &[GestureEvent]) -> Vec<GestureType> {
        gestures.iter().map(|gesture| gesture.gesture_type).collect()
    }

    fn tap_on(engine: &mut GestureEngine<ManualScheduler>, contact: u64, source: u64) {
        engine.process_event(&touch(contact, source, 0.05, 0.0, 0.0));
        engine.process_event(&touch(contact, source, 0.1, 0.001, 0.0));
    }

    #[test]
    fn test_single_tap() {
        let mut engine = GestureEngine::manual(GestureConfig::default()).unwrap();

        assert!(engine.process_event(&touch(1, 1, 0.05, 0.0, 0.0)).is_empty());
        assert!(engine.process_event(&touch(1, 1, 0.15, 0.002, 0.0)).is_empty());

        // 評価後もダブルタップ待ちなのでまだ何も出ない
        assert!(engine.advance(Duration::from_millis(10)).is_empty());
        assert_eq!(engine.double_tap().pending_count(), 1);

        let gestures = engine.advance(Duration::from_millis(300));
        assert_eq!(kinds(&gestures), vec![GestureType::Tap]);
        assert_eq!(gestures[0].event.elapsed, 0.15);
    }

    #[test]
    fn test_tap_rejected_when_distance_exceeded() {
        let mut engine = GestureEngine::manual(GestureConfig::default()).unwrap();

        engine.process_event(&touch(1, 1, 0.05, 0.0, 0.0));
        engine.process_event(&touch(1, 1, 0.15, 0.01, 0.0));

        assert!(engine.settle().is_empty());
        assert_eq!(engine.double_tap().pending_count(), 0);
    }

    #[test]
    fn test_double_tap() {
        let mut engine = GestureEngine::manual(GestureConfig::default()).unwrap();

        tap_on(&mut engine, 1, 9);
        assert!(engine.advance(Duration::from_millis(100)).is_empty());
        tap_on(&mut engine, 1, 9);

        let gestures = engine.settle();
        assert_eq!(kinds(&gestures), vec![GestureType::DoubleTap]);
        assert_eq!(gestures[0].source(), SourceId(9));
    }

    #[test]
    fn test_taps_on_different_sources_stay_independent() {
        let mut engine = GestureEngine::manual(GestureConfig::default()).unwrap();

        tap_on(&mut engine, 1, 1);
        engine.advance(Duration::from_millis(50));
        tap_on(&mut engine, 1, 2);

        let gestures = engine.settle();
        assert_eq!(kinds(&gestures), vec![GestureType::Tap, GestureType::Tap]);
        assert_eq!(gestures[0].source(), SourceId(1));
        assert_eq!(gestures[1].source(), SourceId(2));
    }

    #[test]
    fn test_double_tap_from_two_contacts_on_same_source() {
        let mut engine = GestureEngine::manual(GestureConfig::default()).unwrap();

        tap_on(&mut engine, 1, 4);
        engine.advance(Duration::from_millis(20));
        tap_on(&mut engine, 2, 4);

        assert_eq!(kinds(&engine.settle()), vec![GestureType::DoubleTap]);
    }

    #[test]
    fn test_long_press_is_synchronous() {
        let mut engine = GestureEngine::manual(GestureConfig::default()).unwrap();

        assert!(engine.process_event(&touch(1, 1, 0.1, 0.0, 0.0)).is_empty());
        let gestures = engine.process_event(&touch(1, 1, 0.45, 0.001, 0.0));
        assert_eq!(kinds(&gestures), vec![GestureType::LongPress]);

        assert!(engine.process_event(&touch(1, 1, 0.5, 0.001, 0.0)).is_empty());
        // 接触時間が長いのでタップにはならない
        assert!(engine.settle().is_empty());
    }

    #[test]
    fn test_flick() {
        let mut engine = GestureEngine::manual(GestureConfig::default()).unwrap();

        engine.process_event(&touch(1, 1, 0.02, 0.0, 0.0));
        let gestures = engine.process_event(&touch(1, 1, 0.08, -0.1, 0.0));

        assert_eq!(kinds(&gestures), vec![GestureType::Flick]);
        assert_eq!(gestures[0].direction, Some(DVec2::new(-1.0, 0.0)));
        assert_eq!(gestures[0].flick_direction(), Some(FlickDirection::Left));
        assert!(engine.settle().is_empty());
    }

    #[test]
    fn test_source_change_event_emits_nothing() {
        let mut engine = GestureEngine::manual(GestureConfig::default()).unwrap();

        engine.process_event(&touch(1, 1, 0.05, 0.0, 0.0));
        // 長押しの条件を満たすが、ターゲットが変わったイベントは評価されない
        assert!(engine.process_event(&touch(1, 2, 0.5, 0.0, 0.0)).is_empty());

        assert!(engine.settle().is_empty());
        assert_eq!(engine.tracked_contacts(), 0);
    }

    #[test]
    fn test_new_target_starts_new_session() {
        let mut engine = GestureEngine::manual(GestureConfig::default()).unwrap();

        engine.process_event(&touch(1, 1, 0.01, 0.0, 0.0));
        engine.process_event(&touch(1, 2, 0.02, 0.0, 0.0));
        engine.process_event(&touch(1, 2, 0.03, 0.0, 0.0));

        let gestures = engine.settle();
        assert_eq!(kinds(&gestures), vec![GestureType::Tap]);
        assert_eq!(gestures[0].source(), SourceId(2));
    }

    #[test]
    fn test_contacts_are_tracked_independently() {
        let mut engine = GestureEngine::manual(GestureConfig::default()).unwrap();

        engine.process_event(&touch(1, 1, 0.05, 0.0, 0.0));
        engine.process_event(&touch(2, 2, 0.05, 0.0, 0.0));
        assert_eq!(engine.tracked_contacts(), 2);

        // 接触2だけ長押し
        engine.process_event(&touch(2, 2, 0.3, 0.0, 0.0));
        let gestures = engine.process_event(&touch(2, 2, 0.45, 0.0, 0.0));
        assert_eq!(kinds(&gestures), vec![GestureType::LongPress]);
        assert_eq!(gestures[0].contact(), ContactId(2));

        // 接触1はタップとして確定する
        let gestures = engine.settle();
        assert_eq!(kinds(&gestures), vec![GestureType::Tap]);
        assert_eq!(gestures[0].contact(), ContactId(1));
        assert_eq!(engine.tracked_contacts(), 0);
    }

    #[test]
    fn test_end_contact_discards_pending_tap() {
        let mut engine = GestureEngine::manual(GestureConfig::default()).unwrap();

        tap_on(&mut engine, 1, 1);
        assert!(engine.end_contact(ContactId(1)));
        assert!(!engine.end_contact(ContactId(1)));

        assert!(engine.settle().is_empty());
        assert_eq!(engine.scheduler().pending_count(), 0);
    }

    #[test]
    fn test_update_config_resets_sessions() {
        let mut engine = GestureEngine::manual(GestureConfig::default()).unwrap();
        tap_on(&mut engine, 1, 1);

        let config = GestureConfig {
            tap_distance_limit: 0.02,
            ..GestureConfig::default()
        };
        engine.update_config(config).unwrap();
        assert_eq!(engine.tracked_contacts(), 0);
        assert!(engine.settle().is_empty());

        // 緩めた距離しきい値で認識される
        engine.process_event(&touch(1, 1, 0.05, 0.015, 0.0));
        assert_eq!(kinds(&engine.settle()), vec![GestureType::Tap]);

        let invalid = GestureConfig {
            double_tap_interval: -1.0,
            ..GestureConfig::default()
        };
        assert!(engine.update_config(invalid).is_err());
        assert_eq!(engine.config().tap_distance_limit, 0.02);
    }

    #[test]
    fn test_gestures_are_published() {
        let mut engine = GestureEngine::manual(GestureConfig::default()).unwrap();
        let mut all = engine.dispatcher().subscribe_all();

        tap_on(&mut engine, 1, 1);
        engine.settle();

        assert_eq!(all.try_recv().unwrap().gesture_type, GestureType::Tap);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = GestureConfig {
            tap_timeout_duration: f64::INFINITY,
            ..GestureConfig::default()
        };
        assert!(GestureEngine::manual(config).is_err());
    }
}
