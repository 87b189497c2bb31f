// LumosGestures タイマー
// 認識器が使うキャンセル可能な遅延タイマー。
// 同じキーで新しいタイマーを開始すると、古いタイマーは必ず破棄される。

use std::collections::HashMap;
use std::time::Duration;

use log::trace;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::gesture_recognizer::{ContactId, SourceId};

/// タイマーの所有者を表すキー
///
/// 1つのキーに対して同時に存在できるタイマーは1つだけ。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKey {
    /// タップ評価タイマー (接触ストリーム単位)
    Tap(ContactId),
    /// 長押しリセットタイマー (接触ストリーム単位)
    LongPress(ContactId),
    /// フリックリセットタイマー (接触ストリーム単位)
    Flick(ContactId),
    /// ダブルタップ待ちウィンドウ (ターゲット単位)
    DoubleTap(SourceId),
}

/// スケジュール済みタイマーの識別子
///
/// `id` はスケジューラ内で一意。発火したトークンが認識器の保持する
/// トークンと一致しない場合、そのタイマーは既に置き換えられている。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken {
    pub key: TimerKey,
    pub id: u64,
}

/// キャンセル可能な遅延タイマーの抽象
pub trait TimerScheduler {
    /// `delay` 後に発火するタイマーを開始する。同じキーの既存タイマーは破棄される。
    fn schedule(&mut self, key: TimerKey, delay: Duration) -> TimerToken;

    /// タイマーをキャンセルする。既に発火済み・置換済みなら何もしない。
    fn cancel(&mut self, token: &TimerToken);
}

/// デバウンス用のタイマースロット
///
/// イベントごとに `restart` し、発火したトークンは `claim` で照合する。
#[derive(Debug, Default)]
pub struct Debounce {
    pending: Option<TimerToken>,
}

impl Debounce {
    pub fn new() -> Self {
        Self { pending: None }
    }

    /// 保留中のタイマーをキャンセルして新しく開始する
    pub fn restart(
        &mut self,
        key: TimerKey,
        delay: Duration,
        timers: &mut dyn TimerScheduler,
    ) -> TimerToken {
        if let Some(previous) = self.pending.take() {
            timers.cancel(&previous);
        }
        let token = timers.schedule(key, delay);
        self.pending = Some(token);
        token
    }

    /// 保留中のタイマーをキャンセルする
    pub fn cancel(&mut self, timers: &mut dyn TimerScheduler) {
        if let Some(previous) = self.pending.take() {
            timers.cancel(&previous);
        }
    }

    /// 発火したトークンが現在のタイマーなら受理してスロットを空にする
    pub fn claim(&mut self, token: &TimerToken) -> bool {
        if self.pending.as_ref() == Some(token) {
            self.pending = None;
            true
        } else {
            false
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// tokio 上で動作するタイマースケジューラ
///
/// タイマーは `tokio::time::sleep` するタスクとして起動され、発火すると
/// トークンがチャネルに送られる。受信側はエンジンを駆動するタスク。
pub struct TokioScheduler {
    fired_tx: mpsc::UnboundedSender<TimerToken>,
    active: HashMap<TimerKey, (u64, AbortHandle)>,
    next_id: u64,
}

impl TokioScheduler {
    /// スケジューラと発火通知の受信側を作成
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerToken>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            fired_tx,
            active: HashMap::new(),
            next_id: 0,
        };
        (scheduler, fired_rx)
    }

    /// 発火通知を受け取ったときに呼ぶ。現在のタイマーであれば true。
    pub fn complete(&mut self, token: &TimerToken) -> bool {
        match self.active.get(&token.key) {
            Some((id, _)) if *id == token.id => {
                self.active.remove(&token.key);
                true
            }
            _ => false,
        }
    }

    /// すべてのタイマーを破棄する
    pub fn cancel_all(&mut self) {
        for (_, (_, handle)) in self.active.drain() {
            handle.abort();
        }
    }

    /// 保留中のタイマー数
    pub fn pending_count(&self) -> usize {
        self.active.len()
    }
}

impl TimerScheduler for TokioScheduler {
    fn schedule(&mut self, key: TimerKey, delay: Duration) -> TimerToken {
        self.next_id += 1;
        let token = TimerToken {
            key,
            id: self.next_id,
        };

        if let Some((_, previous)) = self.active.remove(&key) {
            previous.abort();
        }

        let fired_tx = self.fired_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // 受信側が閉じていればエンジンは停止済み
            let _ = fired_tx.send(token);
        });

        trace!("タイマー開始: {:?} ({:?})", token, delay);
        self.active.insert(key, (token.id, handle.abort_handle()));
        token
    }

    fn cancel(&mut self, token: &TimerToken) {
        let is_current = matches!(self.active.get(&token.key), Some((id, _)) if *id == token.id);
        if is_current {
            if let Some((_, handle)) = self.active.remove(&token.key) {
                handle.abort();
                trace!("タイマーキャンセル: {:?}", token);
            }
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[derive(Debug, Clone, Copy)]
struct ScheduledTimer {
    deadline: Duration,
    token: TimerToken,
}

/// 仮想時計で動作するスケジューラ
///
/// 時間は `pop_due` / `set_now` で明示的に進める。リプレイやテスト、
/// 独自のフレームループに組み込む場合に使う。
#[derive(Debug, Default)]
pub struct ManualScheduler {
    now: Duration,
    next_id: u64,
    queue: Vec<ScheduledTimer>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 現在の仮想時刻
    pub fn now(&self) -> Duration {
        self.now
    }

    /// 保留中のタイマー数
    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// 最も早い発火予定時刻
    pub fn next_deadline(&self) -> Option<Duration> {
        self.queue.iter().map(|timer| timer.deadline).min()
    }

    /// `until` までに発火するタイマーのうち最も早いものを取り出す
    ///
    /// 仮想時刻はそのタイマーの発火時刻まで進む。同時刻のタイマーは
    /// スケジュールされた順に取り出される。
    pub fn pop_due(&mut self, until: Duration) -> Option<TimerToken> {
        let index = self
            .queue
            .iter()
            .enumerate()
            .filter(|(_, timer)| timer.deadline <= until)
            .min_by_key(|(_, timer)| (timer.deadline, timer.token.id))
            .map(|(index, _)| index)?;

        let timer = self.queue.swap_remove(index);
        if timer.deadline > self.now {
            self.now = timer.deadline;
        }
        Some(timer.token)
    }

    /// 仮想時刻を進める (戻すことはできない)
    pub fn set_now(&mut self, now: Duration) {
        if now > self.now {
            self.now = now;
        }
    }
}

impl TimerScheduler for ManualScheduler {
    fn schedule(&mut self, key: TimerKey, delay: Duration) -> TimerToken {
        self.next_id += 1;
        let token = TimerToken {
            key,
            id: self.next_id,
        };

        self.queue.retain(|timer| timer.token.key != key);
        self.queue.push(ScheduledTimer {
            deadline: self.now.saturating_add(delay),
            token,
        });
        token
    }

    fn cancel(&mut self, token: &TimerToken) {
        self.queue.retain(|timer| timer.token.id != token.id);
    }
}
