// LumosGestures ジェスチャー配信
// 認識結果をジェスチャー種類ごとのチャネルとコールバックに配信する

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use log::trace;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::gesture_recognizer::{GestureEvent, GestureType};

/// コールバックリスナーの識別子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    fn new() -> Self {
        ListenerId(Uuid::new_v4())
    }
}

/// ジェスチャーコールバック
pub type GestureCallback = Arc<dyn Fn(&GestureEvent) + Send + Sync>;

struct RegisteredListener {
    id: ListenerId,
    filter: Option<GestureType>,
    callback: GestureCallback,
}

/// ジェスチャーの配信先
///
/// 購読は2通り:
/// - `subscribe` / `subscribe_all` が返す受信側。破棄すれば購読解除になる。
/// - `add_listener` で登録するコールバック。`remove_listener` で解除する。
///
/// どちらも登録前に発行されたジェスチャーは受け取らない。
/// 受信側が遅れてバッファが溢れた場合、古いジェスチャーから失われる。
#[derive(Clone)]
pub struct GestureDispatcher {
    channels: Arc<HashMap<GestureType, broadcast::Sender<GestureEvent>>>,
    all: broadcast::Sender<GestureEvent>,
    listeners: Arc<RwLock<Vec<RegisteredListener>>>,
}

impl GestureDispatcher {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let channels = GestureType::ALL
            .iter()
            .map(|gesture_type| (*gesture_type, broadcast::channel(capacity).0))
            .collect();

        Self {
            channels: Arc::new(channels),
            all: broadcast::channel(capacity).0,
            listeners: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// 特定のジェスチャーを購読する
    pub fn subscribe(&self, gesture_type: GestureType) -> broadcast::Receiver<GestureEvent> {
        match self.channels.get(&gesture_type) {
            Some(sender) => sender.subscribe(),
            // ALL から作っているので到達しない
            None => self.all.subscribe(),
        }
    }

    /// すべてのジェスチャーを購読する
    pub fn subscribe_all(&self) -> broadcast::Receiver<GestureEvent> {
        self.all.subscribe()
    }

    /// 特定のジェスチャーのコールバックを登録
    pub fn add_listener<F>(&self, gesture_type: GestureType, callback: F) -> ListenerId
    where
        F: Fn(&GestureEvent) + Send + Sync + 'static,
    {
        self.register(Some(gesture_type), Arc::new(callback))
    }

    /// すべてのジェスチャーのコールバックを登録
    pub fn add_any_listener<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&GestureEvent) + Send + Sync + 'static,
    {
        self.register(None, Arc::new(callback))
    }

    /// コールバックを解除する。登録されていなければ false。
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        let before = listeners.len();
        listeners.retain(|listener| listener.id != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// 特定のジェスチャーの受信側の数 (`subscribe_all` は含まない)
    pub fn receiver_count(&self, gesture_type: GestureType) -> usize {
        self.channels
            .get(&gesture_type)
            .map_or(0, |sender| sender.receiver_count())
    }

    /// ジェスチャーを配信する。配信先がなければ何もしない。
    pub fn emit(&self, gesture: &GestureEvent) {
        // コールバック内から登録・解除できるようにロックを先に手放す
        let callbacks: Vec<GestureCallback> = {
            let listeners = self.listeners.read().unwrap_or_else(|e| e.into_inner());
            listeners
                .iter()
                .filter(|listener| listener.filter.map_or(true, |f| f == gesture.gesture_type))
                .map(|listener| listener.callback.clone())
                .collect()
        };

        for callback in callbacks {
            callback(gesture);
        }

        // 受信側がいない場合の送信エラーは無視
        if let Some(sender) = self.channels.get(&gesture.gesture_type) {
            let _ = sender.send(gesture.clone());
        }
        let _ = self.all.send(gesture.clone());

        trace!("{} を配信しました: {}", gesture.gesture_type, gesture.source());
    }

    fn register(&self, filter: Option<GestureType>, callback: GestureCallback) -> ListenerId {
        let id = ListenerId::new();
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        listeners.push(RegisteredListener {
            id,
            filter,
            callback,
        });
        id
    }
}

impl std::fmt::Debug for GestureDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GestureDispatcher")
            .field("listeners", &self.listener_count())
            .field("all_receivers", &self.all.receiver_count())
            .finish()
    }
}
