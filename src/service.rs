// LumosGestures ジェスチャーサービス
// エンジンを tokio タスクとして動かし、接触イベントとタイマー発火を1か所で直列に処理する

use log::{info, warn};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::GestureConfig;
use crate::dispatch::{GestureDispatcher, ListenerId};
use crate::error::{GestureError, GestureResult};
use crate::gesture_recognizer::{ContactEvent, ContactId, GestureEngine, GestureEvent, GestureType};
use crate::timer::{TimerToken, TokioScheduler};

enum EngineCommand {
    Contact(ContactEvent),
    EndContact(ContactId),
    Reset,
    UpdateConfig(GestureConfig, oneshot::Sender<GestureResult<()>>),
    Shutdown,
}

/// ジェスチャーサービス
pub struct GestureService;

impl GestureService {
    /// エンジンを起動する。tokio ランタイムの中から呼ぶこと。
    pub fn spawn(config: GestureConfig) -> GestureResult<GestureServiceHandle> {
        let (scheduler, timer_rx) = TokioScheduler::new();
        let queue_capacity = config.command_queue_capacity;
        let engine = GestureEngine::new(config, scheduler)?;
        let dispatcher = engine.dispatcher().clone();

        let (commands, command_rx) = mpsc::channel(queue_capacity);
        let task = tokio::spawn(run_engine(engine, command_rx, timer_rx));

        Ok(GestureServiceHandle {
            commands,
            dispatcher,
            task: Some(task),
        })
    }
}

async fn run_engine(
    mut engine: GestureEngine<TokioScheduler>,
    mut commands: mpsc::Receiver<EngineCommand>,
    mut timers: mpsc::UnboundedReceiver<TimerToken>,
) {
    info!("ジェスチャーサービスを開始しました");

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(EngineCommand::Contact(event)) => {
                    engine.process_event(&event);
                }
                Some(EngineCommand::EndContact(contact)) => {
                    engine.end_contact(contact);
                }
                Some(EngineCommand::Reset) => engine.reset_all(),
                Some(EngineCommand::UpdateConfig(config, reply)) => {
                    let _ = reply.send(engine.update_config(config));
                }
                Some(EngineCommand::Shutdown) | None => break,
            },
            Some(token) = timers.recv() => {
                // キャンセル後に届いた通知は捨てる
                if engine.scheduler_mut().complete(&token) {
                    engine.fire_timer(&token);
                }
            }
        }
    }

    // 保留中の評価はすべて破棄 (ジェスチャーは発行しない)
    engine.reset_all();
    info!("ジェスチャーサービスを停止しました");
}

/// 起動中のジェスチャーサービスへのハンドル
///
/// イベントは送信順に処理される。ハンドルを破棄するとサービスも停止する。
pub struct GestureServiceHandle {
    commands: mpsc::Sender<EngineCommand>,
    dispatcher: GestureDispatcher,
    task: Option<JoinHandle<()>>,
}

impl GestureServiceHandle {
    /// 接触イベントを送る。キューが空くまで待つ。
    pub async fn send(&self, event: ContactEvent) -> GestureResult<()> {
        self.command(EngineCommand::Contact(event)).await
    }

    /// 接触イベントを待たずに送る
    pub fn try_send(&self, event: ContactEvent) -> GestureResult<()> {
        match self.commands.try_send(EngineCommand::Contact(event)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("入力キューが満杯のため {} のイベントを破棄しました", event.contact);
                Err(GestureError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(GestureError::EngineStopped),
        }
    }

    /// 接触ストリームを終了する
    pub async fn end_contact(&self, contact: ContactId) -> GestureResult<()> {
        self.command(EngineCommand::EndContact(contact)).await
    }

    /// 進行中のセッションと保留中のタップ候補をすべて破棄する
    pub async fn reset(&self) -> GestureResult<()> {
        self.command(EngineCommand::Reset).await
    }

    /// 設定を更新する。検証に失敗した場合は現在の設定のまま。
    pub async fn update_config(&self, config: GestureConfig) -> GestureResult<()> {
        let (reply, response) = oneshot::channel();
        self.command(EngineCommand::UpdateConfig(config, reply)).await?;
        response.await.map_err(|_| GestureError::EngineStopped)?
    }

    pub fn subscribe(&self, gesture_type: GestureType) -> broadcast::Receiver<GestureEvent> {
        self.dispatcher.subscribe(gesture_type)
    }

    pub fn subscribe_all(&self) -> broadcast::Receiver<GestureEvent> {
        self.dispatcher.subscribe_all()
    }

    pub fn add_listener<F>(&self, gesture_type: GestureType, callback: F) -> ListenerId
    where
        F: Fn(&GestureEvent) + Send + Sync + 'static,
    {
        self.dispatcher.add_listener(gesture_type, callback)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.dispatcher.remove_listener(id)
    }

    pub fn dispatcher(&self) -> &GestureDispatcher {
        &self.dispatcher
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().map_or(false, |task| !task.is_finished())
    }

    /// サービスを停止し、タスクの終了を待つ
    pub async fn shutdown(mut self) -> GestureResult<()> {
        let _ = self.commands.send(EngineCommand::Shutdown).await;
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("ジェスチャーサービスの終了待ちに失敗しました: {}", e);
            }
        }
        Ok(())
    }

    async fn command(&self, command: EngineCommand) -> GestureResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| GestureError::EngineStopped)
    }
}

impl std::fmt::Debug for GestureServiceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GestureServiceHandle")
            .field("running", &self.is_running())
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}
