use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

use super::error::PresenceError;
use super::store::{Beacon, StatusStore};

/// 运行环境发出的生命周期信号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceSignal {
    /// 网络恢复
    NetworkAvailable,
    /// 网络断开
    NetworkUnavailable,
    /// 窗口重新回到前台
    VisibilityRegained,
    /// 进程即将退出
    Unload,
}

impl PresenceSignal {
    /// 信号对应上报的在线状态
    pub fn reported_status(self) -> bool {
        match self {
            PresenceSignal::NetworkAvailable | PresenceSignal::VisibilityRegained => true,
            PresenceSignal::NetworkUnavailable | PresenceSignal::Unload => false,
        }
    }
}

/// 本地在线状态，只在客户端内部使用
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceState {
    Online,
    Offline,
}

impl From<bool> for PresenceState {
    fn from(is_online: bool) -> Self {
        if is_online {
            PresenceState::Online
        } else {
            PresenceState::Offline
        }
    }
}

/// 生命周期信号总线
#[derive(Clone)]
pub struct SignalBus {
    tx: broadcast::Sender<PresenceSignal>,
}

impl SignalBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// 广播信号，返回收到信号的订阅者数量
    pub fn emit(&self, signal: PresenceSignal) -> usize {
        self.tx.send(signal).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PresenceSignal> {
        self.tx.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new(16)
    }
}

struct ReporterCore {
    store: Arc<dyn StatusStore>,
    beacon: Arc<dyn Beacon>,
    state: Mutex<PresenceState>,
}

impl ReporterCore {
    async fn report(&self, is_online: bool) {
        *self.state.lock() = PresenceState::from(is_online);
        self.write(is_online).await;
    }

    /// 更新本地状态后把写入交给独立任务，不等待结果
    fn spawn_report(self: &Arc<Self>, is_online: bool) {
        *self.state.lock() = PresenceState::from(is_online);
        let core = Arc::clone(self);
        tokio::spawn(async move { core.write(is_online).await });
    }

    async fn write(&self, is_online: bool) {
        match self.store.update_online_status(is_online).await {
            Ok(()) => tracing::debug!("Reported online status: {}", is_online),
            Err(PresenceError::Unauthenticated) => {
                tracing::debug!("Skipped online status report, no active session")
            }
            Err(e) => tracing::warn!("Failed to report online status {}: {}", is_online, e),
        }
    }

    fn send_unload(&self) {
        *self.state.lock() = PresenceState::Offline;
        self.beacon.send_online_status(false);
    }

    async fn handle_signal(&self, signal: PresenceSignal) {
        tracing::debug!("Presence signal: {:?}", signal);
        match signal {
            PresenceSignal::Unload => self.send_unload(),
            other => self.report(other.reported_status()).await,
        }
    }

    /// 监听任务使用：每次状态变化各自独立写入，监听循环从不等待存储
    fn dispatch_signal(self: &Arc<Self>, signal: PresenceSignal) {
        tracing::debug!("Presence signal: {:?}", signal);
        match signal {
            PresenceSignal::Unload => self.send_unload(),
            other => self.spawn_report(other.reported_status()),
        }
    }
}

struct Listener {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// 在线状态上报器
///
/// 第一次 `activate` 时上报一次在线，之后按生命周期信号上报状态变化。
/// `activate` 与 `deactivate` 成对注册、注销信号订阅。
pub struct PresenceReporter {
    core: Arc<ReporterCore>,
    bus: SignalBus,
    initialized: AtomicBool,
    listener: Mutex<Option<Listener>>,
}

impl PresenceReporter {
    pub fn new(store: Arc<dyn StatusStore>, beacon: Arc<dyn Beacon>, bus: SignalBus) -> Self {
        Self {
            core: Arc::new(ReporterCore {
                store,
                beacon,
                state: Mutex::new(PresenceState::Offline),
            }),
            bus,
            initialized: AtomicBool::new(false),
            listener: Mutex::new(None),
        }
    }

    /// 开始监听信号，必须在 tokio 运行时内调用
    pub fn activate(&self) {
        let mut listener = self.listener.lock();
        if listener.is_some() {
            return;
        }

        let report_initial = !self.initialized.swap(true, Ordering::SeqCst);
        let mut signals = self.bus.subscribe();
        let (shutdown, mut shutdown_rx) = oneshot::channel();
        let core = Arc::clone(&self.core);

        if report_initial {
            core.spawn_report(true);
        }

        let handle = tokio::spawn(async move {
            loop {
                let signal = tokio::select! {
                    _ = &mut shutdown_rx => break,
                    received = signals.recv() => received,
                };

                match signal {
                    Ok(signal) => core.dispatch_signal(signal),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Presence listener lagged, skipped {} signals", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            tracing::debug!("Presence listener stopped");
        });

        *listener = Some(Listener { shutdown, handle });
    }

    /// 注销信号订阅，正在执行的上报会继续完成
    pub fn deactivate(&self) {
        if let Some(listener) = self.listener.lock().take() {
            // 任务已结束时发送失败，无需处理
            let _ = listener.shutdown.send(());
            drop(listener.handle);
        }
    }

    pub fn is_active(&self) -> bool {
        self.listener
            .lock()
            .as_ref()
            .is_some_and(|listener| !listener.handle.is_finished())
    }

    pub fn state(&self) -> PresenceState {
        *self.core.state.lock()
    }

    /// 直接处理一个信号并等待写入完成，供自行分发信号的宿主使用
    pub async fn handle_signal(&self, signal: PresenceSignal) {
        self.core.handle_signal(signal).await;
    }

    /// 退出前的离线上报，立即返回
    pub fn on_unload(&self) {
        self.core.send_unload();
    }
}

impl Drop for PresenceReporter {
    fn drop(&mut self) {
        self.deactivate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::model::{ChatId, UserId, UserStatus};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct RecordingStore {
        writes: mpsc::UnboundedSender<bool>,
        fail: bool,
    }

    #[async_trait]
    impl StatusStore for RecordingStore {
        async fn update_online_status(&self, is_online: bool) -> Result<(), PresenceError> {
            let _ = self.writes.send(is_online);
            if self.fail {
                Err(PresenceError::Api {
                    code: 5000,
                    message: "boom".into(),
                })
            } else {
                Ok(())
            }
        }

        async fn get_user_status(&self, _: UserId) -> Result<Option<UserStatus>, PresenceError> {
            Ok(None)
        }

        async fn get_chat_users_status(
            &self,
            _: ChatId,
        ) -> Result<Vec<UserStatus>, PresenceError> {
            Ok(Vec::new())
        }
    }

    /// 上报永远不会完成的存储
    struct HangingStore;

    #[async_trait]
    impl StatusStore for HangingStore {
        async fn update_online_status(&self, _: bool) -> Result<(), PresenceError> {
            std::future::pending().await
        }

        async fn get_user_status(&self, _: UserId) -> Result<Option<UserStatus>, PresenceError> {
            std::future::pending().await
        }

        async fn get_chat_users_status(
            &self,
            _: ChatId,
        ) -> Result<Vec<UserStatus>, PresenceError> {
            std::future::pending().await
        }
    }

    #[derive(Default)]
    struct RecordingBeacon {
        sent: Mutex<Vec<bool>>,
    }

    impl Beacon for RecordingBeacon {
        fn send_online_status(&self, is_online: bool) {
            self.sent.lock().push(is_online);
        }
    }

    type Harness = (
        PresenceReporter,
        mpsc::UnboundedReceiver<bool>,
        Arc<RecordingBeacon>,
        SignalBus,
    );

    fn reporter(fail: bool) -> Harness {
        let (tx, rx) = mpsc::unbounded_channel();
        let beacon = Arc::new(RecordingBeacon::default());
        let bus = SignalBus::default();
        let reporter = PresenceReporter::new(
            Arc::new(RecordingStore { writes: tx, fail }),
            beacon.clone(),
            bus.clone(),
        );
        (reporter, rx, beacon, bus)
    }

    async fn settle() {
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn repeated_activation_reports_online_once() {
        let (reporter, mut writes, _, bus) = reporter(false);

        for _ in 0..5 {
            reporter.activate();
        }
        settle().await;

        assert_eq!(writes.recv().await, Some(true));
        assert!(writes.try_recv().is_err());
        assert_eq!(bus.listener_count(), 1);
        assert_eq!(reporter.state(), PresenceState::Online);
    }

    #[tokio::test]
    async fn reactivation_does_not_repeat_initial_report() {
        let (reporter, mut writes, _, bus) = reporter(false);

        reporter.activate();
        assert_eq!(writes.recv().await, Some(true));

        reporter.deactivate();
        reporter.activate();
        settle().await;

        assert!(writes.try_recv().is_err());
        assert_eq!(bus.listener_count(), 1);
    }

    #[tokio::test]
    async fn network_unavailable_writes_offline_once() {
        let (reporter, mut writes, _, bus) = reporter(false);
        reporter.activate();
        assert_eq!(writes.recv().await, Some(true));

        // 其他订阅者同样能收到信号，但不会触发额外写入
        let _other = bus.subscribe();
        assert_eq!(bus.emit(PresenceSignal::NetworkUnavailable), 2);

        assert_eq!(writes.recv().await, Some(false));
        settle().await;
        assert!(writes.try_recv().is_err());
        assert_eq!(reporter.state(), PresenceState::Offline);
    }

    #[tokio::test]
    async fn signals_map_to_status_writes_in_order() {
        let (reporter, mut writes, _, bus) = reporter(false);
        reporter.activate();
        assert_eq!(writes.recv().await, Some(true));

        bus.emit(PresenceSignal::NetworkUnavailable);
        bus.emit(PresenceSignal::NetworkAvailable);
        bus.emit(PresenceSignal::VisibilityRegained);

        assert_eq!(writes.recv().await, Some(false));
        assert_eq!(writes.recv().await, Some(true));
        assert_eq!(writes.recv().await, Some(true));
    }

    #[tokio::test]
    async fn unload_goes_through_beacon() {
        let (reporter, mut writes, beacon, bus) = reporter(false);
        reporter.activate();
        assert_eq!(writes.recv().await, Some(true));

        bus.emit(PresenceSignal::Unload);
        settle().await;

        assert_eq!(*beacon.sent.lock(), vec![false]);
        assert!(writes.try_recv().is_err());
        assert_eq!(reporter.state(), PresenceState::Offline);
    }

    #[tokio::test]
    async fn unload_returns_without_waiting_for_store() {
        let beacon = Arc::new(RecordingBeacon::default());
        let reporter =
            PresenceReporter::new(Arc::new(HangingStore), beacon.clone(), SignalBus::default());

        tokio::time::timeout(
            Duration::from_secs(1),
            reporter.handle_signal(PresenceSignal::Unload),
        )
        .await
        .expect("unload must not block");

        reporter.on_unload();
        assert_eq!(*beacon.sent.lock(), vec![false, false]);
    }

    #[tokio::test]
    async fn unload_signal_is_not_held_up_by_pending_write() {
        let beacon = Arc::new(RecordingBeacon::default());
        let bus = SignalBus::default();
        let reporter = PresenceReporter::new(Arc::new(HangingStore), beacon.clone(), bus.clone());

        // 首次在线上报永远不会返回
        reporter.activate();
        settle().await;

        assert_eq!(bus.emit(PresenceSignal::Unload), 1);
        settle().await;

        assert_eq!(*beacon.sent.lock(), vec![false]);
        assert_eq!(reporter.state(), PresenceState::Offline);
        assert!(reporter.is_active());
    }

    /// 第一次写入挂起，之后的写入正常记录
    struct StallFirstStore {
        calls: std::sync::atomic::AtomicUsize,
        writes: mpsc::UnboundedSender<bool>,
    }

    #[async_trait]
    impl StatusStore for StallFirstStore {
        async fn update_online_status(&self, is_online: bool) -> Result<(), PresenceError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                std::future::pending::<()>().await;
            }
            let _ = self.writes.send(is_online);
            Ok(())
        }

        async fn get_user_status(&self, _: UserId) -> Result<Option<UserStatus>, PresenceError> {
            Ok(None)
        }

        async fn get_chat_users_status(
            &self,
            _: ChatId,
        ) -> Result<Vec<UserStatus>, PresenceError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn each_transition_writes_independently() {
        let (tx, mut writes) = mpsc::unbounded_channel();
        let bus = SignalBus::default();
        let reporter = PresenceReporter::new(
            Arc::new(StallFirstStore {
                calls: Default::default(),
                writes: tx,
            }),
            Arc::new(RecordingBeacon::default()),
            bus.clone(),
        );

        reporter.activate();
        settle().await;

        bus.emit(PresenceSignal::NetworkUnavailable);
        bus.emit(PresenceSignal::NetworkAvailable);

        let received = tokio::time::timeout(Duration::from_secs(1), async {
            (writes.recv().await, writes.recv().await)
        })
        .await
        .expect("later writes must not wait for the stalled one");
        assert_eq!(received, (Some(false), Some(true)));
        assert_eq!(reporter.state(), PresenceState::Online);
    }

    #[tokio::test]
    async fn failed_write_is_absorbed() {
        let (reporter, mut writes, _, bus) = reporter(true);
        reporter.activate();
        assert_eq!(writes.recv().await, Some(true));

        bus.emit(PresenceSignal::NetworkAvailable);
        assert_eq!(writes.recv().await, Some(true));
        settle().await;

        // 失败不重试，监听继续工作
        assert!(writes.try_recv().is_err());
        assert!(reporter.is_active());
    }

    #[tokio::test]
    async fn deactivate_releases_subscription() {
        let (reporter, mut writes, _, bus) = reporter(false);
        reporter.activate();
        assert_eq!(writes.recv().await, Some(true));
        assert_eq!(bus.listener_count(), 1);

        reporter.deactivate();
        settle().await;

        assert_eq!(bus.listener_count(), 0);
        assert!(!reporter.is_active());
        assert_eq!(bus.emit(PresenceSignal::NetworkUnavailable), 0);
        settle().await;
        assert!(writes.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropping_reporter_releases_subscription() {
        let (reporter, mut writes, _, bus) = reporter(false);
        reporter.activate();
        assert_eq!(writes.recv().await, Some(true));

        drop(reporter);
        settle().await;

        assert_eq!(bus.listener_count(), 0);
    }
}
