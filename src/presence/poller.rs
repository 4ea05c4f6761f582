use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};

use super::cache::StatusCache;
use super::error::PresenceError;
use super::model::{ChatId, UserId, UserStatus};
use super::store::StatusStore;
use super::{CHAT_POLL_INTERVAL, USER_POLL_INTERVAL};

/// 防重入标记，离开作用域时自动释放
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct PollTask {
    shutdown: oneshot::Sender<()>,
}

/// 轮询器的公共状态：当前值、防重入标记与定时任务
struct PollState<T> {
    current: watch::Sender<T>,
    in_flight: AtomicBool,
    torn_down: AtomicBool,
    task: Mutex<Option<PollTask>>,
}

impl<T: Clone + Send + Sync + 'static> PollState<T> {
    fn new(initial: T) -> Self {
        let (current, _) = watch::channel(initial);
        Self {
            current,
            in_flight: AtomicBool::new(false),
            torn_down: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    fn current(&self) -> T {
        self.current.borrow().clone()
    }

    /// 已停用时丢弃结果，返回当前值
    fn publish(&self, value: T) -> T {
        if self.torn_down.load(Ordering::Acquire) {
            return self.current();
        }
        self.current.send_replace(value.clone());
        value
    }

    fn start<I, F, Fut>(&self, inner: Weak<I>, period: Duration, mut tick: F)
    where
        I: Send + Sync + 'static,
        F: FnMut(Arc<I>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }
        self.torn_down.store(false, Ordering::Release);

        let (shutdown, mut shutdown_rx) = oneshot::channel();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = interval.tick() => {}
                }

                // 刷新过程中不响应关闭，进行中的请求不会被取消
                let Some(strong) = inner.upgrade() else { break };
                tick(strong).await;
            }
        });

        *task = Some(PollTask { shutdown });
    }

    fn stop(&self) {
        self.torn_down.store(true, Ordering::Release);
        if let Some(task) = self.task.lock().take() {
            let _ = task.shutdown.send(());
        }
    }

    fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.shutdown.is_closed())
    }
}

impl<T> Drop for PollState<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            let _ = task.shutdown.send(());
        }
    }
}

fn log_fetch_failure(target: &str, error: &PresenceError) {
    if error.is_unauthenticated() {
        tracing::debug!("Skipped status fetch for {}, no active session", target);
    } else {
        tracing::warn!("Failed to fetch status for {}: {}", target, error);
    }
}

struct UserPollerInner {
    user_id: UserId,
    store: Arc<dyn StatusStore>,
    cache: Arc<StatusCache>,
    period: Duration,
    state: PollState<Option<UserStatus>>,
}

/// 单个用户的状态轮询器
///
/// 优先使用缓存中的新鲜数据；同一实例同时只会有一个请求在进行。
#[derive(Clone)]
pub struct UserStatusPoller {
    inner: Arc<UserPollerInner>,
}

impl UserStatusPoller {
    pub fn new(user_id: UserId, store: Arc<dyn StatusStore>, cache: Arc<StatusCache>) -> Self {
        Self::with_interval(user_id, store, cache, USER_POLL_INTERVAL)
    }

    pub fn with_interval(
        user_id: UserId,
        store: Arc<dyn StatusStore>,
        cache: Arc<StatusCache>,
        period: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(UserPollerInner {
                user_id,
                store,
                cache,
                period,
                state: PollState::new(None),
            }),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.inner.user_id
    }

    pub fn current(&self) -> Option<UserStatus> {
        self.inner.state.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<UserStatus>> {
        self.inner.state.current.subscribe()
    }

    /// 刷新用户状态，返回刷新后的当前值
    ///
    /// `force` 跳过缓存检查，但仍受防重入限制。
    pub async fn refresh(&self, force: bool) -> Option<UserStatus> {
        let inner = &self.inner;
        let user_id = inner.user_id;

        if !force {
            if let Some(cached) = inner.cache.get(user_id, Instant::now()) {
                return inner.state.publish(Some(cached.refreshed(Utc::now())));
            }
        }

        let Some(_guard) = InFlightGuard::acquire(&inner.state.in_flight) else {
            tracing::trace!("Status refresh for user {} already in flight", user_id);
            return inner.state.current();
        };

        match inner.store.get_user_status(user_id).await {
            Ok(Some(status)) => {
                inner.cache.set(user_id, status.clone(), Instant::now());
                inner.state.publish(Some(status))
            }
            Ok(None) => {
                // 用户已不存在，共享缓存里的旧状态不能再作为兜底
                inner.cache.remove(user_id);
                inner.state.publish(None)
            }
            Err(e) => {
                log_fetch_failure(&format!("user {}", user_id), &e);
                match inner.cache.get_any(user_id) {
                    Some(cached) => inner.state.publish(Some(cached.refreshed(Utc::now()))),
                    None => inner.state.current(),
                }
            }
        }
    }

    /// 立即刷新一次，之后按周期刷新
    pub fn activate(&self) {
        self.inner.state.start(
            Arc::downgrade(&self.inner),
            self.inner.period,
            |inner| async move {
                UserStatusPoller { inner }.refresh(false).await;
            },
        );
    }

    /// 停止定时刷新，进行中的请求完成后结果会被丢弃
    pub fn deactivate(&self) {
        self.inner.state.stop();
    }

    pub fn is_active(&self) -> bool {
        self.inner.state.is_running()
    }
}

struct ChatPollerInner {
    chat_id: ChatId,
    store: Arc<dyn StatusStore>,
    period: Duration,
    state: PollState<Option<Vec<UserStatus>>>,
}

/// 聊天室成员状态轮询器
///
/// 每次都从存储读取完整的成员状态，不使用状态缓存。
#[derive(Clone)]
pub struct ChatStatusPoller {
    inner: Arc<ChatPollerInner>,
}

impl ChatStatusPoller {
    pub fn new(chat_id: ChatId, store: Arc<dyn StatusStore>) -> Self {
        Self::with_interval(chat_id, store, CHAT_POLL_INTERVAL)
    }

    pub fn with_interval(chat_id: ChatId, store: Arc<dyn StatusStore>, period: Duration) -> Self {
        Self {
            inner: Arc::new(ChatPollerInner {
                chat_id,
                store,
                period,
                state: PollState::new(None),
            }),
        }
    }

    pub fn chat_id(&self) -> ChatId {
        self.inner.chat_id
    }

    pub fn current(&self) -> Option<Vec<UserStatus>> {
        self.inner.state.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Vec<UserStatus>>> {
        self.inner.state.current.subscribe()
    }

    pub async fn refresh(&self) -> Option<Vec<UserStatus>> {
        let inner = &self.inner;

        let Some(_guard) = InFlightGuard::acquire(&inner.state.in_flight) else {
            tracing::trace!("Status refresh for chat {} already in flight", inner.chat_id);
            return inner.state.current();
        };

        match inner.store.get_chat_users_status(inner.chat_id).await {
            Ok(members) => inner.state.publish(Some(members)),
            Err(e) => {
                log_fetch_failure(&format!("chat {}", inner.chat_id), &e);
                inner.state.current()
            }
        }
    }

    pub fn activate(&self) {
        self.inner.state.start(
            Arc::downgrade(&self.inner),
            self.inner.period,
            |inner| async move {
                ChatStatusPoller { inner }.refresh().await;
            },
        );
    }

    pub fn deactivate(&self) {
        self.inner.state.stop();
    }

    pub fn is_active(&self) -> bool {
        self.inner.state.is_running()
    }
}
