//! 无界面的在线状态客户端
//!
//! 启动时上报在线，并把进程信号转换为生命周期信号：
//! `SIGUSR1` 网络断开，`SIGUSR2` 网络恢复，`SIGHUP` 回到前台，Ctrl-C 退出。

use std::sync::Arc;
use std::time::Duration;

use chat_presence::{
    config::AgentConfig,
    presence::{
        ChatStatusPoller, HttpStatusStore, PresenceReporter, PresenceSignal, SignalBus,
        StatusCache, UserStatusPoller,
    },
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// 退出前留给 beacon 请求的时间，不等待其结果
const BEACON_GRACE: Duration = Duration::from_millis(300);

#[cfg(unix)]
fn forward_os_signals(bus: SignalBus) {
    use tokio::signal::unix::{SignalKind, signal};

    let mapping = [
        (SignalKind::user_defined1(), PresenceSignal::NetworkUnavailable),
        (SignalKind::user_defined2(), PresenceSignal::NetworkAvailable),
        (SignalKind::hangup(), PresenceSignal::VisibilityRegained),
    ];

    for (kind, presence_signal) in mapping {
        let mut stream = match signal(kind) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!("Cannot listen for {:?}: {}", presence_signal, e);
                continue;
            }
        };
        let bus = bus.clone();
        tokio::spawn(async move {
            while stream.recv().await.is_some() {
                bus.emit(presence_signal);
            }
        });
    }
}

#[cfg(not(unix))]
fn forward_os_signals(_bus: SignalBus) {
    tracing::info!("Lifecycle signals other than Ctrl-C are not supported on this platform");
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AgentConfig::from_env().expect("Failed to load agent configuration");
    let store = Arc::new(HttpStatusStore::new(&config.api_url, &config.token));
    let cache = Arc::new(StatusCache::default());
    let bus = SignalBus::default();

    let reporter = PresenceReporter::new(store.clone(), store.clone(), bus.clone());
    reporter.activate();
    forward_os_signals(bus.clone());

    let user_poller = config.watch_user.map(|user_id| {
        let poller = UserStatusPoller::new(user_id, store.clone(), cache.clone());
        let mut updates = poller.subscribe();
        tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                match updates.borrow_and_update().clone() {
                    Some(status) => tracing::info!(
                        "User {}: online={} recently_online={} last_seen={}",
                        status.user_id,
                        status.is_online,
                        status.is_recently_online,
                        status.last_seen
                    ),
                    None => tracing::info!("User {}: status unknown", user_id),
                }
            }
        });
        poller.activate();
        poller
    });

    let chat_poller = config.watch_chat.map(|chat_id| {
        let poller = ChatStatusPoller::new(chat_id, store.clone());
        let mut updates = poller.subscribe();
        tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                let online = updates
                    .borrow_and_update()
                    .as_ref()
                    .map(|members| members.iter().filter(|m| m.is_online).count());
                if let Some(online) = online {
                    tracing::info!("Chat {}: {} members online", chat_id, online);
                }
            }
        });
        poller.activate();
        poller
    });

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }

    tracing::info!("Shutting down presence agent");
    reporter.on_unload();
    reporter.deactivate();
    if let Some(poller) = user_poller {
        poller.deactivate();
    }
    if let Some(poller) = chat_poller {
        poller.deactivate();
    }

    tokio::time::sleep(BEACON_GRACE).await;
}
