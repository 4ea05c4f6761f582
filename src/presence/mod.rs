// 在线状态模块
// 客户端侧的状态缓存、上报与轮询逻辑

use std::time::Duration;

pub mod cache;
pub mod error;
pub mod http_store;
pub mod model;
pub mod poller;
pub mod reporter;
pub mod store;

/// 缓存有效期
pub const CACHE_DURATION: Duration = Duration::from_millis(60_000);
/// 单个用户状态的轮询周期
pub const USER_POLL_INTERVAL: Duration = Duration::from_millis(120_000);
/// 聊天室成员状态的轮询周期
pub const CHAT_POLL_INTERVAL: Duration = Duration::from_millis(180_000);
/// 最后在线时间距今小于该值时视为"最近在线"
pub const RECENTLY_ONLINE_THRESHOLD: Duration = Duration::from_secs(5 * 60);
/// 每个进程内状态缓存的最大条目数
pub const STATUS_CACHE_CAPACITY: usize = 512;

// 重新导出常用类型
pub use cache::StatusCache;
pub use error::PresenceError;
pub use http_store::HttpStatusStore;
pub use model::{ChatId, UserId, UserStatus};
pub use poller::{ChatStatusPoller, UserStatusPoller};
pub use reporter::{PresenceReporter, PresenceSignal, PresenceState, SignalBus};
pub use store::{Beacon, StatusStore};
