use std::num::NonZeroUsize;
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::model::{UserId, UserStatus};
use super::{CACHE_DURATION, STATUS_CACHE_CAPACITY};

#[derive(Debug, Clone)]
struct CacheEntry {
    status: UserStatus,
    stored_at: Instant,
}

/// 进程内用户状态缓存
///
/// 过期只在读取时判断。过期条目不会被 `get` 返回，但会保留下来，
/// 供查询失败时通过 `get_any` 兜底。容量满时淘汰最久未访问的条目。
pub struct StatusCache {
    entries: Mutex<LruCache<UserId, CacheEntry>>,
    ttl: Duration,
}

impl StatusCache {
    pub fn new(capacity: usize) -> Self {
        Self::with_ttl(capacity, CACHE_DURATION)
    }

    pub fn with_ttl(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// 只返回未过期的条目
    pub fn get(&self, user_id: UserId, now: Instant) -> Option<UserStatus> {
        let mut entries = self.entries.lock();
        let entry = entries.get(&user_id)?;
        if now.saturating_duration_since(entry.stored_at) < self.ttl {
            Some(entry.status.clone())
        } else {
            None
        }
    }

    /// 返回任意已缓存的条目，不论是否过期
    pub fn get_any(&self, user_id: UserId) -> Option<UserStatus> {
        self.entries
            .lock()
            .get(&user_id)
            .map(|entry| entry.status.clone())
    }

    pub fn set(&self, user_id: UserId, status: UserStatus, now: Instant) {
        self.entries.lock().put(
            user_id,
            CacheEntry {
                status,
                stored_at: now,
            },
        );
    }

    /// 删除条目，返回被删除的状态
    pub fn remove(&self, user_id: UserId) -> Option<UserStatus> {
        self.entries.lock().pop(&user_id).map(|entry| entry.status)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for StatusCache {
    fn default() -> Self {
        Self::new(STATUS_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn status(user_id: UserId, is_online: bool) -> UserStatus {
        let now = Utc::now();
        UserStatus::new(user_id, is_online, now, now)
    }

    #[test]
    fn fresh_until_cache_duration_elapses() {
        let cache = StatusCache::default();
        let t = Instant::now();
        let value = status(7, true);
        cache.set(7, value.clone(), t);

        assert_eq!(cache.get(7, t), Some(value));
        assert!(cache.get(7, t + Duration::from_millis(59_999)).is_some());
        assert!(cache.get(7, t + Duration::from_millis(60_000)).is_none());
        assert!(cache.get(7, t + Duration::from_secs(3600)).is_none());
    }

    #[test]
    fn stale_entry_is_retained_for_fallback() {
        let cache = StatusCache::default();
        let t = Instant::now();
        let value = status(3, false);
        cache.set(3, value.clone(), t);

        assert!(cache.get(3, t + CACHE_DURATION).is_none());
        assert_eq!(cache.get_any(3), Some(value));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn set_overwrites_and_restamps() {
        let cache = StatusCache::default();
        let t = Instant::now();
        cache.set(1, status(1, false), t);

        let later = t + Duration::from_secs(90);
        let newer = status(1, true);
        cache.set(1, newer.clone(), later);

        assert_eq!(cache.get(1, later + Duration::from_secs(30)), Some(newer));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn remove_drops_entry_for_fallback_too() {
        let cache = StatusCache::default();
        let t = Instant::now();
        let value = status(5, true);
        cache.set(5, value.clone(), t);

        assert_eq!(cache.remove(5), Some(value));
        assert!(cache.get(5, t).is_none());
        assert!(cache.get_any(5).is_none());
        assert!(cache.remove(5).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn miss_for_unknown_user() {
        let cache = StatusCache::default();
        assert!(cache.is_empty());
        assert!(cache.get(99, Instant::now()).is_none());
        assert!(cache.get_any(99).is_none());
    }

    #[test]
    fn evicts_least_recently_used_at_capacity() {
        let cache = StatusCache::new(2);
        let t = Instant::now();
        cache.set(1, status(1, true), t);
        cache.set(2, status(2, true), t);
        // 访问 1，使 2 成为最久未使用
        assert!(cache.get(1, t).is_some());
        cache.set(3, status(3, true), t);

        assert_eq!(cache.len(), 2);
        assert!(cache.get_any(2).is_none());
        assert!(cache.get_any(1).is_some());
        assert!(cache.get_any(3).is_some());
    }

    #[test]
    fn zero_capacity_still_holds_one_entry() {
        let cache = StatusCache::new(0);
        let t = Instant::now();
        cache.set(1, status(1, true), t);
        assert!(cache.get(1, t).is_some());
    }
}
