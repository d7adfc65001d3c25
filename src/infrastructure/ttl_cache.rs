//! 显式注入的TTL缓存组件
//!
//! key → (value, 过期时间)，带invalidate/clear操作。
//! 只用于管理端余额列表这类只读路径，入账路径绝不经过缓存。

use std::{
    collections::HashMap,
    hash::Hash,
    time::{Duration, Instant},
};

use tokio::sync::RwLock;

pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: RwLock<HashMap<K, (V, Instant)>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// 命中且未过期才返回
    pub async fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => Some(value.clone()),
            _ => None,
        }
    }

    pub async fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.write().await;
        entries.insert(key, (value, Instant::now() + self.ttl));
        // 顺手清掉已过期的条目，避免只写不读导致增长
        let now = Instant::now();
        entries.retain(|_, (_, expires_at)| *expires_at > now);
    }

    pub async fn invalidate(&self, key: &K) {
        self.entries.write().await.remove(key);
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_insert_invalidate() {
        let cache: TtlCache<String, u64> = TtlCache::new(Duration::from_secs(60));
        assert_eq!(cache.get(&"a".to_string()).await, None);

        cache.insert("a".to_string(), 1).await;
        assert_eq!(cache.get(&"a".to_string()).await, Some(1));

        cache.invalidate(&"a".to_string()).await;
        assert_eq!(cache.get(&"a".to_string()).await, None);
    }

    #[tokio::test]
    async fn test_expiry() {
        let cache: TtlCache<&'static str, u64> = TtlCache::new(Duration::from_millis(10));
        cache.insert("k", 7).await;
        assert_eq!(cache.get(&"k").await, Some(7));
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert_eq!(cache.get(&"k").await, None);
    }

    #[tokio::test]
    async fn test_clear() {
        let cache: TtlCache<u32, u32> = TtlCache::new(Duration::from_secs(60));
        cache.insert(1, 1).await;
        cache.insert(2, 2).await;
        assert_eq!(cache.len().await, 2);
        cache.clear().await;
        assert!(cache.is_empty().await);
    }
}
