//! 去重状态
//!
//! 三份互相独立的小状态，各自一把锁，都不与历史集合的锁嵌套：
//! - `RecentImageHashes`：图片指纹 → 过期时刻
//! - `LastText`：最近一次处理的文本指纹
//! - `SelfCopyCooldown`：应用自身写入剪贴板后的忽略截止时刻

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::hasher::Fingerprint;

fn lock_or_recover<'a, T>(mutex: &'a Mutex<T>, name: &str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("{}锁中毒，继续使用恢复数据", name);
            poisoned.into_inner()
        }
    }
}

/// 近期图片指纹
///
/// 只在时间窗口内去重：窗口外再次出现的相同图片会被当作新条目。
/// 窗口内的重复出现会顺延过期时刻，所以一直停留在剪贴板上的图片不会在窗口到期后被再次捕获。
pub(crate) struct RecentImageHashes {
    window: Duration,
    prune_threshold: usize,
    expiries: Mutex<HashMap<Fingerprint, Instant>>,
}

impl RecentImageHashes {
    pub(crate) fn new(window: Duration, prune_threshold: usize) -> Self {
        Self {
            window,
            prune_threshold,
            expiries: Mutex::new(HashMap::new()),
        }
    }

    /// 记录一次出现；返回 `true` 表示这是新图片。
    pub(crate) fn observe(&self, fingerprint: Fingerprint, now: Instant) -> bool {
        let mut expiries = lock_or_recover(&self.expiries, "图片指纹表");

        if expiries.len() > self.prune_threshold {
            let before = expiries.len();
            expiries.retain(|_, expires_at| *expires_at > now);
            log::trace!("清理过期图片指纹 {} 个", before - expiries.len());
        }

        let expires_at = now + self.window;
        match expiries.get_mut(&fingerprint) {
            Some(existing) if *existing > now => {
                *existing = expires_at;
                false
            }
            _ => {
                expiries.insert(fingerprint, expires_at);
                true
            }
        }
    }

    /// 撤销一次记录。落盘失败时调用，让下一次检查重新尝试同一张图片。
    pub(crate) fn forget(&self, fingerprint: Fingerprint) {
        lock_or_recover(&self.expiries, "图片指纹表").remove(&fingerprint);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        lock_or_recover(&self.expiries, "图片指纹表").len()
    }
}

/// 最近一次处理的文本指纹（紧邻重复抑制）
#[derive(Default)]
pub(crate) struct LastText {
    fingerprint: Mutex<Option<Fingerprint>>,
}

impl LastText {
    /// 与上一次不同时替换并返回 `true`。
    pub(crate) fn replace_if_changed(&self, fingerprint: Fingerprint) -> bool {
        let mut last = lock_or_recover(&self.fingerprint, "文本指纹");
        if *last == Some(fingerprint) {
            return false;
        }
        *last = Some(fingerprint);
        true
    }

    pub(crate) fn set(&self, fingerprint: Fingerprint) {
        *lock_or_recover(&self.fingerprint, "文本指纹") = Some(fingerprint);
    }
}

/// 自身写入冷却期
///
/// 只是一个建议性的信号：与外部复制在同一瞬间发生的竞争不做保证。
#[derive(Default)]
pub(crate) struct SelfCopyCooldown {
    deadline: Mutex<Option<Instant>>,
}

impl SelfCopyCooldown {
    pub(crate) fn arm(&self, duration: Duration) {
        *lock_or_recover(&self.deadline, "自身写入冷却") = Some(Instant::now() + duration);
    }

    pub(crate) fn is_active(&self) -> bool {
        self.is_active_at(Instant::now())
    }

    fn is_active_at(&self, now: Instant) -> bool {
        let mut deadline = lock_or_recover(&self.deadline, "自身写入冷却");
        match *deadline {
            Some(until) if until > now => true,
            Some(_) => {
                *deadline = None;
                false
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(2000);

    #[test]
    fn repeat_inside_window_is_duplicate() {
        let hashes = RecentImageHashes::new(WINDOW, 32);
        let t0 = Instant::now();
        assert!(hashes.observe(Fingerprint(1), t0));
        assert!(!hashes.observe(Fingerprint(1), t0 + Duration::from_millis(500)));
        assert!(hashes.observe(Fingerprint(2), t0 + Duration::from_millis(500)));
    }

    #[test]
    fn repeat_after_window_is_new() {
        let hashes = RecentImageHashes::new(WINDOW, 32);
        let t0 = Instant::now();
        assert!(hashes.observe(Fingerprint(1), t0));
        assert!(hashes.observe(Fingerprint(1), t0 + WINDOW + Duration::from_millis(1)));
    }

    #[test]
    fn continuous_sightings_keep_extending_the_window() {
        let hashes = RecentImageHashes::new(WINDOW, 32);
        let t0 = Instant::now();
        assert!(hashes.observe(Fingerprint(7), t0));
        for step in 1..10u64 {
            let at = t0 + Duration::from_millis(1500 * step);
            assert!(!hashes.observe(Fingerprint(7), at), "step {}", step);
        }
    }

    #[test]
    fn forgotten_fingerprint_is_new_again() {
        let hashes = RecentImageHashes::new(WINDOW, 32);
        let t0 = Instant::now();
        assert!(hashes.observe(Fingerprint(3), t0));
        hashes.forget(Fingerprint(3));
        assert!(hashes.observe(Fingerprint(3), t0 + Duration::from_millis(10)));
        assert!(!hashes.observe(Fingerprint(3), t0 + Duration::from_millis(20)));
    }

    #[test]
    fn expired_entries_are_pruned_past_threshold() {
        let hashes = RecentImageHashes::new(WINDOW, 4);
        let t0 = Instant::now();
        for i in 0..6 {
            hashes.observe(Fingerprint(i), t0);
        }
        assert_eq!(hashes.len(), 6);

        hashes.observe(Fingerprint(100), t0 + WINDOW * 2);
        assert_eq!(hashes.len(), 1);
    }

    #[test]
    fn last_text_suppresses_immediate_repeat_only() {
        let last = LastText::default();
        assert!(last.replace_if_changed(Fingerprint(1)));
        assert!(!last.replace_if_changed(Fingerprint(1)));
        assert!(last.replace_if_changed(Fingerprint(2)));
        assert!(last.replace_if_changed(Fingerprint(1)));

        last.set(Fingerprint(9));
        assert!(!last.replace_if_changed(Fingerprint(9)));
    }

    #[test]
    fn cooldown_expires() {
        let cooldown = SelfCopyCooldown::default();
        assert!(!cooldown.is_active());

        cooldown.arm(Duration::from_millis(600));
        assert!(cooldown.is_active());
        assert!(!cooldown.is_active_at(Instant::now() + Duration::from_secs(1)));
    }
}
