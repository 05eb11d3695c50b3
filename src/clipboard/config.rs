use std::time::Duration;

/// 观察者的固定调参
///
/// 生产环境使用 `Default`；测试可以缩短各个时间窗口。
#[derive(Debug, Clone)]
pub struct ObserverConfig {
    /// 定时轮询间隔
    pub poll_interval: Duration,
    /// 收到剪贴板变化后，等待来源程序写完再读取
    pub ownership_recovery_delay: Duration,
    /// 应用自身写入剪贴板后的忽略窗口
    pub self_copy_cooldown: Duration,
    /// 变化监听器创建失败或退出后的重试间隔
    pub setup_retry_delay: Duration,
    /// 相同图片指纹被视为重复的时间窗口
    pub image_dedup_window: Duration,
    /// 图片指纹表超过该大小时清理过期项
    pub image_hash_prune_threshold: usize,
    /// `shutdown` 等待后台任务的上限
    pub shutdown_timeout: Duration,
    /// 是否启动系统剪贴板变化监听（关闭后只依赖轮询）
    pub watch_clipboard_events: bool,
    /// 文本变化后是否重新写回剪贴板以取得所有权（图片从不写回）
    pub reclaim_text_ownership: bool,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            ownership_recovery_delay: Duration::from_millis(150),
            self_copy_cooldown: Duration::from_millis(600),
            setup_retry_delay: Duration::from_secs(2),
            image_dedup_window: Duration::from_millis(2000),
            image_hash_prune_threshold: 32,
            shutdown_timeout: Duration::from_secs(3),
            watch_clipboard_events: true,
            reclaim_text_ownership: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovery_delay_fits_inside_self_copy_cooldown() {
        // 自身写入触发的变化事件要在冷却期内被处理才能被忽略
        let config = ObserverConfig::default();
        assert!(config.ownership_recovery_delay < config.self_copy_cooldown);
        assert!(config.poll_interval > Duration::ZERO);
    }
}
