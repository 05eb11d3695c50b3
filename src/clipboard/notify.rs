//! 展示层通知
//!
//! 同一时刻最多一个监听者。注册时先在槽位锁内回放全部历史，
//! 之后的实时事件在锁外调用，监听者可以在回调里安全地再次调用观察者。
//!
//! 实时事件携带条目序号。入库早于回放快照、通知晚于注册的条目已经在回放中出现过，
//! 按回放时记下的最大序号丢弃，监听者不会收到同一条目两次。

use std::sync::{Arc, Mutex, MutexGuard};

use crate::history::{EntryContent, HistoryEntry, ImageEntry};

/// 展示层实现的推送接口，三个方法都必须实现。
pub trait HistoryListener: Send + Sync {
    /// 新文本进入历史。`should_notify_scroll` 为 `false` 表示这是注册时的回放。
    fn on_text_changed(&self, text: &str, should_notify_scroll: bool);

    fn on_image_added(&self, entry: &ImageEntry);

    fn on_history_cleared(&self);
}

#[derive(Default)]
struct SlotState {
    listener: Option<Arc<dyn HistoryListener>>,
    /// 回放快照中最大的条目序号
    replayed_through: u64,
}

#[derive(Default)]
pub(crate) struct ListenerSlot {
    current: Mutex<SlotState>,
}

impl ListenerSlot {
    fn lock(&self) -> MutexGuard<'_, SlotState> {
        match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("监听者槽位锁中毒，继续使用恢复数据");
                poisoned.into_inner()
            }
        }
    }

    fn current(&self) -> Option<Arc<dyn HistoryListener>> {
        self.lock().listener.clone()
    }

    /// 序号为 `sequence` 的条目尚未回放过时返回当前监听者。
    fn live_listener(&self, sequence: u64) -> Option<Arc<dyn HistoryListener>> {
        let slot = self.lock();
        if sequence <= slot.replayed_through {
            log::trace!("条目 {} 已在回放中送达，跳过实时通知", sequence);
            return None;
        }
        slot.listener.clone()
    }

    /// 替换监听者，并按从旧到新的顺序回放历史。
    ///
    /// `history` 在槽位锁内取快照（新的在前），回放完成前不会有实时事件送达。
    pub(crate) fn install(
        &self,
        listener: Arc<dyn HistoryListener>,
        history: impl FnOnce() -> Vec<HistoryEntry>,
    ) {
        let mut slot = self.lock();
        let history = history();
        for entry in history.iter().rev() {
            match &entry.content {
                EntryContent::Text(text) => listener.on_text_changed(text, false),
                EntryContent::Image { .. } => {
                    if let Some(image) = entry.image_entry() {
                        listener.on_image_added(&image);
                    }
                }
            }
        }
        let newest = history.iter().map(|entry| entry.sequence).max().unwrap_or(0);
        slot.replayed_through = slot.replayed_through.max(newest);
        slot.listener = Some(listener);
        log::debug!("👂 已注册监听者，回放 {} 条历史", history.len());
    }

    pub(crate) fn remove(&self) {
        self.lock().listener.take();
    }

    pub(crate) fn text_changed(&self, text: &str, sequence: u64) {
        if let Some(listener) = self.live_listener(sequence) {
            listener.on_text_changed(text, true);
        }
    }

    pub(crate) fn image_added(&self, entry: &ImageEntry, sequence: u64) {
        if let Some(listener) = self.live_listener(sequence) {
            listener.on_image_added(entry);
        }
    }

    pub(crate) fn history_cleared(&self) {
        if let Some(listener) = self.current() {
            listener.on_history_cleared();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::EntryId;
    use std::path::PathBuf;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl HistoryListener for Recorder {
        fn on_text_changed(&self, text: &str, should_notify_scroll: bool) {
            self.events
                .lock()
                .unwrap()
                .push(format!("text:{}:{}", text, should_notify_scroll));
        }

        fn on_image_added(&self, entry: &ImageEntry) {
            self.events
                .lock()
                .unwrap()
                .push(format!("image:{}", entry.full_image_path.display()));
        }

        fn on_history_cleared(&self) {
            self.events.lock().unwrap().push("cleared".to_string());
        }
    }

    fn entry(created_at: i64, content: EntryContent) -> HistoryEntry {
        HistoryEntry {
            id: EntryId::new(),
            created_at,
            sequence: created_at as u64,
            content,
        }
    }

    #[test]
    fn replay_runs_oldest_first_without_scroll() {
        let slot = ListenerSlot::default();
        let recorder = Arc::new(Recorder::default());
        let history = vec![
            entry(3, EntryContent::Text("newest".into())),
            entry(
                2,
                EntryContent::Image {
                    thumbnail_path: PathBuf::from("t.png"),
                    full_image_path: PathBuf::from("f.png"),
                },
            ),
            entry(1, EntryContent::Text("oldest".into())),
        ];

        slot.install(recorder.clone(), || history);
        slot.text_changed("live", 4);

        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                "text:oldest:false",
                "image:f.png",
                "text:newest:false",
                "text:live:true",
            ]
        );
    }

    #[test]
    fn entry_already_replayed_is_not_delivered_again() {
        let slot = ListenerSlot::default();
        let recorder = Arc::new(Recorder::default());
        let history = vec![
            entry(2, EntryContent::Text("raced".into())),
            entry(1, EntryContent::Text("old".into())),
        ];

        slot.install(recorder.clone(), || history);
        slot.text_changed("raced", 2);
        slot.text_changed("fresh", 3);

        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec!["text:old:false", "text:raced:false", "text:fresh:true"]
        );
    }

    #[test]
    fn removed_listener_receives_nothing() {
        let slot = ListenerSlot::default();
        let recorder = Arc::new(Recorder::default());
        slot.install(recorder.clone(), Vec::new);
        slot.remove();
        slot.history_cleared();
        assert!(recorder.events.lock().unwrap().is_empty());
    }
}
