//! 历史集合子模块
//!
//! ## 职责
//! - 持有唯一的内存历史集合，所有读写都在同一把互斥锁内完成
//! - 插入时文本按内容去重、新条目放在头部、超出上限从尾部淘汰
//! - 淘汰/删除图片条目时删除对应的原图与缩略图
//!
//! ## 锁与 I/O
//! - 持锁期间只做内存操作，并复制出一份快照
//! - 释放锁之后再把快照与待删文件交给后台磁盘线程
//! - `clear` 与 `apply_new_max` 按约定在调用线程上同步落盘

use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;

use super::disk_worker::{self, DiskJob, DiskWorker};
use super::snapshot::{decode_snapshot, DecodedSnapshot, SnapshotWriter};
use super::{EntryContent, EntryId, HistoryEntry, ImageEntry};
use crate::error::AppError;
use crate::image_handler::ImageArtifacts;

type ImagePair = (PathBuf, PathBuf);

struct HistoryState {
    /// 新的在前
    entries: Vec<HistoryEntry>,
    next_sequence: u64,
    generation: u64,
    max_items: usize,
}

impl HistoryState {
    /// 分配创建时间与序号；创建时间不早于当前头部，保证新条目总在最前。
    fn next_stamp(&mut self) -> (i64, u64) {
        let now = Utc::now().timestamp_millis();
        let created_at = self
            .entries
            .first()
            .map(|head| head.created_at.max(now))
            .unwrap_or(now);
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        (created_at, sequence)
    }

    /// 裁剪到上限，返回被淘汰图片条目的文件路径。
    fn trim(&mut self) -> Vec<ImagePair> {
        if self.entries.len() <= self.max_items {
            return Vec::new();
        }
        let evicted: Vec<HistoryEntry> = self.entries.drain(self.max_items..).collect();
        log::debug!("✂️ 历史超出上限 {}，淘汰 {} 条", self.max_items, evicted.len());
        evicted.iter().filter_map(image_paths).collect()
    }

    /// 生成新的快照代数与副本
    fn commit(&mut self) -> (u64, Vec<HistoryEntry>) {
        self.generation += 1;
        (self.generation, self.entries.clone())
    }
}

fn image_paths(entry: &HistoryEntry) -> Option<ImagePair> {
    match &entry.content {
        EntryContent::Image {
            thumbnail_path,
            full_image_path,
        } => Some((thumbnail_path.clone(), full_image_path.clone())),
        EntryContent::Text(_) => None,
    }
}

fn is_readable_file(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

fn sort_newest_first(entries: &mut [HistoryEntry]) {
    entries.sort_by_key(|entry| std::cmp::Reverse(entry.order_key()));
}

/// 剪贴板历史存储
pub struct HistoryStore {
    state: Mutex<HistoryState>,
    writer: Arc<SnapshotWriter>,
    artifacts: ImageArtifacts,
    worker: DiskWorker,
}

impl HistoryStore {
    /// 创建空存储并启动后台磁盘线程；不读取磁盘。
    pub fn open(
        history_file: impl Into<PathBuf>,
        artifacts: ImageArtifacts,
        max_items: usize,
    ) -> Result<Self, AppError> {
        let writer = Arc::new(SnapshotWriter::new(history_file.into()));
        let worker = DiskWorker::spawn(Arc::clone(&writer), artifacts.clone())?;
        Ok(Self {
            state: Mutex::new(HistoryState {
                entries: Vec::new(),
                next_sequence: 1,
                generation: 0,
                max_items: max_items.max(1),
            }),
            writer,
            artifacts,
            worker,
        })
    }

    pub fn history_file(&self) -> &Path {
        self.writer.path()
    }

    pub fn artifacts(&self) -> &ImageArtifacts {
        &self.artifacts
    }

    fn lock_state(&self) -> MutexGuard<'_, HistoryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("历史集合锁中毒，继续使用恢复数据");
                poisoned.into_inner()
            }
        }
    }

    /// 把快照与待删文件交给后台线程；线程已关闭时就地执行。
    fn dispatch(&self, evicted: Vec<ImagePair>, generation: u64, entries: Vec<HistoryEntry>) {
        if !evicted.is_empty() {
            self.submit(DiskJob::DeleteImages(evicted));
        }
        self.submit(DiskJob::Persist {
            generation,
            entries,
        });
    }

    fn submit(&self, job: DiskJob) {
        if let Err(job) = self.worker.submit(job) {
            log::debug!("磁盘线程已关闭，在当前线程执行任务");
            disk_worker::execute(job, &self.writer, &self.artifacts);
        }
    }

    fn persist_now(&self, evicted: &[ImagePair], generation: u64, entries: &[HistoryEntry]) {
        for (thumbnail_path, full_image_path) in evicted {
            self.artifacts.delete(thumbnail_path, full_image_path);
        }
        if let Err(e) = self.writer.write(generation, entries) {
            log::warn!("历史快照同步写入失败: {}", e);
        }
    }

    // ========================================================================
    // 加载
    // ========================================================================

    /// 读取磁盘快照替换内存集合，返回加载的条目数。
    ///
    /// 文件缺失或整体损坏时以空历史启动；单条损坏或图片文件缺失的条目被丢弃。
    pub fn load_from_disk(&self) -> usize {
        let path = self.writer.path().to_path_buf();
        let decoded = match fs::read(&path) {
            Ok(bytes) => match decode_snapshot(&bytes) {
                Ok(decoded) => decoded,
                Err(e) => {
                    log::warn!("历史快照无法解析，以空历史启动: {}", e);
                    DecodedSnapshot::default()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::info!("未找到历史快照，以空历史启动");
                DecodedSnapshot::default()
            }
            Err(e) => {
                log::warn!("读取历史快照失败，以空历史启动: {}", e);
                DecodedSnapshot::default()
            }
        };

        let read_count = decoded.entries.len();
        let mut entries: Vec<HistoryEntry> = decoded
            .entries
            .into_iter()
            .filter(|entry| match &entry.content {
                EntryContent::Image {
                    thumbnail_path,
                    full_image_path,
                } => {
                    let valid = is_readable_file(thumbnail_path) && is_readable_file(full_image_path);
                    if !valid {
                        log::info!("丢弃图片文件缺失的条目 {}", entry.id);
                    }
                    valid
                }
                EntryContent::Text(_) => true,
            })
            .collect();

        sort_newest_first(&mut entries);

        let mut seen_ids = HashSet::new();
        let mut seen_texts = HashSet::new();
        entries.retain(|entry| {
            if !seen_ids.insert(entry.id) {
                return false;
            }
            match entry.text() {
                Some(text) => seen_texts.insert(text.to_string()),
                None => true,
            }
        });

        let mut state = self.lock_state();
        state.entries = entries;
        state.next_sequence = state
            .entries
            .iter()
            .map(|entry| entry.sequence)
            .max()
            .unwrap_or(0)
            + 1;
        let evicted = state.trim();
        let loaded = state.entries.len();
        let changed = decoded.skipped > 0 || loaded != read_count;
        let snapshot = changed.then(|| state.commit());
        drop(state);

        if let Some((generation, snapshot)) = snapshot {
            self.dispatch(evicted, generation, snapshot);
        }

        log::info!(
            "📚 历史已加载: {} 条（跳过 {} 条损坏记录）",
            loaded,
            decoded.skipped
        );
        loaded
    }

    /// 删除截图目录中未被任何条目引用的文件。
    ///
    /// 必须在观察者开始捕获之前调用，否则可能删掉刚写出、尚未入库的截图。
    pub fn sweep_orphan_images(&self) -> usize {
        let referenced: HashSet<PathBuf> = self
            .lock_state()
            .entries
            .iter()
            .filter_map(image_paths)
            .flat_map(|(thumbnail_path, full_image_path)| [thumbnail_path, full_image_path])
            .collect();
        self.artifacts.remove_orphans(&referenced)
    }

    // ========================================================================
    // 写操作
    // ========================================================================

    /// 插入文本；去除首尾空白后为空时不做任何事。
    ///
    /// 已存在相同内容的文本条目会被移除，新条目放在头部。
    pub fn add_text(&self, content: &str) -> Option<EntryId> {
        if content.trim().is_empty() {
            return None;
        }

        let mut state = self.lock_state();
        state.entries.retain(|entry| entry.text() != Some(content));
        let (created_at, sequence) = state.next_stamp();
        let id = EntryId::new();
        state.entries.insert(
            0,
            HistoryEntry {
                id,
                created_at,
                sequence,
                content: EntryContent::Text(content.to_string()),
            },
        );
        let evicted = state.trim();
        let (generation, snapshot) = state.commit();
        drop(state);

        self.dispatch(evicted, generation, snapshot);
        Some(id)
    }

    /// 插入图片条目；去重由上游的图片指纹负责，这里总是插入。
    pub fn add_image(&self, thumbnail_path: PathBuf, full_image_path: PathBuf) -> EntryId {
        let mut state = self.lock_state();
        let (created_at, sequence) = state.next_stamp();
        let id = EntryId::new();
        state.entries.insert(
            0,
            HistoryEntry {
                id,
                created_at,
                sequence,
                content: EntryContent::Image {
                    thumbnail_path,
                    full_image_path,
                },
            },
        );
        let evicted = state.trim();
        let (generation, snapshot) = state.commit();
        drop(state);

        self.dispatch(evicted, generation, snapshot);
        id
    }

    /// 按 id 删除；id 不存在时返回 `false`。
    pub fn remove_by_id(&self, id: EntryId) -> bool {
        let mut state = self.lock_state();
        let Some(index) = state.entries.iter().position(|entry| entry.id == id) else {
            return false;
        };
        let removed = state.entries.remove(index);
        let (generation, snapshot) = state.commit();
        drop(state);

        log::debug!("🗑️ 已删除{}条目 {}", removed.kind(), id);

        self.dispatch(image_paths(&removed).into_iter().collect(), generation, snapshot);
        true
    }

    /// 删除所有内容完全相同的文本条目，返回删除数量。
    pub fn remove_all_text_equal_to(&self, content: &str) -> usize {
        let mut state = self.lock_state();
        let before = state.entries.len();
        state.entries.retain(|entry| entry.text() != Some(content));
        let removed = before - state.entries.len();
        if removed == 0 {
            return 0;
        }
        let (generation, snapshot) = state.commit();
        drop(state);

        self.dispatch(Vec::new(), generation, snapshot);
        removed
    }

    /// 清空历史并删除全部截图文件；在调用线程上同步落盘。
    pub fn clear(&self) {
        let mut state = self.lock_state();
        let removed: Vec<HistoryEntry> = std::mem::take(&mut state.entries);
        let (generation, snapshot) = state.commit();
        drop(state);

        let images: Vec<ImagePair> = removed.iter().filter_map(image_paths).collect();
        self.persist_now(&images, generation, &snapshot);
        log::info!("🗑️ 历史已清空（{} 条，其中截图 {} 张）", removed.len(), images.len());
    }

    /// 应用新的上限：立即裁剪，删除被淘汰的截图，同步落盘。
    pub fn apply_new_max(&self, new_max: usize) {
        let new_max = new_max.max(1);
        let mut state = self.lock_state();
        state.max_items = new_max;
        let evicted = state.trim();
        let (generation, snapshot) = state.commit();
        drop(state);

        self.persist_now(&evicted, generation, &snapshot);
        log::info!("⚙️ 历史上限已更新为 {}", new_max);
    }

    // ========================================================================
    // 读操作（均返回副本）
    // ========================================================================

    pub fn snapshot_entries(&self) -> Vec<HistoryEntry> {
        self.lock_state().entries.clone()
    }

    pub fn snapshot_text_entries(&self) -> Vec<String> {
        self.lock_state()
            .entries
            .iter()
            .filter_map(|entry| entry.text().map(str::to_string))
            .collect()
    }

    pub fn snapshot_image_entries(&self) -> Vec<ImageEntry> {
        self.lock_state()
            .entries
            .iter()
            .filter_map(HistoryEntry::image_entry)
            .collect()
    }

    pub fn get(&self, id: EntryId) -> Option<HistoryEntry> {
        self.lock_state()
            .entries
            .iter()
            .find(|entry| entry.id == id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.lock_state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_items(&self) -> usize {
        self.lock_state().max_items
    }

    // ========================================================================
    // 生命周期
    // ========================================================================

    /// 等待已投递的后台 I/O 完成，超时返回 `false`。
    pub fn flush(&self, timeout: Duration) -> bool {
        self.worker.flush(timeout)
    }

    /// 刷新并停止后台磁盘线程；之后的写操作在调用线程上执行。
    pub fn shutdown(&self, timeout: Duration) -> bool {
        self.worker.shutdown(timeout)
    }
}

impl Drop for HistoryStore {
    fn drop(&mut self) {
        self.worker.shutdown(Duration::from_secs(2));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_handler::ImageConfig;
    use image::RgbaImage;

    const WAIT: Duration = Duration::from_secs(5);

    fn open_store(dir: &Path, max_items: usize) -> HistoryStore {
        let artifacts = ImageArtifacts::new(dir.join("screenshots"), ImageConfig::default());
        HistoryStore::open(dir.join("history.json"), artifacts, max_items).expect("open store")
    }

    fn store_image(store: &HistoryStore) -> (EntryId, PathBuf, PathBuf) {
        let stored = store
            .artifacts()
            .store(&RgbaImage::new(16, 16))
            .expect("store image files");
        let id = store.add_image(stored.thumbnail_path.clone(), stored.full_image_path.clone());
        (id, stored.thumbnail_path, stored.full_image_path)
    }

    #[test]
    fn add_text_ignores_blank_input() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(dir.path(), 10);
        assert!(store.add_text("").is_none());
        assert!(store.add_text("  \n\t").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn duplicate_text_moves_to_head() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(dir.path(), 10);
        store.add_text("x");
        store.add_text("y");
        store.add_text("x");
        assert_eq!(store.snapshot_text_entries(), vec!["x", "y"]);
    }

    #[test]
    fn eviction_removes_oldest_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(dir.path(), 2);
        store.add_text("a");
        store.add_text("b");
        store.add_text("c");
        assert_eq!(store.snapshot_text_entries(), vec!["c", "b"]);
    }

    #[test]
    fn evicted_image_files_are_deleted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(dir.path(), 1);
        let (_, thumb, full) = store_image(&store);
        store.add_text("newer");
        assert!(store.flush(WAIT));
        assert!(!thumb.exists());
        assert!(!full.exists());
        assert!(store.snapshot_image_entries().is_empty());
    }

    #[test]
    fn remove_by_id_deletes_files_and_is_noop_when_absent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(dir.path(), 10);
        let (id, thumb, full) = store_image(&store);

        assert!(store.remove_by_id(id));
        assert!(!store.remove_by_id(id));
        assert!(store.flush(WAIT));
        assert!(!thumb.exists());
        assert!(!full.exists());
    }

    #[test]
    fn remove_all_text_equal_to_only_matches_exactly() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(dir.path(), 10);
        store.add_text("keep");
        store.add_text("drop");
        assert_eq!(store.remove_all_text_equal_to("drop "), 0);
        assert_eq!(store.remove_all_text_equal_to("drop"), 1);
        assert_eq!(store.snapshot_text_entries(), vec!["keep"]);
    }

    #[test]
    fn clear_is_synchronous_and_wins_over_queued_persists() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(dir.path(), 10);
        let (_, thumb, full) = store_image(&store);
        store.add_text("a");
        store.clear();

        assert!(!thumb.exists());
        assert!(!full.exists());
        assert!(store.flush(WAIT));

        let bytes = fs::read(store.history_file()).expect("read snapshot");
        assert!(decode_snapshot(&bytes).expect("decode").entries.is_empty());
    }

    #[test]
    fn apply_new_max_trims_immediately() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(dir.path(), 50);
        let (_, thumb, full) = store_image(&store);
        store.add_text("b");
        store.add_text("c");

        store.apply_new_max(1);

        assert_eq!(store.len(), 1);
        assert_eq!(store.snapshot_text_entries(), vec!["c"]);
        assert!(!thumb.exists());
        assert!(!full.exists());

        store.apply_new_max(0);
        assert_eq!(store.max_items(), 1);
    }

    #[test]
    fn load_drops_images_with_missing_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let store = open_store(dir.path(), 10);
            let (_, thumb, _) = store_image(&store);
            store.add_text("t");
            assert!(store.flush(WAIT));
            fs::remove_file(thumb).expect("remove thumb");
        }

        let reopened = open_store(dir.path(), 10);
        assert_eq!(reopened.load_from_disk(), 1);
        assert_eq!(reopened.snapshot_text_entries(), vec!["t"]);
        assert!(reopened.snapshot_image_entries().is_empty());
    }

    #[test]
    fn load_of_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("history.json"), "{{{{ not json").expect("write junk");

        let store = open_store(dir.path(), 10);
        assert_eq!(store.load_from_disk(), 0);
        assert!(store.add_text("fresh").is_some());
    }

    #[test]
    fn load_trims_to_current_max_and_continues_sequence() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let store = open_store(dir.path(), 10);
            for text in ["1", "2", "3", "4"] {
                store.add_text(text);
            }
            assert!(store.flush(WAIT));
        }

        let reopened = open_store(dir.path(), 2);
        assert_eq!(reopened.load_from_disk(), 2);
        assert_eq!(reopened.snapshot_text_entries(), vec!["4", "3"]);

        reopened.add_text("5");
        assert_eq!(reopened.snapshot_text_entries(), vec!["5", "4"]);
        let entries = reopened.snapshot_entries();
        assert!(entries[0].sequence > entries[1].sequence);
    }

    #[test]
    fn sweep_removes_unreferenced_screenshots() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(dir.path(), 10);
        let (_, thumb, full) = store_image(&store);
        let orphan = store
            .artifacts()
            .store(&RgbaImage::new(4, 4))
            .expect("store orphan");

        assert_eq!(store.sweep_orphan_images(), 2);
        assert!(thumb.exists() && full.exists());
        assert!(!orphan.full_image_path.exists());
    }

    #[test]
    fn writes_after_shutdown_run_inline() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(dir.path(), 10);
        assert!(store.shutdown(WAIT));

        store.add_text("late");
        let bytes = fs::read(store.history_file()).expect("read snapshot");
        let decoded = decode_snapshot(&bytes).expect("decode");
        assert_eq!(decoded.entries[0].text(), Some("late"));
    }
}
