//! 历史快照编解码子模块
//!
//! ## 职责
//! - 定义 `history.json` 的带版本格式
//! - 逐条容错解码（单条损坏只跳过该条）
//! - 按代数（generation）原子写入，旧快照永远不会覆盖新快照
//!
//! ## 格式
//!
//! ```json
//! {
//!   "version": 1,
//!   "entries": [
//!     { "kind": "text",  "id": "…", "createdAt": 1700000000000, "sequence": 3, "content": "hello" },
//!     { "kind": "image", "id": "…", "createdAt": 1700000000001, "sequence": 4,
//!       "thumbnailPath": "…_thumb.png", "fullImagePath": "….png" }
//!   ]
//! }
//! ```
//!
//! 图片条目只保存路径，不保存像素。

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use super::{EntryContent, EntryId, HistoryEntry};
use crate::error::AppError;
use crate::storage::write_atomically;

/// 当前写出的快照版本
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
enum HistoryRecord {
    #[serde(rename_all = "camelCase")]
    Text {
        id: EntryId,
        created_at: i64,
        sequence: u64,
        content: String,
    },
    #[serde(rename_all = "camelCase")]
    Image {
        id: EntryId,
        created_at: i64,
        sequence: u64,
        thumbnail_path: PathBuf,
        full_image_path: PathBuf,
    },
}

impl From<&HistoryEntry> for HistoryRecord {
    fn from(entry: &HistoryEntry) -> Self {
        match &entry.content {
            EntryContent::Text(content) => HistoryRecord::Text {
                id: entry.id,
                created_at: entry.created_at,
                sequence: entry.sequence,
                content: content.clone(),
            },
            EntryContent::Image {
                thumbnail_path,
                full_image_path,
            } => HistoryRecord::Image {
                id: entry.id,
                created_at: entry.created_at,
                sequence: entry.sequence,
                thumbnail_path: thumbnail_path.clone(),
                full_image_path: full_image_path.clone(),
            },
        }
    }
}

impl From<HistoryRecord> for HistoryEntry {
    fn from(record: HistoryRecord) -> Self {
        match record {
            HistoryRecord::Text {
                id,
                created_at,
                sequence,
                content,
            } => HistoryEntry {
                id,
                created_at,
                sequence,
                content: EntryContent::Text(content),
            },
            HistoryRecord::Image {
                id,
                created_at,
                sequence,
                thumbnail_path,
                full_image_path,
            } => HistoryEntry {
                id,
                created_at,
                sequence,
                content: EntryContent::Image {
                    thumbnail_path,
                    full_image_path,
                },
            },
        }
    }
}

#[derive(Serialize)]
struct SnapshotOut<'a> {
    version: u32,
    entries: &'a [HistoryRecord],
}

#[derive(Deserialize)]
struct SnapshotIn {
    #[serde(default)]
    version: Option<u32>,
    #[serde(default)]
    entries: Vec<serde_json::Value>,
}

/// 解码结果
#[derive(Debug, Default)]
pub struct DecodedSnapshot {
    pub version: u32,
    pub entries: Vec<HistoryEntry>,
    /// 因格式错误被跳过的记录数
    pub skipped: usize,
}

/// 序列化整份快照
pub(crate) fn encode_snapshot(entries: &[HistoryEntry]) -> Result<Vec<u8>, AppError> {
    let records: Vec<HistoryRecord> = entries.iter().map(HistoryRecord::from).collect();
    let out = SnapshotOut {
        version: SNAPSHOT_VERSION,
        entries: &records,
    };
    Ok(serde_json::to_vec_pretty(&out)?)
}

/// 容错解码：顶层结构损坏返回错误，单条记录损坏只跳过该条。
pub fn decode_snapshot(bytes: &[u8]) -> Result<DecodedSnapshot, AppError> {
    let raw: SnapshotIn = serde_json::from_slice(bytes)?;
    let version = raw.version.unwrap_or(SNAPSHOT_VERSION);
    if version > SNAPSHOT_VERSION {
        log::warn!(
            "历史快照版本 {} 高于当前支持的 {}，尝试兼容读取",
            version,
            SNAPSHOT_VERSION
        );
    }

    let mut decoded = DecodedSnapshot {
        version,
        ..DecodedSnapshot::default()
    };

    for (index, value) in raw.entries.into_iter().enumerate() {
        match serde_json::from_value::<HistoryRecord>(value) {
            Ok(HistoryRecord::Text { ref content, .. }) if content.trim().is_empty() => {
                log::warn!("跳过第 {} 条历史记录：文本为空", index);
                decoded.skipped += 1;
            }
            Ok(record) => decoded.entries.push(record.into()),
            Err(e) => {
                log::warn!("跳过第 {} 条损坏的历史记录: {}", index, e);
                decoded.skipped += 1;
            }
        }
    }

    Ok(decoded)
}

/// 快照写入器
///
/// 异步持久化与同步持久化共用同一个写入器；
/// 只有比已写入代数更新的快照才会落盘。
pub(crate) struct SnapshotWriter {
    path: PathBuf,
    last_generation: Mutex<u64>,
}

impl SnapshotWriter {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self {
            path,
            last_generation: Mutex::new(0),
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// 写入快照；若已有更新的代数落盘则跳过并返回 `Ok(false)`。
    pub(crate) fn write(&self, generation: u64, entries: &[HistoryEntry]) -> Result<bool, AppError> {
        let mut last = match self.last_generation.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("快照写入锁中毒，继续使用恢复数据");
                poisoned.into_inner()
            }
        };

        if generation <= *last {
            log::trace!("跳过过期快照：generation={} <= {}", generation, *last);
            return Ok(false);
        }

        let bytes = encode_snapshot(entries)?;
        write_atomically(&self.path, &bytes)
            .map_err(|e| AppError::Persistence(format!("写入历史快照失败: {}", e)))?;
        *last = generation;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(content: &str, created_at: i64, sequence: u64) -> HistoryEntry {
        HistoryEntry {
            id: EntryId::new(),
            created_at,
            sequence,
            content: EntryContent::Text(content.to_string()),
        }
    }

    #[test]
    fn encode_then_decode_preserves_entries() {
        let entries = vec![
            text("b", 2, 2),
            HistoryEntry {
                id: EntryId::new(),
                created_at: 1,
                sequence: 1,
                content: EntryContent::Image {
                    thumbnail_path: PathBuf::from("/s/1_thumb.png"),
                    full_image_path: PathBuf::from("/s/1.png"),
                },
            },
        ];

        let bytes = encode_snapshot(&entries).expect("encode");
        let decoded = decode_snapshot(&bytes).expect("decode");

        assert_eq!(decoded.version, SNAPSHOT_VERSION);
        assert_eq!(decoded.entries, entries);
        assert_eq!(decoded.skipped, 0);
    }

    #[test]
    fn encoded_records_carry_kind_and_paths_only() {
        let entries = vec![HistoryEntry {
            id: EntryId::new(),
            created_at: 5,
            sequence: 1,
            content: EntryContent::Image {
                thumbnail_path: PathBuf::from("t.png"),
                full_image_path: PathBuf::from("f.png"),
            },
        }];
        let value: serde_json::Value =
            serde_json::from_slice(&encode_snapshot(&entries).expect("encode")).expect("json");

        let record = &value["entries"][0];
        assert_eq!(record["kind"], "image");
        assert_eq!(record["thumbnailPath"], "t.png");
        assert_eq!(record["fullImagePath"], "f.png");
        assert!(record.get("content").is_none());
    }

    #[test]
    fn malformed_records_are_skipped_individually() {
        let good = text("ok", 1, 1);
        let json = format!(
            r#"{{"version":1,"entries":[
                {{"kind":"text","id":"{}","createdAt":1,"sequence":1,"content":"ok"}},
                {{"kind":"video","id":"{}","createdAt":2,"sequence":2}},
                {{"kind":"text","createdAt":3}},
                42,
                {{"kind":"text","id":"{}","createdAt":4,"sequence":4,"content":"   "}}
            ]}}"#,
            good.id,
            EntryId::new(),
            EntryId::new()
        );

        let decoded = decode_snapshot(json.as_bytes()).expect("decode");
        assert_eq!(decoded.entries.len(), 1);
        assert_eq!(decoded.entries[0].id, good.id);
        assert_eq!(decoded.skipped, 4);
    }

    #[test]
    fn unknown_fields_and_future_versions_are_tolerated() {
        let id = EntryId::new();
        let json = format!(
            r#"{{"version":9,"extra":true,"entries":[
                {{"kind":"text","id":"{}","createdAt":1,"sequence":1,"content":"x","pinned":true}}
            ]}}"#,
            id
        );
        let decoded = decode_snapshot(json.as_bytes()).expect("decode");
        assert_eq!(decoded.version, 9);
        assert_eq!(decoded.entries.len(), 1);
    }

    #[test]
    fn unreadable_top_level_is_an_error() {
        assert!(decode_snapshot(b"\x00garbage").is_err());
        assert!(decode_snapshot(b"[1,2,3]").is_err());
    }

    #[test]
    fn writer_never_replaces_newer_generation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = SnapshotWriter::new(dir.path().join("history.json"));

        assert!(writer.write(2, &[text("new", 2, 2)]).expect("write gen 2"));
        assert!(!writer.write(1, &[text("old", 1, 1)]).expect("write gen 1"));

        let decoded = decode_snapshot(&std::fs::read(writer.path()).expect("read")).expect("decode");
        assert_eq!(decoded.entries[0].text(), Some("new"));
    }
}
