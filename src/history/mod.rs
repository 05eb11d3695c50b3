//! 历史记录模块
//!
//! # 设计思路
//!
//! 历史集合只有一个所有者：`HistoryStore`。其他组件通过 `Arc<HistoryStore>`
//! 共享访问，拿到的永远是快照副本，而不是集合内部的引用。
//!
//! # 模块划分
//!
//! - `store`：内存集合、互斥锁、插入/删除/裁剪
//! - `snapshot`：`history.json` 的带版本编解码与原子写入
//! - `disk_worker`：后台磁盘线程（快照持久化、截图文件删除）

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

mod disk_worker;
mod snapshot;
mod store;

pub use snapshot::{DecodedSnapshot, SNAPSHOT_VERSION, decode_snapshot};
pub use store::HistoryStore;

// ============================================================================
// 数据模型
// ============================================================================

/// 条目唯一标识，创建后不可变、不复用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(Uuid);

impl EntryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for EntryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// 条目类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Text,
    Image,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Text => f.write_str("文本"),
            EntryKind::Image => f.write_str("截图"),
        }
    }
}

/// 条目内容，与类型一一对应
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryContent {
    Text(String),
    Image {
        thumbnail_path: PathBuf,
        full_image_path: PathBuf,
    },
}

/// 剪贴板历史条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: EntryId,
    /// 创建时间（Unix 毫秒）
    pub created_at: i64,
    /// 插入序号，仅用于同一毫秒内的排序
    pub sequence: u64,
    pub content: EntryContent,
}

impl HistoryEntry {
    pub fn kind(&self) -> EntryKind {
        match self.content {
            EntryContent::Text(_) => EntryKind::Text,
            EntryContent::Image { .. } => EntryKind::Image,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.content {
            EntryContent::Text(text) => Some(text),
            EntryContent::Image { .. } => None,
        }
    }

    /// 图片条目的快照视图
    pub fn image_entry(&self) -> Option<ImageEntry> {
        match &self.content {
            EntryContent::Image {
                thumbnail_path,
                full_image_path,
            } => Some(ImageEntry {
                id: self.id,
                created_at: self.created_at,
                thumbnail_path: thumbnail_path.clone(),
                full_image_path: full_image_path.clone(),
            }),
            EntryContent::Text(_) => None,
        }
    }

    /// 排序键，越大越新
    pub(crate) fn order_key(&self) -> (i64, u64) {
        (self.created_at, self.sequence)
    }
}

/// 展示层使用的截图条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageEntry {
    pub id: EntryId,
    pub created_at: i64,
    pub thumbnail_path: PathBuf,
    pub full_image_path: PathBuf,
}
