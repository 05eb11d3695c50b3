//! # 截图处理模块（image_handler）
//!
//! ## 设计思路
//!
//! 该模块将“剪贴板像素校验 → 解码 → 缩略图 → 落盘 / 删除”
//! 按职责拆分为多个子模块，避免单文件膨胀与耦合。
//!
//! - `source`：中间数据模型（`RawImage` / `StoredImage`）
//! - `pipeline`：解码、像素限制、缩略图缩放
//! - `artifacts`：截图目录、成对写入与尽力删除
//! - `config/error`：配置与错误
//!
//! ## 调用链
//!
//! ```text
//! clipboard（观察者读到图片）
//!    ↓
//! pipeline::decode_raw（校验 + RgbaImage）
//!    ↓
//! ImageArtifacts::store（原图 + 缩略图落盘）
//!    ↓
//! history::HistoryStore::add_image（只记录路径）
//! ```

mod artifacts;
mod config;
mod error;
mod pipeline;
mod source;

pub use artifacts::ImageArtifacts;
pub use config::{thumbnail_dimensions, ImageConfig};
pub use error::ImageError;
pub use pipeline::{decode_raw, make_thumbnail};
pub use source::{RawImage, StoredImage};
