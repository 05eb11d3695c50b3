//! # cliptrail：剪贴板历史服务核心库
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │              展示层（托盘 / 窗口，不在本库内）              │
//! │        HistoryListener ↑          ↓ 公开操作               │
//! └────────────────────────┼──────────┼──────────────────────┘
//!                          │          │
//! ┌────────────────────────┼──────────┼──────────────────────┐
//! │  clipboard ── ClipboardObserver（协调任务 + 轮询 + 监听）  │
//! │     │   ├─ backend   arboard 系统剪贴板                   │
//! │     │   ├─ listener  clipboard-master 变化事件            │
//! │     │   └─ dedup     文本/图片指纹、自身写入冷却           │
//! │     ↓                                                    │
//! │  hasher ─────── 文本 / 图片指纹 (xxh3)                     │
//! │     ↓                                                    │
//! │  history ────── HistoryStore（唯一所有者）+ history.json   │
//! │     ↓                                                    │
//! │  image_handler ─ 解码 · 缩略图 · screenshots/ 落盘与删除    │
//! │                                                          │
//! │  settings ───── SettingsProvider + settings.json         │
//! │  storage ────── 用户级目录布局                             │
//! │  error ──────── AppError                                 │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `AppError` |
//! | [`hasher`] | 去重用的内容指纹 |
//! | [`history`] | 有序历史集合、裁剪淘汰、带版本的快照持久化 |
//! | [`image_handler`] | 剪贴板像素校验、缩略图、截图文件的写入与删除 |
//! | [`clipboard`] | 剪贴板观察者、去重、生命周期、展示层通知 |
//! | [`settings`] | 设置读取（`maxHistoryItems` / `captureScreenshots`） |
//! | [`storage`] | 应用数据目录与原子写入 |

pub mod clipboard;
pub mod error;
pub mod hasher;
pub mod history;
pub mod image_handler;
pub mod settings;
pub mod storage;
