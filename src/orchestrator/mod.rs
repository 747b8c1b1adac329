//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批次轮询和阶段调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `app` - 应用入口
//! - 管理应用生命周期（初始化、运行）
//! - 扫描输入目录并上传
//! - 逐阶段推进，写异常报告，输出全局统计
//!
//! ### `pipeline` - 流水线编排器
//! - 对外命令：上传、推进、回退、重试、取消、审批
//! - 每个批次一个注册表 + 一个阶段控制器
//!
//! ### `stage_controller` - 阶段控制器
//! - 阶段状态机（只允许前进一步）
//! - processed 标记、异常桶、忙碌标记
//!
//! ### `batch_poller` - 批次轮询协调器
//! - 按轮并发查询（JoinSet）
//! - 每个文档独立的尝试计数
//! - 可取消
//!
//! ## 层次关系
//!
//! ```text
//! app
//!     ↓
//! pipeline (处理多个批次)
//!     ↓
//! stage_controller (处理一个批次的阶段)
//!     ↓
//! batch_poller (处理一个阶段的一组文档)
//!     ↓
//! services (能力层：poll / metrics / exceptions)
//!     ↓
//! infrastructure (基础设施：DocumentRegistry)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：pipeline 管批次，stage_controller 管阶段，batch_poller 管轮询
//! 2. **状态隔离**：注册表是唯一的共享可变状态
//! 3. **向下依赖**：编排层 → workflow → services → infrastructure

pub mod app;
pub mod batch_poller;
pub mod pipeline;
pub mod stage_controller;

// 重新导出主要类型
pub use app::App;
pub use batch_poller::{BatchPollCoordinator, DriveOptions, DriveReport, DriveResult};
pub use pipeline::{BatchHandle, PipelineOrchestrator};
pub use stage_controller::{AdvanceReport, RetryReport, StageController};
