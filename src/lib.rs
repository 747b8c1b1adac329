//! # Supply Chain Pipeline
//!
//! 驱动一批供应链单据（采购单、提单、收货单、发票等）依次通过远端抽取/匹配服务各处理阶段的编排器
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有唯一的共享可变状态，只暴露读写能力
//! - `DocumentRegistry` - 文档注册表，后观测者胜出
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个文档或只读汇总
//! - `StatusPoller` - 查一次状态的能力
//! - `MetricsAggregator` - 汇总指标、看板视图、异常提示
//! - `ExceptionWriter` - 写 exceptions.txt 能力
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个阶段"何时算收敛
//! - `PollCtx` - 上下文封装（batch_id + stage + round）
//! - `TerminalPredicate` - 各阶段的终态判定
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_poller` - 批次轮询协调器，按轮并发查询
//! - `orchestrator/stage_controller` - 阶段状态机
//! - `orchestrator/pipeline` - 对外命令入口
//! - `orchestrator/app` - 命令行应用
//!
//! 外部服务通过 `clients/` 中的 `UploadService` / `ExtractionService` 接入。
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::{ExtractionService, SupplyChainClient, UploadService};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::DocumentRegistry;
pub use models::{Document, DocumentId, DocumentStatus, PipelineStage};
pub use orchestrator::{App, BatchHandle, PipelineOrchestrator, StageController};
pub use services::{MetricsAggregator, MetricsSummary};
pub use workflow::{PollCtx, TerminalPredicate};
