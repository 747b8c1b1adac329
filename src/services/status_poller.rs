//! 状态查询服务 - 业务能力层
//!
//! 只负责"查一次状态"能力，不关心重试和流程

use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

use crate::clients::ExtractionService;
use crate::error::PollError;
use crate::models::{DocumentId, StatusRecord};

/// 单次查询的结果
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Completed 或 Error，无需再查
    Terminal(StatusRecord),
    /// 仍在处理，稍后再查
    Pending(StatusRecord),
}

impl PollOutcome {
    pub fn into_record(self) -> StatusRecord {
        match self {
            PollOutcome::Terminal(record) | PollOutcome::Pending(record) => record,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PollOutcome::Terminal(_))
    }
}

/// 状态查询服务
///
/// 职责：
/// - 每次调用只发一次查询
/// - 将远端响应归一化为 `StatusRecord`
/// - 不缓存、不重试（重试策略属于编排层）
#[derive(Clone)]
pub struct StatusPoller {
    service: Arc<dyn ExtractionService>,
}

impl StatusPoller {
    pub fn new(service: Arc<dyn ExtractionService>) -> Self {
        Self { service }
    }

    pub async fn poll(&self, id: &DocumentId) -> Result<PollOutcome, PollError> {
        let remote = self.service.fetch_status(id).await?;
        let record = StatusRecord::from_remote(id, remote, Utc::now())?;

        debug!(
            "[文档 {}] 状态: {} (阶段 {}, 进度 {}%)",
            id, record.status, record.stage, record.progress
        );

        if record.is_terminal() {
            Ok(PollOutcome::Terminal(record))
        } else {
            Ok(PollOutcome::Pending(record))
        }
    }
}
