use serde::Serialize;
use std::fmt;

use super::{DocumentId, PipelineStage};

/// 文档进入异常桶的原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ExceptionKind {
    /// 在允许的轮询次数内未达到终态
    TimedOut,
    /// 远端报告错误，或文档已不存在
    Errored(String),
}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExceptionKind::TimedOut => write!(f, "轮询超时"),
            ExceptionKind::Errored(reason) => write!(f, "处理失败: {}", reason),
        }
    }
}

/// 异常桶中的一条记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExceptionEntry {
    pub id: DocumentId,
    /// 出现异常时正在离开的阶段
    pub stage: PipelineStage,
    pub kind: ExceptionKind,
}

impl ExceptionEntry {
    pub fn timed_out(id: DocumentId, stage: PipelineStage) -> Self {
        Self {
            id,
            stage,
            kind: ExceptionKind::TimedOut,
        }
    }

    pub fn errored(id: DocumentId, stage: PipelineStage, reason: impl Into<String>) -> Self {
        Self {
            id,
            stage,
            kind: ExceptionKind::Errored(reason.into()),
        }
    }

    pub fn is_timed_out(&self) -> bool {
        self.kind == ExceptionKind::TimedOut
    }
}
