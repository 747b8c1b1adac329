//! 轮询上下文
//!
//! 封装"我正在为哪个批次的哪个阶段做第几轮轮询"这一信息

use chrono::{DateTime, Utc};
use std::fmt::Display;

use crate::error::PollError;
use crate::models::{DocumentId, PipelineStage, StatusRecord};

/// 一次 drive 的上下文（仅用于日志）
#[derive(Debug, Clone)]
pub struct PollCtx {
    /// 批次编号
    pub batch_id: u64,

    /// 正在推进的阶段
    pub stage: PipelineStage,

    /// 当前轮次（从1开始）
    pub round: u32,
}

impl PollCtx {
    pub fn new(batch_id: u64, stage: PipelineStage) -> Self {
        Self {
            batch_id,
            stage,
            round: 0,
        }
    }

    pub fn next_round(&mut self) {
        self.round += 1;
    }
}

impl Display for PollCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[批次 #{} 阶段 {} 第 {} 轮]",
            self.batch_id,
            self.stage.number(),
            self.round
        )
    }
}

/// 单次轮询的结果（不持久化）
#[derive(Debug)]
pub struct PollAttempt {
    pub document_id: DocumentId,
    /// 该文档的第几次查询（从1开始）
    pub attempt_number: u32,
    pub observed_at: DateTime<Utc>,
    pub result: Result<StatusRecord, PollError>,
}
