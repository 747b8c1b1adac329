//! 各阶段的终态判定
//!
//! 推进离开某个阶段之前，批次内每个文档都要满足该阶段的判定条件（或超时）。

use std::fmt;
use std::sync::Arc;

use crate::models::{Document, PipelineStage};

/// 终态判定条件
#[derive(Clone)]
pub struct TerminalPredicate {
    name: &'static str,
    check: Arc<dyn Fn(&Document) -> bool + Send + Sync>,
}

impl TerminalPredicate {
    pub fn new(
        name: &'static str,
        check: impl Fn(&Document) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            check: Arc::new(check),
        }
    }

    /// 状态为 Completed 或 Error
    pub fn terminal_status() -> Self {
        Self::new("terminal-status", |doc| doc.status.is_terminal())
    }

    /// 状态为终态，或文档已进入指定阶段
    pub fn reached_stage(stage: PipelineStage) -> Self {
        Self::new("reached-stage", move |doc| {
            doc.status.is_terminal() || doc.stage >= stage.number()
        })
    }

    /// 离开 `stage` 时使用的判定条件
    pub fn for_stage(stage: PipelineStage) -> Self {
        match stage {
            PipelineStage::Review => Self::reached_stage(PipelineStage::Matching),
            _ => Self::terminal_status(),
        }
    }

    pub fn is_satisfied(&self, document: &Document) -> bool {
        (self.check)(document)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for TerminalPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminalPredicate")
            .field("name", &self.name)
            .finish()
    }
}
