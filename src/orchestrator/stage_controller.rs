//! 阶段控制器 - 编排层
//!
//! 每个批次一个控制器，持有该批次的阶段状态机：
//!
//! - `advance(target)` 只允许前进到下一阶段；离开当前阶段前先轮询到全批收敛
//! - 每个阶段只轮询一次（`processed` 标记），回退后再前进不会重复轮询
//! - 超时或出错的文档进入异常桶，之后的阶段不再轮询它们
//! - 同一时刻只允许一个推进/重试操作

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::batch_poller::{BatchPollCoordinator, DriveOptions, DriveReport, DriveResult};
use crate::error::PipelineError;
use crate::infrastructure::DocumentRegistry;
use crate::models::{DocumentId, ExceptionEntry, PipelineStage};
use crate::workflow::{PollCtx, TerminalPredicate};

/// 一次推进的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvanceReport {
    pub from: PipelineStage,
    pub to: PipelineStage,
    /// 本次是否实际轮询（阶段已处理过则为 None）
    pub drive: Option<DriveReport>,
    /// 本次新进入异常桶的文档
    pub partial_failures: Vec<ExceptionEntry>,
}

impl AdvanceReport {
    fn without_drive(from: PipelineStage, to: PipelineStage) -> Self {
        Self {
            from,
            to,
            drive: None,
            partial_failures: Vec::new(),
        }
    }

    pub fn polled(&self) -> bool {
        self.drive.is_some()
    }

    pub fn is_clean(&self) -> bool {
        self.partial_failures.is_empty()
    }
}

/// 重试异常桶的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryReport {
    /// 参与重试的文档数
    pub retried: usize,
    /// 已恢复并移出异常桶
    pub recovered: Vec<DocumentId>,
    /// 仍在异常桶中
    pub still_failing: Vec<ExceptionEntry>,
}

struct ControllerState {
    current: PipelineStage,
    reached: PipelineStage,
    processed: HashSet<PipelineStage>,
    exceptions: Vec<ExceptionEntry>,
}

impl ControllerState {
    fn exception_ids(&self) -> HashSet<DocumentId> {
        self.exceptions.iter().map(|e| e.id.clone()).collect()
    }

    fn record_exception(&mut self, entry: ExceptionEntry) {
        match self.exceptions.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => *existing = entry,
            None => self.exceptions.push(entry),
        }
    }
}

/// 推进期间置位，释放时自动复位
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// 阶段控制器
pub struct StageController {
    batch_id: u64,
    documents: Vec<DocumentId>,
    coordinator: BatchPollCoordinator,
    options: DriveOptions,
    state: Mutex<ControllerState>,
    busy: AtomicBool,
}

impl StageController {
    /// 为刚上传完成的批次创建控制器，初始位于第一阶段
    pub fn new(
        batch_id: u64,
        documents: Vec<DocumentId>,
        coordinator: BatchPollCoordinator,
        options: DriveOptions,
    ) -> Self {
        let controller = Self {
            batch_id,
            documents,
            coordinator,
            options,
            state: Mutex::new(ControllerState {
                current: PipelineStage::FIRST,
                reached: PipelineStage::FIRST,
                processed: HashSet::new(),
                exceptions: Vec::new(),
            }),
            busy: AtomicBool::new(false),
        };
        controller.update_ceiling(PipelineStage::FIRST);
        controller
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn registry(&self) -> &Arc<DocumentRegistry> {
        self.coordinator.registry()
    }

    /// 文档阶段最多比已到达的最高阶段多一
    fn update_ceiling(&self, reached: PipelineStage) {
        let ceiling = reached.next().unwrap_or(PipelineStage::LAST);
        self.registry().set_stage_ceiling(ceiling.number());
    }

    pub fn batch_id(&self) -> u64 {
        self.batch_id
    }

    pub fn documents(&self) -> &[DocumentId] {
        &self.documents
    }

    pub fn current_stage(&self) -> PipelineStage {
        self.lock().current
    }

    /// 曾经到达过的最高阶段
    pub fn reached_stage(&self) -> PipelineStage {
        self.lock().reached
    }

    pub fn is_processed(&self, stage: PipelineStage) -> bool {
        self.lock().processed.contains(&stage)
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// 批次是否已到达终态阶段
    pub fn is_complete(&self) -> bool {
        self.current_stage().is_terminal()
    }

    pub fn exceptions(&self) -> Vec<ExceptionEntry> {
        self.lock().exceptions.clone()
    }

    /// 人工处理后移出异常桶
    pub fn clear_exception(&self, id: &DocumentId) -> bool {
        let mut state = self.lock();
        let before = state.exceptions.len();
        state.exceptions.retain(|e| &e.id != id);
        state.exceptions.len() != before
    }

    /// 推进到 `target`（必须是当前阶段的下一阶段）
    ///
    /// # 参数
    /// - `target`: 目标阶段；等于当前阶段且上一阶段已处理时视为重复推进
    /// - `cancel`: 取消信号，取消后阶段保持不变
    ///
    /// # 返回
    /// 返回本次推进的报告，其中 `partial_failures` 为新增的异常文档
    pub async fn advance(
        &self,
        target: PipelineStage,
        cancel: &CancellationToken,
    ) -> Result<AdvanceReport, PipelineError> {
        let _guard = BusyGuard::acquire(&self.busy).ok_or_else(|| {
            PipelineError::AdvanceInProgress {
                stage: self.current_stage(),
            }
        })?;

        let (current, already_processed, excluded) = {
            let state = self.lock();
            let current = state.current;

            if target == current
                && current
                    .previous()
                    .is_some_and(|prev| state.processed.contains(&prev))
            {
                info!("[批次 #{}] 已位于阶段 {}，无需重复推进", self.batch_id, current);
                return Ok(AdvanceReport::without_drive(current, current));
            }

            if current.next() != Some(target) {
                return Err(PipelineError::InvalidTransition {
                    from: current.number(),
                    to: target.number(),
                });
            }

            (
                current,
                state.processed.contains(&current),
                state.exception_ids(),
            )
        };

        if already_processed {
            info!(
                "[批次 #{}] 阶段 {} 已处理过，直接进入 {}",
                self.batch_id, current, target
            );
            self.transition(target);
            return Ok(AdvanceReport::without_drive(current, target));
        }

        let ids: Vec<DocumentId> = self
            .documents
            .iter()
            .filter(|id| !excluded.contains(*id))
            .cloned()
            .collect();

        let result = self
            .coordinator
            .drive(
                &ids,
                &TerminalPredicate::for_stage(current),
                self.options,
                cancel,
                PollCtx::new(self.batch_id, current),
            )
            .await;

        let report = match result {
            DriveResult::Settled(report) => report,
            DriveResult::Cancelled(_) => {
                warn!("[批次 #{}] ⚠️ 推进已取消，停留在阶段 {}", self.batch_id, current);
                return Err(PipelineError::Cancelled { stage: current });
            }
        };

        let partial_failures = self.classify(&report, current);
        {
            let mut state = self.lock();
            state.processed.insert(current);
            for entry in &partial_failures {
                state.record_exception(entry.clone());
            }
        }
        self.transition(target);

        if !partial_failures.is_empty() {
            warn!(
                "[批次 #{}] 阶段 {} 有 {} 个文档进入异常",
                self.batch_id,
                current,
                partial_failures.len()
            );
        }

        Ok(AdvanceReport {
            from: current,
            to: target,
            drive: Some(report),
            partial_failures,
        })
    }

    /// 回退到更早的阶段；不轮询，已处理标记保留
    pub fn rewind(&self, target: PipelineStage) -> Result<PipelineStage, PipelineError> {
        let _guard =
            BusyGuard::acquire(&self.busy).ok_or_else(|| PipelineError::AdvanceInProgress {
                stage: self.current_stage(),
            })?;

        let mut state = self.lock();
        if target >= state.current {
            return Err(PipelineError::InvalidTransition {
                from: state.current.number(),
                to: target.number(),
            });
        }

        info!(
            "[批次 #{}] ↩️ 从阶段 {} 回退到 {}",
            self.batch_id, state.current, target
        );
        state.current = target;
        Ok(target)
    }

    /// 重新轮询异常桶中超时的文档，使用它们失败时所在阶段的判定条件
    pub async fn retry_exceptions(
        &self,
        cancel: &CancellationToken,
    ) -> Result<RetryReport, PipelineError> {
        let _guard = BusyGuard::acquire(&self.busy).ok_or_else(|| {
            PipelineError::AdvanceInProgress {
                stage: self.current_stage(),
            }
        })?;

        let timed_out: Vec<ExceptionEntry> = self
            .lock()
            .exceptions
            .iter()
            .filter(|e| e.is_timed_out())
            .cloned()
            .collect();

        let mut retry = RetryReport {
            retried: timed_out.len(),
            ..RetryReport::default()
        };

        for stage in PipelineStage::ALL {
            let ids: Vec<DocumentId> = timed_out
                .iter()
                .filter(|e| e.stage == stage)
                .map(|e| e.id.clone())
                .collect();
            if ids.is_empty() {
                continue;
            }

            info!(
                "[批次 #{}] 🔁 重试阶段 {} 的 {} 个超时文档",
                self.batch_id,
                stage,
                ids.len()
            );

            let result = self
                .coordinator
                .drive(
                    &ids,
                    &TerminalPredicate::for_stage(stage),
                    self.options,
                    cancel,
                    PollCtx::new(self.batch_id, stage),
                )
                .await;

            let report = match result {
                DriveResult::Settled(report) => report,
                DriveResult::Cancelled(_) => {
                    return Err(PipelineError::Cancelled {
                        stage: self.current_stage(),
                    });
                }
            };

            let failures = self.classify(&report, stage);
            let failed_ids: HashSet<&DocumentId> = failures.iter().map(|e| &e.id).collect();
            let recovered: Vec<DocumentId> = ids
                .iter()
                .filter(|id| !failed_ids.contains(id))
                .cloned()
                .collect();

            let mut state = self.lock();
            state.exceptions.retain(|e| !recovered.contains(&e.id));
            for entry in failures {
                state.record_exception(entry);
            }
            retry.recovered.extend(recovered);
        }

        retry.still_failing = self.exceptions();
        Ok(retry)
    }

    /// 把 drive 结果中的问题文档整理为异常记录
    fn classify(&self, report: &DriveReport, stage: PipelineStage) -> Vec<ExceptionEntry> {
        let registry = self.registry();
        let mut entries = Vec::new();

        for id in &report.completed {
            if let Some(reason) = registry
                .get(id)
                .and_then(|doc| doc.status.error_reason().map(str::to_string))
            {
                entries.push(ExceptionEntry::errored(id.clone(), stage, reason));
            }
        }
        for id in &report.failed {
            entries.push(ExceptionEntry::errored(id.clone(), stage, "远端不存在该文档"));
        }
        for id in &report.timed_out {
            entries.push(ExceptionEntry::timed_out(id.clone(), stage));
        }

        entries
    }

    fn transition(&self, target: PipelineStage) {
        let reached = {
            let mut state = self.lock();
            state.current = target;
            state.reached = state.reached.max(target);
            state.reached
        };
        self.update_ceiling(reached);
        info!("[批次 #{}] ➡️ 进入阶段 {}", self.batch_id, target);
    }
}
