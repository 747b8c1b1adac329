//! 流水线编排器 - 编排层
//!
//! 对外暴露的命令入口：上传批次、推进阶段、查询快照与指标、人工审批。
//! 每个批次有独立的注册表和阶段控制器，批次之间互不影响。

use chrono::Utc;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::batch_poller::{BatchPollCoordinator, DriveOptions};
use super::stage_controller::{AdvanceReport, RetryReport, StageController};
use crate::clients::{DocumentQuery, ExtractionService, UploadService};
use crate::error::{ApiError, AppResult, PipelineError};
use crate::infrastructure::{DocumentRegistry, PutOutcome, Records};
use crate::models::{
    Document, DocumentId, ExceptionEntry, PipelineStage, RemoteDocumentStatus, StatusRecord,
    UploadFile,
};
use crate::services::{
    DocumentFilter, DocumentView, ExceptionAlert, MetricsAggregator, MetricsSummary, StatusPoller,
};

/// 批次句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchHandle(u64);

impl BatchHandle {
    pub fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 一个批次的全部状态
struct BatchSession {
    registry: Arc<DocumentRegistry>,
    controller: Arc<StageController>,
    cancel: Mutex<CancellationToken>,
}

impl BatchSession {
    fn token(&self) -> CancellationToken {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 取消当前令牌并换上新令牌，之后的命令不受影响
    fn cancel(&self) {
        let mut token = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
        token.cancel();
        *token = CancellationToken::new();
    }

    fn contains(&self, id: &DocumentId) -> bool {
        self.controller.documents().contains(id)
    }
}

/// 流水线编排器
pub struct PipelineOrchestrator {
    uploader: Arc<dyn UploadService>,
    service: Arc<dyn ExtractionService>,
    options: DriveOptions,
    next_batch: AtomicU64,
    sessions: Mutex<HashMap<BatchHandle, Arc<BatchSession>>>,
}

impl PipelineOrchestrator {
    pub fn new(
        uploader: Arc<dyn UploadService>,
        service: Arc<dyn ExtractionService>,
        options: DriveOptions,
    ) -> Self {
        Self {
            uploader,
            service,
            options,
            next_batch: AtomicU64::new(1),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<BatchHandle, Arc<BatchSession>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn session(&self, handle: BatchHandle) -> Result<Arc<BatchSession>, PipelineError> {
        self.sessions()
            .get(&handle)
            .cloned()
            .ok_or(PipelineError::UnknownBatch(handle.id()))
    }

    /// 上传一批文件，成功后创建新批次（位于第一阶段）
    ///
    /// 上传失败的文件不会进入注册表
    ///
    /// # 参数
    /// - `files`: 待上传的文件，不能为空
    ///
    /// # 返回
    /// 返回新批次的句柄
    pub async fn upload_batch(&self, files: Vec<UploadFile>) -> AppResult<BatchHandle> {
        if files.is_empty() {
            return Err(PipelineError::EmptyBatch.into());
        }

        let ids = self.uploader.upload(&files).await?;
        if ids.len() != files.len() {
            return Err(ApiError::UploadMismatch {
                expected: files.len(),
                actual: ids.len(),
            }
            .into());
        }

        let handle = BatchHandle(self.next_batch.fetch_add(1, Ordering::SeqCst));
        let registry = Arc::new(DocumentRegistry::new());
        for (id, file) in ids.iter().zip(&files) {
            registry.insert(Document::uploaded(id.clone(), file.filename.clone(), file.size()));
        }

        let coordinator = BatchPollCoordinator::new(
            StatusPoller::new(self.service.clone()),
            registry.clone(),
        );
        let controller = Arc::new(StageController::new(
            handle.id(),
            ids,
            coordinator,
            self.options,
        ));

        self.sessions().insert(
            handle,
            Arc::new(BatchSession {
                registry,
                controller,
                cancel: Mutex::new(CancellationToken::new()),
            }),
        );

        info!("[批次 {}] ✓ 上传完成: {} 个文档", handle, files.len());
        Ok(handle)
    }

    /// 推进到下一阶段
    ///
    /// # 参数
    /// - `handle`: 批次句柄
    ///
    /// # 返回
    /// 返回本次推进的报告
    pub async fn advance(&self, handle: BatchHandle) -> AppResult<AdvanceReport> {
        let session = self.session(handle)?;
        let current = session.controller.current_stage();
        let target = current
            .next()
            .ok_or(PipelineError::InvalidTransition {
                from: current.number(),
                to: current.number() + 1,
            })?;
        Ok(session.controller.advance(target, &session.token()).await?)
    }

    /// 推进到指定编号的阶段（只能是下一阶段，或重复当前阶段）
    pub async fn advance_to(&self, handle: BatchHandle, stage: u8) -> AppResult<AdvanceReport> {
        let session = self.session(handle)?;
        let target = PipelineStage::from_number(stage).ok_or(PipelineError::InvalidTransition {
            from: session.controller.current_stage().number(),
            to: stage,
        })?;
        Ok(session.controller.advance(target, &session.token()).await?)
    }

    pub fn rewind(&self, handle: BatchHandle, stage: u8) -> AppResult<PipelineStage> {
        let session = self.session(handle)?;
        let current = session.controller.current_stage();
        let target = PipelineStage::from_number(stage).ok_or(PipelineError::InvalidTransition {
            from: current.number(),
            to: stage,
        })?;
        Ok(session.controller.rewind(target)?)
    }

    pub async fn retry_exceptions(&self, handle: BatchHandle) -> AppResult<RetryReport> {
        let session = self.session(handle)?;
        Ok(session.controller.retry_exceptions(&session.token()).await?)
    }

    /// 取消正在进行的推进；阶段保持不变
    pub fn cancel(&self, handle: BatchHandle) -> Result<(), PipelineError> {
        let session = self.session(handle)?;
        session.cancel();
        info!("[批次 {}] 已发出取消信号", handle);
        Ok(())
    }

    /// 丢弃批次（开始新的处理）
    pub fn discard(&self, handle: BatchHandle) -> Result<(), PipelineError> {
        let session = self
            .sessions()
            .remove(&handle)
            .ok_or(PipelineError::UnknownBatch(handle.id()))?;
        session.cancel();
        info!("[批次 {}] 🗑️ 已丢弃", handle);
        Ok(())
    }

    pub fn batches(&self) -> Vec<BatchHandle> {
        let mut handles: Vec<_> = self.sessions().keys().copied().collect();
        handles.sort();
        handles
    }

    pub fn current_stage(&self, handle: BatchHandle) -> Result<PipelineStage, PipelineError> {
        Ok(self.session(handle)?.controller.current_stage())
    }

    pub fn is_busy(&self, handle: BatchHandle) -> Result<bool, PipelineError> {
        Ok(self.session(handle)?.controller.is_busy())
    }

    pub fn is_complete(&self, handle: BatchHandle) -> Result<bool, PipelineError> {
        Ok(self.session(handle)?.controller.is_complete())
    }

    /// 注册表快照（按上传顺序）
    pub fn snapshot(&self, handle: BatchHandle) -> Result<Records, PipelineError> {
        Ok(self.session(handle)?.registry.all())
    }

    pub fn document(
        &self,
        handle: BatchHandle,
        id: &DocumentId,
    ) -> Result<Arc<Document>, PipelineError> {
        self.session(handle)?
            .registry
            .get(id)
            .ok_or_else(|| PipelineError::UnknownDocument(id.clone()))
    }

    pub fn metrics(&self, handle: BatchHandle) -> Result<MetricsSummary, PipelineError> {
        Ok(MetricsAggregator::summarize(&self.snapshot(handle)?))
    }

    pub fn filtered_views(
        &self,
        handle: BatchHandle,
        filter: &DocumentFilter,
    ) -> Result<Vec<DocumentView>, PipelineError> {
        Ok(MetricsAggregator::filtered(&self.snapshot(handle)?, filter))
    }

    pub fn exception_alerts(&self, handle: BatchHandle) -> Result<Vec<ExceptionAlert>, PipelineError> {
        Ok(MetricsAggregator::exception_alerts(&self.snapshot(handle)?))
    }

    /// 异常桶内容
    pub fn exceptions(&self, handle: BatchHandle) -> Result<Vec<ExceptionEntry>, PipelineError> {
        Ok(self.session(handle)?.controller.exceptions())
    }

    /// 人工批准
    pub async fn approve(&self, handle: BatchHandle, id: &DocumentId) -> AppResult<Arc<Document>> {
        let session = self.checked_session(handle, id)?;
        let remote = self.service.approve(id).await?;
        info!("[文档 {}] ✅ 已人工批准", id);
        self.apply_decision(&session, id, remote)
    }

    /// 人工驳回
    pub async fn reject(
        &self,
        handle: BatchHandle,
        id: &DocumentId,
        reason: Option<&str>,
    ) -> AppResult<Arc<Document>> {
        let session = self.checked_session(handle, id)?;
        let remote = self.service.reject(id, reason).await?;
        info!("[文档 {}] ⛔ 已人工驳回: {}", id, reason.unwrap_or("-"));
        self.apply_decision(&session, id, remote)
    }

    /// 拉取一次文档列表并更新本批次的记录，返回被更新的文档数
    ///
    /// 不影响阶段状态机
    pub async fn refresh(&self, handle: BatchHandle) -> AppResult<usize> {
        let session = self.session(handle)?;
        let query = DocumentQuery {
            limit: DocumentQuery::default()
                .limit
                .max(session.controller.documents().len() as u32),
            ..DocumentQuery::default()
        };
        let page = self.service.list_documents(&query).await?;

        let observed_at = Utc::now();
        let mut updated = 0;
        for remote in page.documents {
            let id = DocumentId::new(remote.id.clone());
            if !session.contains(&id) {
                continue;
            }
            match StatusRecord::from_remote(&id, remote, observed_at) {
                Ok(record) => {
                    if session.registry.put(&id, record) != PutOutcome::Stale {
                        updated += 1;
                    }
                }
                Err(e) => warn!("[文档 {}] 列表中的记录无法解析: {}", id, e),
            }
        }

        Ok(updated)
    }

    fn checked_session(
        &self,
        handle: BatchHandle,
        id: &DocumentId,
    ) -> Result<Arc<BatchSession>, PipelineError> {
        let session = self.session(handle)?;
        if !session.contains(id) {
            return Err(PipelineError::UnknownDocument(id.clone()));
        }
        Ok(session)
    }

    fn apply_decision(
        &self,
        session: &BatchSession,
        id: &DocumentId,
        remote: RemoteDocumentStatus,
    ) -> AppResult<Arc<Document>> {
        let record = StatusRecord::from_remote(id, remote, Utc::now())?;
        // 人工审批结果以远端返回为准，不与轮询得到的旧观测比较新旧
        let outcome = session.registry.overwrite(id, record);
        let document = session
            .registry
            .get(id)
            .ok_or_else(|| PipelineError::UnknownDocument(id.clone()))?;
        debug!("[文档 {}] 审批结果已写入 ({:?}): {}", id, outcome, document.status);
        session.controller.clear_exception(id);
        Ok(document)
    }
}
