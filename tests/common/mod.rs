//! 测试用的假服务：按脚本返回每个文档的状态
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use supply_chain_pipeline::clients::{
    DocumentQuery, DocumentsPage, ExtractionService, UploadService,
};
use supply_chain_pipeline::error::{ApiError, PollError};
use supply_chain_pipeline::models::{
    DocumentId, ExtractedData, RemoteDocumentStatus, RemoteState, UploadFile,
};

/// 脚本中的一步
#[derive(Debug, Clone)]
pub enum Step {
    /// 返回指定的远端状态
    State(RemoteState),
    /// 返回 error 状态及原因
    Failed(&'static str),
    /// 网络层失败
    Transport,
    /// 远端 404
    Missing,
    /// 返回指定状态，但只带 created_at、不带 updated_at
    Unstamped(RemoteState),
}

/// 按脚本应答的假服务
///
/// - 每个文档一条脚本，逐次取出；只剩最后一步时重复返回它
/// - 没有脚本的文档直接返回 completed
/// - `updated_at` 每次应答递增一秒（`Step::Unstamped` 与 `unstamped_decisions` 除外）
pub struct ScriptedService {
    scripts: Mutex<HashMap<DocumentId, VecDeque<Step>>>,
    extracted: Mutex<HashMap<DocumentId, ExtractedData>>,
    calls: Mutex<HashMap<DocumentId, usize>>,
    total_calls: AtomicUsize,
    next_id: AtomicUsize,
    clock: AtomicI64,
    delay: Option<Duration>,
    short_upload: AtomicBool,
    unstamped_decisions: AtomicBool,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            extracted: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            total_calls: AtomicUsize::new(0),
            next_id: AtomicUsize::new(1),
            clock: AtomicI64::new(0),
            delay: None,
            short_upload: AtomicBool::new(false),
            unstamped_decisions: AtomicBool::new(false),
        }
    }

    /// 每次状态查询前等待 `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn script(&self, id: &str, steps: impl IntoIterator<Item = Step>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(id.into(), steps.into_iter().collect());
    }

    pub fn set_extracted(&self, id: &str, data: ExtractedData) {
        self.extracted.lock().unwrap().insert(id.into(), data);
    }

    /// 审批/驳回的应答不带 updated_at
    pub fn unstamped_decisions(&self) {
        self.unstamped_decisions.store(true, Ordering::SeqCst);
    }

    /// 下一次上传少返回一个ID
    pub fn drop_one_upload_id(&self) {
        self.short_upload.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self, id: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(&DocumentId::from(id))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }

    fn tick(&self) -> String {
        let secs = self.clock.fetch_add(1, Ordering::SeqCst);
        (Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + ChronoDuration::seconds(secs))
            .to_rfc3339()
    }

    fn next_step(&self, id: &DocumentId) -> Step {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(id) {
            Some(steps) if steps.len() > 1 => steps.pop_front().unwrap(),
            Some(steps) => steps.front().cloned().unwrap_or(Step::State(RemoteState::Completed)),
            None => Step::State(RemoteState::Completed),
        }
    }

    fn peek_step(&self, id: &DocumentId) -> Step {
        self.scripts
            .lock()
            .unwrap()
            .get(id)
            .and_then(|steps| steps.front().cloned())
            .unwrap_or(Step::State(RemoteState::Completed))
    }

    fn respond(&self, id: &DocumentId, state: RemoteState) -> RemoteDocumentStatus {
        let mut status = RemoteDocumentStatus::with_state(id.as_str(), state);
        status.updated_at = Some(self.tick());
        status.extracted_data = self.extracted.lock().unwrap().get(id).cloned();
        status
    }

    fn respond_unstamped(&self, id: &DocumentId, state: RemoteState) -> RemoteDocumentStatus {
        let mut status = self.respond(id, state);
        status.updated_at = None;
        status.created_at = Some("2024-01-01T00:00:00".to_string());
        status
    }

    fn respond_decision(&self, id: &DocumentId, state: RemoteState) -> RemoteDocumentStatus {
        if self.unstamped_decisions.load(Ordering::SeqCst) {
            self.respond_unstamped(id, state)
        } else {
            self.respond(id, state)
        }
    }
}

impl Default for ScriptedService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UploadService for ScriptedService {
    async fn upload(&self, files: &[UploadFile]) -> Result<Vec<DocumentId>, ApiError> {
        let mut count = files.len();
        if self.short_upload.swap(false, Ordering::SeqCst) {
            count = count.saturating_sub(1);
        }
        Ok((0..count)
            .map(|_| {
                let n = self.next_id.fetch_add(1, Ordering::SeqCst);
                DocumentId::new(format!("doc-{n}"))
            })
            .collect())
    }
}

#[async_trait]
impl ExtractionService for ScriptedService {
    async fn fetch_status(&self, id: &DocumentId) -> Result<RemoteDocumentStatus, PollError> {
        *self.calls.lock().unwrap().entry(id.clone()).or_insert(0) += 1;
        self.total_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.next_step(id) {
            Step::State(state) => Ok(self.respond(id, state)),
            Step::Failed(reason) => {
                let mut status = self.respond(id, RemoteState::Error);
                status.error = Some(reason.to_string());
                Ok(status)
            }
            Step::Transport => Err(PollError::transport(
                id.clone(),
                std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused"),
            )),
            Step::Missing => Err(PollError::NotFound {
                document_id: id.clone(),
            }),
            Step::Unstamped(state) => Ok(self.respond_unstamped(id, state)),
        }
    }

    async fn list_documents(&self, query: &DocumentQuery) -> Result<DocumentsPage, ApiError> {
        let ids: Vec<DocumentId> = self.scripts.lock().unwrap().keys().cloned().collect();
        let documents: Vec<RemoteDocumentStatus> = ids
            .iter()
            .filter_map(|id| match self.peek_step(id) {
                Step::State(state) => Some(self.respond(id, state)),
                Step::Failed(reason) => {
                    let mut status = self.respond(id, RemoteState::Error);
                    status.error = Some(reason.to_string());
                    Some(status)
                }
                Step::Unstamped(state) => Some(self.respond_unstamped(id, state)),
                Step::Transport | Step::Missing => None,
            })
            .collect();

        Ok(DocumentsPage {
            success: true,
            total: documents.len() as u64,
            documents,
            limit: query.limit,
            offset: query.offset,
        })
    }

    async fn approve(&self, id: &DocumentId) -> Result<RemoteDocumentStatus, ApiError> {
        Ok(self.respond_decision(id, RemoteState::Approved))
    }

    async fn reject(
        &self,
        id: &DocumentId,
        reason: Option<&str>,
    ) -> Result<RemoteDocumentStatus, ApiError> {
        let mut status = self.respond_decision(id, RemoteState::Rejected);
        status.error = reason.map(str::to_string);
        Ok(status)
    }
}

/// 生成 `n` 个待上传的 pdf 文件
pub fn pdf_files(n: usize) -> Vec<UploadFile> {
    (1..=n)
        .map(|i| UploadFile::new(format!("invoice-{i}.pdf"), vec![0u8; 16 * i]))
        .collect()
}

/// 生成 `doc-1` .. `doc-n`
pub fn doc_ids(n: usize) -> Vec<DocumentId> {
    (1..=n).map(|i| DocumentId::new(format!("doc-{i}"))).collect()
}
