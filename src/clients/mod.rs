//! 外部服务客户端
//!
//! `UploadService` / `ExtractionService` 是编排层与外部服务之间的接缝，
//! `SupplyChainClient` 是基于 HTTP 的实现；测试中可替换为假服务。

pub mod supply_chain_client;

use async_trait::async_trait;

use crate::error::{ApiError, PollError};
use crate::models::{DocumentId, RemoteDocumentStatus, UploadFile};

pub use supply_chain_client::{DocumentQuery, DocumentsPage, SupplyChainClient};

/// 上传服务：按提交顺序返回每个文件的文档ID
#[async_trait]
pub trait UploadService: Send + Sync {
    async fn upload(&self, files: &[UploadFile]) -> Result<Vec<DocumentId>, ApiError>;
}

/// 抽取/匹配服务
#[async_trait]
pub trait ExtractionService: Send + Sync {
    /// 查询单个文档的当前状态（只发一次请求，不重试）
    async fn fetch_status(&self, id: &DocumentId) -> Result<RemoteDocumentStatus, PollError>;

    /// 列出文档
    async fn list_documents(&self, query: &DocumentQuery) -> Result<DocumentsPage, ApiError>;

    /// 人工批准
    async fn approve(&self, id: &DocumentId) -> Result<RemoteDocumentStatus, ApiError>;

    /// 人工驳回
    async fn reject(
        &self,
        id: &DocumentId,
        reason: Option<&str>,
    ) -> Result<RemoteDocumentStatus, ApiError>;
}
