/// 供应链单据 API 客户端
///
/// 封装所有与抽取/匹配服务相关的 HTTP 调用
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::{ExtractionService, UploadService};
use crate::config::Config;
use crate::error::{ApiError, PollError};
use crate::models::{DocumentId, RemoteDocumentStatus, RemoteState, UploadFile};

/// 上传接口响应
#[derive(Debug, Clone, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    document_ids: Vec<String>,
    #[serde(default)]
    message: String,
}

/// 审批接口响应
#[derive(Debug, Clone, Deserialize)]
struct DecisionResponse {
    document: RemoteDocumentStatus,
}

/// 文档列表查询条件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentQuery {
    pub status: Option<RemoteState>,
    pub limit: u32,
    pub offset: u32,
}

impl Default for DocumentQuery {
    fn default() -> Self {
        Self {
            status: None,
            limit: 50,
            offset: 0,
        }
    }
}

/// 文档列表分页结果
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentsPage {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub documents: Vec<RemoteDocumentStatus>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

impl DocumentsPage {
    fn empty(query: &DocumentQuery) -> Self {
        Self {
            success: true,
            documents: Vec::new(),
            total: 0,
            limit: query.limit,
            offset: query.offset,
        }
    }
}

/// 供应链单据 API 客户端
pub struct SupplyChainClient {
    http: reqwest::Client,
    base_url: String,
}

impl SupplyChainClient {
    /// 创建新的客户端
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ApiError::ClientBuildFailed {
                source: Box::new(e),
            })?;

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// 拼接接口地址
    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// 从错误响应体中提取 `detail` 字段
    fn extract_detail(body: &str) -> String {
        serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
            .unwrap_or_else(|| body.trim().to_string())
    }

    /// 解析审批类接口的响应
    async fn decision_response(
        endpoint: &str,
        response: reqwest::Response,
    ) -> Result<RemoteDocumentStatus, ApiError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::request_failed(endpoint, e))?;

        if !status.is_success() {
            return Err(ApiError::BadResponse {
                endpoint: endpoint.to_string(),
                code: Some(status.as_u16()),
                message: Some(Self::extract_detail(&body)),
            });
        }

        let parsed: DecisionResponse = serde_json::from_str(&body)?;
        Ok(parsed.document)
    }
}

#[async_trait]
impl UploadService for SupplyChainClient {
    async fn upload(&self, files: &[UploadFile]) -> Result<Vec<DocumentId>, ApiError> {
        let endpoint = self.endpoint("supply-chain/upload");

        let mut form = Form::new();
        for file in files {
            let part = Part::bytes(file.bytes.clone())
                .file_name(file.filename.clone())
                .mime_str(file.content_type())
                .map_err(|e| ApiError::request_failed(&endpoint, e))?;
            form = form.part("files", part);
        }

        debug!("上传 {} 个文件到 {}", files.len(), endpoint);

        let response = self
            .http
            .post(&endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ApiError::request_failed(&endpoint, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::request_failed(&endpoint, e))?;

        if !status.is_success() {
            warn!("上传失败: HTTP {}", status);
            return Err(ApiError::BadResponse {
                endpoint,
                code: Some(status.as_u16()),
                message: Some(Self::extract_detail(&body)),
            });
        }

        let parsed: UploadResponse = serde_json::from_str(&body)?;
        if !parsed.success {
            return Err(ApiError::BadResponse {
                endpoint,
                code: Some(status.as_u16()),
                message: Some(parsed.message),
            });
        }

        debug!("上传成功: {}", parsed.message);
        Ok(parsed.document_ids.into_iter().map(DocumentId::from).collect())
    }
}

#[async_trait]
impl ExtractionService for SupplyChainClient {
    async fn fetch_status(&self, id: &DocumentId) -> Result<RemoteDocumentStatus, PollError> {
        let endpoint = self.endpoint(&format!("supply-chain/status/{}", id));

        let response = self
            .http
            .get(&endpoint)
            .send()
            .await
            .map_err(|e| PollError::transport(id.clone(), e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(PollError::NotFound {
                document_id: id.clone(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| PollError::transport(id.clone(), e))?;

        if !status.is_success() {
            return Err(PollError::BadResponse {
                document_id: id.clone(),
                status: status.as_u16(),
                detail: Self::extract_detail(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| PollError::malformed(id.clone(), e.to_string()))
    }

    async fn list_documents(&self, query: &DocumentQuery) -> Result<DocumentsPage, ApiError> {
        let endpoint = self.endpoint("supply-chain/documents");

        let mut params = vec![
            ("limit", query.limit.to_string()),
            ("offset", query.offset.to_string()),
        ];
        if let Some(state) = query.status {
            params.push(("status", state.as_str().to_string()));
        }

        let response = self
            .http
            .get(&endpoint)
            .query(&params)
            .send()
            .await
            .map_err(|e| ApiError::request_failed(&endpoint, e))?;

        // 接口不存在或尚无文档时按空列表处理
        if response.status() == StatusCode::NOT_FOUND {
            debug!("文档列表接口返回 404，按空列表处理");
            return Ok(DocumentsPage::empty(query));
        }

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::request_failed(&endpoint, e))?;

        if !status.is_success() {
            return Err(ApiError::BadResponse {
                endpoint,
                code: Some(status.as_u16()),
                message: Some(Self::extract_detail(&body)),
            });
        }

        Ok(serde_json::from_str(&body)?)
    }

    async fn approve(&self, id: &DocumentId) -> Result<RemoteDocumentStatus, ApiError> {
        let endpoint = self.endpoint(&format!("supply-chain/approve/{}", id));

        let response = self
            .http
            .post(&endpoint)
            .send()
            .await
            .map_err(|e| ApiError::request_failed(&endpoint, e))?;

        Self::decision_response(&endpoint, response).await
    }

    async fn reject(
        &self,
        id: &DocumentId,
        reason: Option<&str>,
    ) -> Result<RemoteDocumentStatus, ApiError> {
        let endpoint = self.endpoint(&format!("supply-chain/reject/{}", id));

        let mut form = Form::new();
        if let Some(reason) = reason {
            form = form.text("reason", reason.to_string());
        }

        let response = self
            .http
            .post(&endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ApiError::request_failed(&endpoint, e))?;

        Self::decision_response(&endpoint, response).await
    }
}
