//! 远端状态记录的规范化
//!
//! 远端返回的 `status` 字符串经 `REMOTE_STATES` 表映射为 `RemoteState`，
//! 再归一为 `DocumentStatus`。未知状态视为响应格式错误。

use chrono::{DateTime, NaiveDateTime, Utc};
use phf::phf_map;
use serde::{Deserialize, Serialize};

use super::document::{DocumentId, DocumentStatus, ExtractedData};
use super::stage::PipelineStage;
use crate::error::PollError;

/// 远端原始状态标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteState {
    Uploaded,
    Intake,
    Parsing,
    Review,
    Matching,
    Completed,
    Approved,
    Rejected,
    Error,
}

static REMOTE_STATES: phf::Map<&'static str, RemoteState> = phf_map! {
    "uploaded" => RemoteState::Uploaded,
    "intake" => RemoteState::Intake,
    "parsing" => RemoteState::Parsing,
    "review" => RemoteState::Review,
    "matching" => RemoteState::Matching,
    "completed" => RemoteState::Completed,
    "approved" => RemoteState::Approved,
    "rejected" => RemoteState::Rejected,
    "error" => RemoteState::Error,
};

impl RemoteState {
    pub fn parse(raw: &str) -> Option<Self> {
        REMOTE_STATES.get(raw.trim().to_lowercase().as_str()).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RemoteState::Uploaded => "uploaded",
            RemoteState::Intake => "intake",
            RemoteState::Parsing => "parsing",
            RemoteState::Review => "review",
            RemoteState::Matching => "matching",
            RemoteState::Completed => "completed",
            RemoteState::Approved => "approved",
            RemoteState::Rejected => "rejected",
            RemoteState::Error => "error",
        }
    }

    /// 处理中状态对应的流水线阶段
    fn in_stage(self) -> Option<PipelineStage> {
        match self {
            RemoteState::Intake => Some(PipelineStage::Intake),
            RemoteState::Parsing => Some(PipelineStage::Parsing),
            RemoteState::Review => Some(PipelineStage::Review),
            RemoteState::Matching => Some(PipelineStage::Matching),
            _ => None,
        }
    }
}

/// 状态查询接口的原始响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteDocumentStatus {
    pub id: String,
    #[serde(default)]
    pub filename: Option<String>,
    pub status: String,
    #[serde(default)]
    pub stage: Option<u8>,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub extracted_data: Option<ExtractedData>,
    #[serde(default)]
    pub error: Option<String>,
}

impl RemoteDocumentStatus {
    /// 构造一个最小响应（主要用于测试与假服务）
    pub fn with_state(id: impl Into<String>, state: RemoteState) -> Self {
        Self {
            id: id.into(),
            filename: None,
            status: state.as_str().to_string(),
            stage: None,
            progress: None,
            created_at: None,
            updated_at: None,
            file_size: None,
            extracted_data: None,
            error: None,
        }
    }
}

/// 规范化后的状态记录
#[derive(Debug, Clone, PartialEq)]
pub struct StatusRecord {
    pub id: DocumentId,
    pub filename: Option<String>,
    pub size_bytes: Option<u64>,
    pub remote_state: RemoteState,
    pub status: DocumentStatus,
    pub stage: u8,
    pub progress: u8,
    pub extracted: Option<ExtractedData>,
    pub created_at: Option<DateTime<Utc>>,
    /// 远端报告的 updated_at；只有它参与新旧判定
    pub remote_updated_at: Option<DateTime<Utc>>,
    /// 该记录所代表的时间点：远端 updated_at，缺失时为本地观测时间
    pub last_updated: DateTime<Utc>,
}

impl StatusRecord {
    /// 将远端响应归一化
    ///
    /// `document_id` 为发起查询时使用的 ID；响应中的 id 为空时以它为准。
    pub fn from_remote(
        document_id: &DocumentId,
        remote: RemoteDocumentStatus,
        observed_at: DateTime<Utc>,
    ) -> Result<Self, PollError> {
        let remote_state = RemoteState::parse(&remote.status).ok_or_else(|| {
            PollError::malformed(
                document_id.clone(),
                format!("未知状态标签: {}", remote.status),
            )
        })?;

        let reported_stage = remote
            .stage
            .map(|s| s.clamp(PipelineStage::FIRST.number(), PipelineStage::LAST.number()))
            .unwrap_or(PipelineStage::FIRST.number());

        let status = match remote_state {
            RemoteState::Uploaded => DocumentStatus::Uploaded,
            RemoteState::Completed | RemoteState::Approved => DocumentStatus::Completed,
            RemoteState::Rejected => DocumentStatus::Error(format!(
                "rejected: {}",
                remote.error.as_deref().unwrap_or("no reason given")
            )),
            RemoteState::Error => DocumentStatus::Error(
                remote
                    .error
                    .clone()
                    .unwrap_or_else(|| "unknown processing error".to_string()),
            ),
            state => {
                // in_stage 对处理中状态总是 Some
                let stage = state.in_stage().map(|s| s.number()).unwrap_or(reported_stage);
                DocumentStatus::InStage(stage.max(reported_stage))
            }
        };

        let stage = match &status {
            DocumentStatus::InStage(stage) => *stage,
            _ => reported_stage,
        };

        let id = if remote.id.trim().is_empty() {
            document_id.clone()
        } else {
            DocumentId::new(remote.id)
        };

        let created_at = remote.created_at.as_deref().and_then(parse_timestamp);
        // created_at 不代表本次观测，不能拿来和其他记录的 updated_at 比较
        let remote_updated_at = remote.updated_at.as_deref().and_then(parse_timestamp);

        Ok(Self {
            id,
            filename: remote.filename,
            size_bytes: remote.file_size,
            remote_state,
            status,
            stage,
            progress: remote.progress.unwrap_or(0.0).clamp(0.0, 100.0) as u8,
            extracted: remote.extracted_data,
            created_at,
            remote_updated_at,
            last_updated: remote_updated_at.unwrap_or(observed_at),
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// 解析远端时间戳：RFC 3339，或不带时区的 ISO 8601（按 UTC 处理）
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
