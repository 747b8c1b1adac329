use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::status::RemoteState;

/// 文档ID（由上传服务分配，不透明）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// 文档的规范化状态
///
/// `Completed` 与 `Error` 为终态，轮询到即停止。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentStatus {
    Uploaded,
    InStage(u8),
    Completed,
    Error(String),
}

impl DocumentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentStatus::Completed | DocumentStatus::Error(_))
    }

    pub fn error_reason(&self) -> Option<&str> {
        match self {
            DocumentStatus::Error(reason) => Some(reason),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentStatus::Uploaded => write!(f, "已上传"),
            DocumentStatus::InStage(stage) => write!(f, "处理中(阶段 {})", stage),
            DocumentStatus::Completed => write!(f, "已完成"),
            DocumentStatus::Error(reason) => write!(f, "错误: {}", reason),
        }
    }
}

/// 单据类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentType {
    #[serde(rename = "PO")]
    PurchaseOrder,
    #[serde(rename = "BoL")]
    BillOfLading,
    #[serde(rename = "GRN")]
    GoodsReceipt,
    #[serde(rename = "Packing List")]
    PackingList,
    #[serde(rename = "Invoice")]
    Invoice,
    #[serde(rename = "QC Cert")]
    QcCertificate,
    #[serde(other)]
    Other,
}

/// 抽取置信度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
    #[serde(other)]
    Unknown,
}

/// 明细行
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub unit_price: f64,
    #[serde(default)]
    pub total: f64,
}

/// 远端服务抽取出的结构化数据
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExtractedData {
    #[serde(default)]
    pub document_type: Option<DocumentType>,
    #[serde(default)]
    pub supplier: Option<String>,
    #[serde(default)]
    pub order_number: Option<String>,
    #[serde(default)]
    pub order_date: Option<String>,
    #[serde(default)]
    pub total_amount: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    #[serde(default)]
    pub confidence: Option<Confidence>,
}

/// 注册表中的文档记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: DocumentId,
    pub filename: String,
    pub size_bytes: u64,
    /// 已到达的最高阶段，只增不减
    pub stage: u8,
    pub status: DocumentStatus,
    pub remote_state: RemoteState,
    pub progress: u8,
    pub extracted: Option<ExtractedData>,
    pub created_at: Option<DateTime<Utc>>,
    /// 最近一次成功观测的时间；刚上传时尚无观测
    pub last_updated: Option<DateTime<Utc>>,
    /// 已写入的最新远端 updated_at，用于丢弃乱序到达的旧观测
    #[serde(skip)]
    pub remote_updated_at: Option<DateTime<Utc>>,
}

impl Document {
    /// 上传成功后创建的初始记录
    pub fn uploaded(id: DocumentId, filename: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            id,
            filename: filename.into(),
            size_bytes,
            stage: 1,
            status: DocumentStatus::Uploaded,
            remote_state: RemoteState::Uploaded,
            progress: 0,
            extracted: None,
            created_at: Some(Utc::now()),
            last_updated: None,
            remote_updated_at: None,
        }
    }

    /// 抽取出的金额，缺失时为 None（不按 0 计）
    pub fn amount(&self) -> Option<f64> {
        self.extracted.as_ref().and_then(|e| e.total_amount)
    }

    pub fn supplier(&self) -> &str {
        self.extracted
            .as_ref()
            .and_then(|e| e.supplier.as_deref())
            .unwrap_or("Unknown")
    }

    pub fn document_type(&self) -> Option<DocumentType> {
        self.extracted.as_ref().and_then(|e| e.document_type)
    }

    pub fn confidence(&self) -> Option<Confidence> {
        self.extracted.as_ref().and_then(|e| e.confidence)
    }
}

/// 待上传的原始文件
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// 按扩展名推断 MIME 类型
    pub fn content_type(&self) -> &'static str {
        let lower = self.filename.to_lowercase();
        if lower.ends_with(".pdf") {
            "application/pdf"
        } else if lower.ends_with(".docx") {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        } else {
            "application/octet-stream"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracted_data_tolerates_partial_payload() {
        let data: ExtractedData = serde_json::from_str(
            r#"{"document_type":"Packing List","supplier":"Tata Steel","confidence":"medium"}"#,
        )
        .unwrap();
        assert_eq!(data.document_type, Some(DocumentType::PackingList));
        assert_eq!(data.confidence, Some(Confidence::Medium));
        assert!(data.total_amount.is_none());
        assert!(data.line_items.is_empty());
    }

    #[test]
    fn unknown_document_type_maps_to_other() {
        let data: ExtractedData =
            serde_json::from_str(r#"{"document_type":"Delivery Note"}"#).unwrap();
        assert_eq!(data.document_type, Some(DocumentType::Other));
    }

    #[test]
    fn content_type_follows_extension() {
        assert_eq!(UploadFile::new("a.PDF", vec![]).content_type(), "application/pdf");
        assert!(UploadFile::new("b.docx", vec![]).content_type().contains("wordprocessingml"));
    }
}
