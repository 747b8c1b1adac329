//! 指标汇总服务 - 业务能力层
//!
//! 只读、纯函数：输入注册表快照，输出汇总指标与看板视图。
//! 金额缺失的文档不参与求和（不按 0 计）。

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Confidence, Document, DocumentId, DocumentStatus, DocumentType, RemoteState};

/// 影响金额超过此值为高风险
const HIGH_SEVERITY_THRESHOLD: f64 = 100_000.0;

/// 看板上的文档状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DisplayStatus {
    Processed,
    InReview,
    Exception,
}

/// 匹配状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MatchStatus {
    Matched,
    Partial,
    Failed,
}

/// 异常严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    fn from_impact(impact: Option<f64>) -> Self {
        match impact {
            Some(value) if value > HIGH_SEVERITY_THRESHOLD => Severity::High,
            Some(value) if value > 0.0 => Severity::Medium,
            _ => Severity::Low,
        }
    }
}

/// 单个文档的看板视图
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentView {
    pub id: DocumentId,
    pub filename: String,
    pub document_type: Option<DocumentType>,
    pub supplier: String,
    pub stage: u8,
    pub status: DisplayStatus,
    pub match_status: MatchStatus,
    /// 置信度分值：high 95，medium 75，其余 50
    pub confidence: u8,
    pub order_value: Option<f64>,
    /// 存在风险的金额（仅异常文档）
    pub financial_impact: Option<f64>,
    pub issue: String,
    pub last_updated: Option<DateTime<Utc>>,
}

impl DocumentView {
    pub fn from_document(doc: &Document) -> Self {
        let status = match doc.status {
            DocumentStatus::Completed => DisplayStatus::Processed,
            DocumentStatus::Error(_) => DisplayStatus::Exception,
            DocumentStatus::Uploaded | DocumentStatus::InStage(_) => DisplayStatus::InReview,
        };

        // 只有远端处理失败才算匹配失败；人工驳回仍按部分匹配展示
        let match_status = match (&doc.status, doc.remote_state) {
            (_, RemoteState::Error) => MatchStatus::Failed,
            (DocumentStatus::Completed, RemoteState::Completed) => MatchStatus::Matched,
            _ => MatchStatus::Partial,
        };

        let confidence = match doc.confidence() {
            Some(Confidence::High) => 95,
            Some(Confidence::Medium) => 75,
            _ => 50,
        };

        let issue = match &doc.status {
            DocumentStatus::Error(reason) => reason.clone(),
            DocumentStatus::Completed => "已核验，可付款".to_string(),
            _ => "处理中...".to_string(),
        };

        let order_value = doc.amount();

        Self {
            id: doc.id.clone(),
            filename: doc.filename.clone(),
            document_type: doc.document_type(),
            supplier: doc.supplier().to_string(),
            stage: doc.stage,
            status,
            match_status,
            confidence,
            order_value,
            financial_impact: if status == DisplayStatus::Exception {
                order_value
            } else {
                None
            },
            issue,
            last_updated: doc.last_updated,
        }
    }

    /// 无需人工介入即完成（自动匹配成功）
    pub fn is_auto_approved(&self) -> bool {
        self.status == DisplayStatus::Processed && self.match_status == MatchStatus::Matched
    }
}

/// 看板筛选条件
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    /// 按 ID 或供应商模糊匹配（不区分大小写）
    pub query: Option<String>,
    /// 为空表示不限类型
    pub document_types: Vec<DocumentType>,
    pub status: Option<DisplayStatus>,
    pub match_status: Option<MatchStatus>,
}

impl DocumentFilter {
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_document_type(mut self, document_type: DocumentType) -> Self {
        self.document_types.push(document_type);
        self
    }

    pub fn with_status(mut self, status: DisplayStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_match_status(mut self, match_status: MatchStatus) -> Self {
        self.match_status = Some(match_status);
        self
    }

    /// 已启用的筛选项数量
    pub fn active_count(&self) -> usize {
        self.document_types.len()
            + usize::from(self.status.is_some())
            + usize::from(self.match_status.is_some())
    }

    pub fn matches(&self, view: &DocumentView) -> bool {
        let matches_query = match self.query.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(query) => {
                let query = query.to_lowercase();
                view.id.as_str().to_lowercase().contains(&query)
                    || view.supplier.to_lowercase().contains(&query)
            }
        };
        let matches_type = self.document_types.is_empty()
            || view
                .document_type
                .is_some_and(|t| self.document_types.contains(&t));
        let matches_status = self.status.map_or(true, |s| s == view.status);
        let matches_match = self.match_status.map_or(true, |m| m == view.match_status);

        matches_query && matches_type && matches_status && matches_match
    }
}

/// 需要人工处理的异常提示
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExceptionAlert {
    pub id: DocumentId,
    pub supplier: String,
    pub order_value: Option<f64>,
    pub financial_impact: Option<f64>,
    pub issue: String,
    pub recommendation: &'static str,
    pub severity: Severity,
    pub resolved: bool,
}

/// 汇总指标
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub total_documents: usize,
    pub processed_count: usize,
    pub in_review_count: usize,
    pub exception_count: usize,
    /// 待复核 + 异常
    pub needs_attention_count: usize,
    pub auto_approved_count: usize,
    /// 自动通过率（百分比，0-100）
    pub auto_approval_rate: f64,
    /// 已处理文档的金额合计
    pub approved_value: f64,
    /// 异常文档的金额合计
    pub at_risk_value: f64,
    /// 处理中文档的金额合计
    pub pending_value: f64,
}

/// 指标汇总器
pub struct MetricsAggregator;

impl MetricsAggregator {
    /// 计算汇总指标；空集合返回全零
    pub fn summarize<'a>(documents: impl IntoIterator<Item = &'a Document>) -> MetricsSummary {
        let mut summary = MetricsSummary::default();

        for doc in documents {
            let view = DocumentView::from_document(doc);
            summary.total_documents += 1;

            match view.status {
                DisplayStatus::Processed => {
                    summary.processed_count += 1;
                    summary.approved_value += view.order_value.unwrap_or_default();
                }
                DisplayStatus::InReview => {
                    summary.in_review_count += 1;
                    summary.pending_value += view.order_value.unwrap_or_default();
                }
                DisplayStatus::Exception => {
                    summary.exception_count += 1;
                    summary.at_risk_value += view.financial_impact.unwrap_or_default();
                }
            }

            if view.is_auto_approved() {
                summary.auto_approved_count += 1;
            }
        }

        summary.needs_attention_count = summary.in_review_count + summary.exception_count;
        if summary.total_documents > 0 {
            summary.auto_approval_rate =
                summary.auto_approved_count as f64 * 100.0 / summary.total_documents as f64;
        }

        summary
    }

    /// 全部文档的看板视图
    pub fn views<'a>(documents: impl IntoIterator<Item = &'a Document>) -> Vec<DocumentView> {
        documents.into_iter().map(DocumentView::from_document).collect()
    }

    /// 按条件筛选后的看板视图
    pub fn filtered<'a>(
        documents: impl IntoIterator<Item = &'a Document>,
        filter: &DocumentFilter,
    ) -> Vec<DocumentView> {
        documents
            .into_iter()
            .map(DocumentView::from_document)
            .filter(|view| filter.matches(view))
            .collect()
    }

    /// 异常、匹配失败或部分匹配的文档
    pub fn exception_alerts<'a>(
        documents: impl IntoIterator<Item = &'a Document>,
    ) -> Vec<ExceptionAlert> {
        documents
            .into_iter()
            .map(DocumentView::from_document)
            .filter(|view| {
                view.status == DisplayStatus::Exception || view.match_status != MatchStatus::Matched
            })
            .map(|view| ExceptionAlert {
                recommendation: match view.match_status {
                    MatchStatus::Failed => "核查并解决匹配问题",
                    _ => "核对差异，可接受则批准",
                },
                severity: Severity::from_impact(view.financial_impact),
                resolved: view.status == DisplayStatus::Processed,
                id: view.id,
                supplier: view.supplier,
                order_value: view.order_value,
                financial_impact: view.financial_impact,
                issue: view.issue,
            })
            .collect()
    }
}
