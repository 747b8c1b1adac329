//! 文档注册表 - 基础设施层
//!
//! 持有唯一的共享可变状态（文档记录），只暴露读写能力

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::models::{Document, DocumentId, DocumentStatus, PipelineStage, StatusRecord};

/// `put` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// 新文档
    Inserted,
    /// 覆盖了旧记录
    Updated,
    /// 观测时间早于现有记录，已丢弃
    Stale,
}

#[derive(Default)]
struct RegistryInner {
    order: Vec<DocumentId>,
    records: HashMap<DocumentId, Arc<Document>>,
}

/// 文档注册表
///
/// 职责：
/// - 保存每个文档最近一次观测到的状态
/// - 所有写入经由互斥锁串行化
/// - 以远端 `updated_at` 判定新旧，后观测者胜出
/// - 文档阶段不超过 `stage_ceiling`
/// - 不做任何 I/O
pub struct DocumentRegistry {
    inner: Mutex<RegistryInner>,
    stage_ceiling: AtomicU8,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            stage_ceiling: AtomicU8::new(PipelineStage::LAST.number()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 登记上传成功的文档（已存在则覆盖）
    pub fn insert(&self, document: Document) {
        let mut inner = self.lock();
        if !inner.records.contains_key(&document.id) {
            inner.order.push(document.id.clone());
        }
        inner.records.insert(document.id.clone(), Arc::new(document));
    }

    /// 写入一次状态观测
    ///
    /// 只有双方都带远端 `updated_at` 时才比较新旧；缺少该时间戳的观测按到达顺序生效。
    pub fn put(&self, id: &DocumentId, record: StatusRecord) -> PutOutcome {
        self.write(id, record, false)
    }

    /// 写入人工审批等权威结果，不做新旧判定
    pub fn overwrite(&self, id: &DocumentId, record: StatusRecord) -> PutOutcome {
        self.write(id, record, true)
    }

    fn write(&self, id: &DocumentId, record: StatusRecord, authoritative: bool) -> PutOutcome {
        let ceiling = self.stage_ceiling();
        let mut inner = self.lock();

        let merged = match inner.records.get(id) {
            Some(existing) => {
                if !authoritative && is_stale(existing, &record) {
                    return PutOutcome::Stale;
                }
                merge(existing, record, ceiling)
            }
            None => from_record(id, record, ceiling),
        };

        let outcome = if inner.records.contains_key(id) {
            PutOutcome::Updated
        } else {
            inner.order.push(id.clone());
            PutOutcome::Inserted
        };
        inner.records.insert(id.clone(), Arc::new(merged));
        outcome
    }

    pub fn get(&self, id: &DocumentId) -> Option<Arc<Document>> {
        self.lock().records.get(id).cloned()
    }

    /// 按插入顺序返回所有记录的快照，可重复遍历
    pub fn all(&self) -> Records {
        let inner = self.lock();
        let items: Vec<Arc<Document>> = inner
            .order
            .iter()
            .filter_map(|id| inner.records.get(id).cloned())
            .collect();
        Records {
            items: items.into(),
        }
    }

    pub fn contains(&self, id: &DocumentId) -> bool {
        self.lock().records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 设置文档可达的最高阶段
    pub fn set_stage_ceiling(&self, ceiling: u8) {
        self.stage_ceiling.store(ceiling, Ordering::SeqCst);
    }

    pub fn stage_ceiling(&self) -> u8 {
        self.stage_ceiling.load(Ordering::SeqCst)
    }
}

impl Default for DocumentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn is_stale(existing: &Document, record: &StatusRecord) -> bool {
    match (existing.remote_updated_at, record.remote_updated_at) {
        (Some(previous), Some(next)) => next < previous,
        _ => false,
    }
}

/// 阶段号与 `InStage` 的阶段同步受上限约束
fn capped(status: DocumentStatus, stage: u8) -> DocumentStatus {
    match status {
        DocumentStatus::InStage(reported) => DocumentStatus::InStage(reported.min(stage)),
        other => other,
    }
}

/// 文件名和大小在上传时确定，之后不再改变；抽取结果一旦出现不会被空值覆盖
fn merge(existing: &Document, record: StatusRecord, ceiling: u8) -> Document {
    let stage = existing.stage.max(record.stage.min(ceiling));
    Document {
        id: existing.id.clone(),
        filename: if existing.filename.is_empty() {
            record.filename.unwrap_or_default()
        } else {
            existing.filename.clone()
        },
        size_bytes: if existing.size_bytes == 0 {
            record.size_bytes.unwrap_or_default()
        } else {
            existing.size_bytes
        },
        stage,
        status: capped(record.status, stage),
        remote_state: record.remote_state,
        progress: record.progress,
        extracted: record.extracted.or_else(|| existing.extracted.clone()),
        created_at: existing.created_at.or(record.created_at),
        last_updated: Some(record.last_updated),
        remote_updated_at: record.remote_updated_at.or(existing.remote_updated_at),
    }
}

fn from_record(id: &DocumentId, record: StatusRecord, ceiling: u8) -> Document {
    let stage = record.stage.min(ceiling).max(PipelineStage::FIRST.number());
    Document {
        id: id.clone(),
        filename: record.filename.unwrap_or_default(),
        size_bytes: record.size_bytes.unwrap_or_default(),
        stage,
        status: capped(record.status, stage),
        remote_state: record.remote_state,
        progress: record.progress,
        extracted: record.extracted,
        created_at: record.created_at,
        last_updated: Some(record.last_updated),
        remote_updated_at: record.remote_updated_at,
    }
}

/// 注册表快照
#[derive(Debug, Clone)]
pub struct Records {
    items: Arc<[Arc<Document>]>,
}

impl Records {
    pub fn iter(&self) -> impl Iterator<Item = &Document> + '_ {
        self.items.iter().map(|doc| doc.as_ref())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn to_vec(&self) -> Vec<Document> {
        self.iter().cloned().collect()
    }
}

impl<'a> IntoIterator for &'a Records {
    type Item = &'a Document;
    type IntoIter = Box<dyn Iterator<Item = &'a Document> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RemoteState;
    use chrono::{Duration, TimeZone, Utc};

    fn record(id: &str, status: DocumentStatus, stage: u8, secs: i64) -> StatusRecord {
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs);
        StatusRecord {
            id: id.into(),
            filename: Some("remote-name.pdf".to_string()),
            size_bytes: Some(99),
            remote_state: match status {
                DocumentStatus::Completed => RemoteState::Completed,
                DocumentStatus::Error(_) => RemoteState::Error,
                _ => RemoteState::Parsing,
            },
            status,
            stage,
            progress: 50,
            extracted: None,
            created_at: None,
            remote_updated_at: Some(at),
            last_updated: at,
        }
    }

    fn unstamped(id: &str, status: DocumentStatus, stage: u8) -> StatusRecord {
        StatusRecord {
            remote_updated_at: None,
            ..record(id, status, stage, 0)
        }
    }

    #[test]
    fn all_preserves_insertion_order_and_is_restartable() {
        let registry = DocumentRegistry::new();
        for name in ["c", "a", "b"] {
            registry.insert(Document::uploaded(name.into(), format!("{name}.pdf"), 10));
        }
        registry.put(&"a".into(), record("a", DocumentStatus::Completed, 2, 1));

        let records = registry.all();
        let first: Vec<_> = records.iter().map(|d| d.id.to_string()).collect();
        let second: Vec<_> = (&records).into_iter().map(|d| d.id.to_string()).collect();
        assert_eq!(first, vec!["c", "a", "b"]);
        assert_eq!(first, second);
    }

    #[test]
    fn intake_metadata_survives_status_updates() {
        let registry = DocumentRegistry::new();
        registry.insert(Document::uploaded("a".into(), "po-1.pdf", 1024));
        let outcome = registry.put(&"a".into(), record("a", DocumentStatus::InStage(2), 2, 0));
        assert_eq!(outcome, PutOutcome::Updated);

        let doc = registry.get(&"a".into()).unwrap();
        assert_eq!(doc.filename, "po-1.pdf");
        assert_eq!(doc.size_bytes, 1024);
        assert_eq!(doc.status, DocumentStatus::InStage(2));
    }

    #[test]
    fn stale_observation_is_discarded() {
        let registry = DocumentRegistry::new();
        let id: DocumentId = "a".into();
        registry.put(&id, record("a", DocumentStatus::Completed, 2, 10));
        let outcome = registry.put(&id, record("a", DocumentStatus::InStage(2), 2, 5));
        assert_eq!(outcome, PutOutcome::Stale);
        assert_eq!(registry.get(&id).unwrap().status, DocumentStatus::Completed);
    }

    #[test]
    fn observation_without_remote_timestamp_is_applied() {
        let registry = DocumentRegistry::new();
        let id: DocumentId = "a".into();
        registry.put(&id, record("a", DocumentStatus::InStage(2), 2, 300));
        let outcome = registry.put(&id, unstamped("a", DocumentStatus::Completed, 2));
        assert_eq!(outcome, PutOutcome::Updated);

        let doc = registry.get(&id).unwrap();
        assert_eq!(doc.status, DocumentStatus::Completed);
        // 远端时间水位保留，之后更旧的带时间戳观测仍被丢弃
        let late = registry.put(&id, record("a", DocumentStatus::InStage(2), 2, 100));
        assert_eq!(late, PutOutcome::Stale);
    }

    #[test]
    fn overwrite_ignores_ordering() {
        let registry = DocumentRegistry::new();
        let id: DocumentId = "a".into();
        registry.put(&id, record("a", DocumentStatus::Error("price variance".into()), 2, 10));

        let outcome = registry.overwrite(&id, record("a", DocumentStatus::Completed, 2, 1));
        assert_eq!(outcome, PutOutcome::Updated);
        assert_eq!(registry.get(&id).unwrap().status, DocumentStatus::Completed);
    }

    #[test]
    fn stage_is_monotonic_and_capped() {
        let registry = DocumentRegistry::new();
        let id: DocumentId = "a".into();
        registry.set_stage_ceiling(2);
        registry.put(&id, record("a", DocumentStatus::InStage(4), 4, 1));
        let doc = registry.get(&id).unwrap();
        assert_eq!(doc.stage, 2);
        assert_eq!(doc.status, DocumentStatus::InStage(2));

        registry.set_stage_ceiling(5);
        registry.put(&id, record("a", DocumentStatus::InStage(4), 4, 2));
        registry.put(&id, record("a", DocumentStatus::InStage(3), 3, 3));
        assert_eq!(registry.get(&id).unwrap().stage, 4);
    }

    #[test]
    fn concurrent_writers_never_tear_records() {
        let registry = Arc::new(DocumentRegistry::new());
        let id: DocumentId = "a".into();
        registry.insert(Document::uploaded(id.clone(), "a.pdf", 1));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let registry = registry.clone();
                let id = id.clone();
                std::thread::spawn(move || {
                    let status = if i % 2 == 0 {
                        DocumentStatus::Completed
                    } else {
                        DocumentStatus::Error(format!("observation {i}"))
                    };
                    registry.put(&id, record("a", status, 2, i));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let doc = registry.get(&id).unwrap();
        assert_eq!(doc.status, DocumentStatus::Error("observation 15".to_string()));
        assert_eq!(doc.remote_state, RemoteState::Error);
        assert_eq!(
            doc.last_updated.unwrap(),
            Utc.timestamp_opt(1_700_000_015, 0).unwrap()
        );
    }
}
