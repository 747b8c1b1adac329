//! 异常写入服务 - 业务能力层
//!
//! 只负责"写 exceptions.txt"能力，不关心流程

use anyhow::Result;
use std::fs::OpenOptions;
use std::io::Write;
use tracing::debug;

use crate::error::FileError;
use crate::models::{Document, ExceptionEntry};

/// 异常写入服务
///
/// 职责：
/// - 将需要人工处理的单据追加写入 exceptions.txt
/// - 每次只写一条
/// - 不关心流程顺序
pub struct ExceptionWriter {
    exception_file_path: String,
}

impl ExceptionWriter {
    pub fn new() -> Self {
        Self {
            exception_file_path: "exceptions.txt".to_string(),
        }
    }

    /// 使用自定义文件路径创建
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            exception_file_path: path.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.exception_file_path
    }

    /// 写入一条异常记录
    ///
    /// `document` 为注册表中的最新记录，可能缺失（例如远端已删除）
    pub fn write(&self, entry: &ExceptionEntry, document: Option<&Document>) -> Result<()> {
        debug!(
            "写入异常: 文档 {} | 阶段 {} | {}",
            entry.id, entry.stage, entry.kind
        );

        let write_failed = |source| FileError::WriteFailed {
            path: self.exception_file_path.clone(),
            source,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.exception_file_path)
            .map_err(write_failed)?;

        let (filename, supplier, amount) = match document {
            Some(doc) => (
                doc.filename.as_str(),
                doc.supplier(),
                doc.amount()
                    .map(|a| format!("{:.2}", a))
                    .unwrap_or_else(|| "-".to_string()),
            ),
            None => ("-", "Unknown", "-".to_string()),
        };

        let line = format!(
            "文档 {} | 文件 {} | 阶段 {} | 供应商 {} | 金额 {} | {}\n",
            entry.id, filename, entry.stage, supplier, amount, entry.kind
        );

        file.write_all(line.as_bytes()).map_err(write_failed)?;

        Ok(())
    }
}

impl Default for ExceptionWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PipelineStage;

    #[test]
    fn appends_one_line_per_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exceptions.txt");
        let writer = ExceptionWriter::with_path(path.to_string_lossy());

        let doc = Document::uploaded("doc-1".into(), "invoice.pdf", 10);
        writer
            .write(
                &ExceptionEntry::timed_out("doc-1".into(), PipelineStage::Parsing),
                Some(&doc),
            )
            .unwrap();
        writer
            .write(
                &ExceptionEntry::errored("doc-2".into(), PipelineStage::Matching, "qty mismatch"),
                None,
            )
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("invoice.pdf"));
        assert!(lines[0].contains("轮询超时"));
        assert!(lines[1].contains("qty mismatch"));
    }
}
