use crate::error::FileError;
use crate::models::document::UploadFile;
use anyhow::{Context, Result};
use futures::stream::{self, StreamExt, TryStreamExt};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tokio::fs;

/// 同时读取的文件数
const READ_CONCURRENCY: usize = 8;

fn supported_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)\.(pdf|docx)$").ok())
        .as_ref()
}

/// 是否为可接收的单据格式（PDF / DOCX）
pub fn is_supported_document(filename: &str) -> bool {
    supported_pattern().is_some_and(|re| re.is_match(filename))
}

/// 读取单个文件为待上传对象
pub async fn load_upload_file(path: &Path) -> Result<UploadFile> {
    let bytes = fs::read(path)
        .await
        .map_err(|source| FileError::ReadFailed {
            path: path.display().to_string(),
            source,
        })?;

    let filename = path
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();

    Ok(UploadFile::new(filename, bytes))
}

/// 扫描文件夹，加载所有 PDF / DOCX 文件
///
/// 不支持的文件会被跳过并记录日志。返回结果按文件名排序，保证上传顺序稳定。
pub async fn load_upload_files(folder_path: &str) -> Result<Vec<UploadFile>> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        return Err(FileError::DirectoryNotFound {
            path: folder_path.to_string(),
        }
        .into());
    }

    let mut paths = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder_path))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = path.file_name().unwrap_or_default().to_string_lossy();
        if is_supported_document(&name) {
            tracing::info!("正在加载: {}", name);
            paths.push(path);
        } else {
            tracing::warn!("跳过不支持的文件: {}", name);
        }
    }

    paths.sort();

    let files: Vec<UploadFile> = stream::iter(paths)
        .map(|path| async move { load_upload_file(&path).await })
        .buffered(READ_CONCURRENCY)
        .try_collect()
        .await?;

    tracing::info!("成功加载 {} 个单据文件", files.len());
    Ok(files)
}
