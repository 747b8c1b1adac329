use thiserror::Error;

use crate::models::{DocumentId, PipelineStage};

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 状态查询错误
    #[error("状态查询错误: {0}")]
    Poll(#[from] PollError),
    /// API 调用错误
    #[error("API错误: {0}")]
    Api(#[from] ApiError),
    /// 流水线状态机错误
    #[error("流水线错误: {0}")]
    Pipeline(#[from] PipelineError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
}

/// 单次状态查询的错误
///
/// 除 `NotFound` 外都属于瞬时错误：计入该文档的尝试次数，下一轮继续轮询。
#[derive(Debug, Error)]
pub enum PollError {
    /// 网络层失败（连接失败、超时等）
    #[error("状态查询请求失败 (文档 {document_id}): {source}")]
    Transport {
        document_id: DocumentId,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 服务端返回非成功状态码
    #[error("状态查询返回错误响应 (文档 {document_id}): HTTP {status}, {detail}")]
    BadResponse {
        document_id: DocumentId,
        status: u16,
        detail: String,
    },
    /// 响应体无法解析，或包含未知的状态标签
    #[error("状态响应格式错误 (文档 {document_id}): {reason}")]
    Malformed {
        document_id: DocumentId,
        reason: String,
    },
    /// 远端明确表示文档不存在
    #[error("文档不存在: {document_id}")]
    NotFound { document_id: DocumentId },
}

impl PollError {
    /// 是否为永久性错误（不再重试）
    pub fn is_permanent(&self) -> bool {
        matches!(self, PollError::NotFound { .. })
    }

    pub fn document_id(&self) -> &DocumentId {
        match self {
            PollError::Transport { document_id, .. }
            | PollError::BadResponse { document_id, .. }
            | PollError::Malformed { document_id, .. }
            | PollError::NotFound { document_id } => document_id,
        }
    }
}

/// API 调用错误（上传、列表、审批等非轮询请求）
#[derive(Debug, Error)]
pub enum ApiError {
    /// 网络请求失败
    #[error("API请求失败 ({endpoint}): {source}")]
    RequestFailed {
        endpoint: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// API 返回错误响应
    #[error("API返回错误响应 ({endpoint}): code={code:?}, message={message:?}")]
    BadResponse {
        endpoint: String,
        code: Option<u16>,
        message: Option<String>,
    },
    /// 上传返回的 ID 数量与提交的文件数量不一致
    #[error("上传结果数量不匹配: 提交 {expected} 个文件, 返回 {actual} 个ID")]
    UploadMismatch { expected: usize, actual: usize },
    /// JSON 解析失败
    #[error("JSON解析失败: {source}")]
    JsonParseFailed {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 客户端构建失败
    #[error("HTTP客户端初始化失败: {source}")]
    ClientBuildFailed {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// 流水线状态机错误
#[derive(Debug, Error)]
pub enum PipelineError {
    /// 非相邻阶段跳转
    #[error("非法阶段跳转: {from} -> {to}")]
    InvalidTransition { from: u8, to: u8 },
    /// 已有推进操作在进行中
    #[error("阶段推进正在进行中 (当前阶段: {stage})")]
    AdvanceInProgress { stage: PipelineStage },
    /// 推进被取消，阶段保持不变
    #[error("阶段推进已取消 (当前阶段: {stage})")]
    Cancelled { stage: PipelineStage },
    /// 批次不存在
    #[error("批次不存在: {0}")]
    UnknownBatch(u64),
    /// 文档不属于该批次
    #[error("文档不属于该批次: {0}")]
    UnknownDocument(DocumentId),
    /// 空批次
    #[error("批次中没有任何文档")]
    EmptyBatch,
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 目录不存在
    #[error("目录不存在: {path}")]
    DirectoryNotFound { path: String },
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 写入文件失败
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置文件读取失败
    #[error("无法读取配置文件 {path}: {source}")]
    FileReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("配置文件 {path} 解析失败: {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

// ========== 从常见错误类型转换 ==========

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::JsonParseFailed {
            source: Box::new(err),
        }
    }
}

// ========== 便捷构造函数 ==========

impl PollError {
    /// 创建网络层错误
    pub fn transport(
        document_id: impl Into<DocumentId>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        PollError::Transport {
            document_id: document_id.into(),
            source: Box::new(source),
        }
    }

    /// 创建响应格式错误
    pub fn malformed(document_id: impl Into<DocumentId>, reason: impl Into<String>) -> Self {
        PollError::Malformed {
            document_id: document_id.into(),
            reason: reason.into(),
        }
    }
}

impl ApiError {
    /// 创建API请求失败错误
    pub fn request_failed(
        endpoint: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ApiError::RequestFailed {
            endpoint: endpoint.into(),
            source: Box::new(source),
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
