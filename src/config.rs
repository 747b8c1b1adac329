use crate::error::ConfigError;
use serde::Deserialize;
use std::time::Duration;

/// 程序配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 抽取/匹配服务地址
    pub api_base_url: String,
    /// 两轮轮询之间的间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 每个文档允许的最大非终态观测次数
    pub max_poll_attempts: u32,
    /// 单次 HTTP 请求超时（秒）
    pub request_timeout_secs: u64,
    /// 待上传单据所在目录
    pub input_folder: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 运行日志文件
    pub output_log_file: String,
    /// 异常单据报告文件
    pub exception_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".to_string(),
            poll_interval_ms: 2000,
            max_poll_attempts: 120,
            request_timeout_secs: 30,
            input_folder: "input_docs".to_string(),
            verbose_logging: false,
            output_log_file: "output.txt".to_string(),
            exception_file: "exceptions.txt".to_string(),
        }
    }
}

impl Config {
    /// 从环境变量读取，缺失或无法解析的项使用默认值
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// 先读取 `PIPELINE_CONFIG` 指向的 TOML 文件（如果有），再用环境变量覆盖
    pub fn load() -> Result<Self, ConfigError> {
        match std::env::var("PIPELINE_CONFIG") {
            Ok(path) => Ok(Self::from_toml_file(&path)?.with_env_overrides()),
            Err(_) => Ok(Self::from_env()),
        }
    }

    /// 从 TOML 文件读取；文件中未出现的字段使用默认值
    pub fn from_toml_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadFailed {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::TomlParseFailed {
            path: path.to_string(),
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    fn with_env_overrides(self) -> Self {
        Self {
            api_base_url: std::env::var("API_BASE_URL").unwrap_or(self.api_base_url),
            poll_interval_ms: std::env::var("POLL_INTERVAL_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(self.poll_interval_ms),
            max_poll_attempts: std::env::var("MAX_POLL_ATTEMPTS").ok().and_then(|v| v.parse().ok()).unwrap_or(self.max_poll_attempts),
            request_timeout_secs: std::env::var("REQUEST_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(self.request_timeout_secs),
            input_folder: std::env::var("INPUT_FOLDER").unwrap_or(self.input_folder),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(self.verbose_logging),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(self.output_log_file),
            exception_file: std::env::var("EXCEPTION_FILE").unwrap_or(self.exception_file),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
