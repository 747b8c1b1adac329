//! 应用入口 - 编排层
//!
//! ## 职责
//!
//! 1. **应用初始化**：日志文件、HTTP 客户端、流水线编排器
//! 2. **批量加载**：扫描输入目录中的 pdf/docx 单据
//! 3. **逐阶段推进**：上传后依次推进到看板阶段
//! 4. **异常报告**：把异常桶写入 exceptions.txt
//! 5. **全局统计**：输出汇总指标
//!
//! Ctrl-C 会取消正在进行的推进，已完成的阶段和已观测的状态保留。

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::batch_poller::DriveOptions;
use super::pipeline::{BatchHandle, PipelineOrchestrator};
use crate::clients::SupplyChainClient;
use crate::config::Config;
use crate::models::{load_upload_files, UploadFile};
use crate::services::ExceptionWriter;
use crate::utils::logging;

/// 应用主结构
pub struct App {
    config: Config,
    pipeline: Arc<PipelineOrchestrator>,
    exception_writer: ExceptionWriter,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        logging::init_log_file(&config.output_log_file)
            .with_context(|| format!("无法创建日志文件 {}", config.output_log_file))?;

        logging::log_startup(&config);

        let client = Arc::new(SupplyChainClient::new(&config)?);
        let pipeline = Arc::new(PipelineOrchestrator::new(
            client.clone(),
            client,
            DriveOptions::from_config(&config),
        ));
        let exception_writer = ExceptionWriter::with_path(config.exception_file.clone());

        Ok(Self {
            config,
            pipeline,
            exception_writer,
        })
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<()> {
        let files = self.load_files().await?;

        if files.is_empty() {
            warn!("⚠️ 没有找到待处理的 pdf/docx 文件，程序结束");
            return Ok(());
        }

        logging::log_files_loaded(files.len(), &self.config.input_folder);

        let handle = self.pipeline.upload_batch(files).await?;

        let ctrl_c = self.spawn_cancel_on_ctrl_c(handle);
        let result = self.advance_all(handle).await;
        ctrl_c.abort();
        result?;

        self.write_exceptions(handle)?;
        self.report(handle)?;

        Ok(())
    }

    /// 加载待上传的单据
    async fn load_files(&self) -> Result<Vec<UploadFile>> {
        info!("\n📁 正在扫描待处理的单据...");
        load_upload_files(&self.config.input_folder).await
    }

    /// 依次推进到终态阶段
    async fn advance_all(&self, handle: BatchHandle) -> Result<()> {
        while !self.pipeline.is_complete(handle)? {
            let from = self.pipeline.current_stage(handle)?;
            if let Some(to) = from.next() {
                logging::log_stage_start(handle, from, to);
            }

            match self.pipeline.advance(handle).await {
                Ok(report) => logging::log_stage_complete(handle, &report),
                Err(e) => {
                    error!("[批次 {}] ❌ 推进失败: {}", handle, e);
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    fn spawn_cancel_on_ctrl_c(&self, handle: BatchHandle) -> tokio::task::JoinHandle<()> {
        let pipeline = self.pipeline.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("[批次 {}] 收到 Ctrl-C，正在取消...", handle);
                let _ = pipeline.cancel(handle);
            }
        })
    }

    /// 把异常桶写入异常报告
    fn write_exceptions(&self, handle: BatchHandle) -> Result<()> {
        let exceptions = self.pipeline.exceptions(handle)?;
        for entry in &exceptions {
            let document = self.pipeline.document(handle, &entry.id).ok();
            if let Err(e) = self.exception_writer.write(entry, document.as_deref()) {
                error!("[文档 {}] ❌ 写入异常报告失败: {}", entry.id, e);
            }
        }
        if !exceptions.is_empty() {
            info!(
                "📝 {} 个异常单据已写入 {}",
                exceptions.len(),
                self.exception_writer.path()
            );
        }
        Ok(())
    }

    /// 输出最终统计
    fn report(&self, handle: BatchHandle) -> Result<()> {
        let metrics = self.pipeline.metrics(handle)?;
        let exceptions = self.pipeline.exceptions(handle)?;
        let alerts = self.pipeline.exception_alerts(handle)?;

        logging::append_log(
            &self.config.output_log_file,
            &logging::format_final_stats(&metrics, &exceptions),
        )?;
        logging::print_final_metrics(&metrics, &alerts, &self.config);
        Ok(())
    }
}
