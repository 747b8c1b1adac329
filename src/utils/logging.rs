use anyhow::Result;
/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use std::fs::{self, OpenOptions};
use std::io::Write;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::models::{ExceptionEntry, PipelineStage};
use crate::orchestrator::{AdvanceReport, BatchHandle};
use crate::services::{ExceptionAlert, MetricsSummary};

/// 初始化 tracing 订阅器
///
/// `RUST_LOG` 优先；否则按 `verbose` 选择 debug 或 info 级别
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("supply_chain_pipeline={}", default_level)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 初始化日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
pub fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\n单据流水线运行日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)?;
    Ok(())
}

/// 向日志文件追加内容
///
/// # 参数
/// - `log_file_path`: 日志文件路径
/// - `content`: 追加的内容
pub fn append_log(log_file_path: &str, content: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 供应链单据流水线");
    info!("🌐 服务地址: {}", config.api_base_url);
    info!(
        "⏱️ 轮询间隔: {}ms | 最大尝试次数: {}",
        config.poll_interval_ms, config.max_poll_attempts
    );
    info!("{}", "=".repeat(60));
}

/// 记录单据加载信息
pub fn log_files_loaded(total: usize, folder: &str) {
    info!("✓ 在 {} 中找到 {} 个待上传的单据", folder, total);
}

/// 记录阶段开始信息
pub fn log_stage_start(handle: BatchHandle, from: PipelineStage, to: PipelineStage) {
    info!("\n{}", "=".repeat(60));
    info!("📦 [批次 {}] 推进阶段: {} → {}", handle, from, to);
    info!("{}", "=".repeat(60));
}

/// 记录阶段完成信息
pub fn log_stage_complete(handle: BatchHandle, report: &AdvanceReport) {
    info!("\n{}", "─".repeat(60));
    match &report.drive {
        Some(drive) => info!(
            "✓ [批次 {}] 阶段 {} 完成: 完成 {} | 失败 {} | 超时 {} | {} 轮 {} 次查询",
            handle,
            report.from,
            drive.completed.len(),
            drive.failed.len(),
            drive.timed_out.len(),
            drive.rounds,
            drive.polls
        ),
        None => info!("✓ [批次 {}] 阶段 {} 无需轮询", handle, report.from),
    }
    for entry in &report.partial_failures {
        info!("  ⚠️ [文档 {}] {}", entry.id, entry.kind);
    }
    info!("{}", "─".repeat(60));
}

/// 将最终统计格式化为日志文件内容
pub fn format_final_stats(metrics: &MetricsSummary, exceptions: &[ExceptionEntry]) -> String {
    format!(
        "\n{}\n完成时间: {}\n文档总数: {}\n已处理: {}\n待复核: {}\n异常: {}\n自动通过率: {:.1}%\n已批准金额: {:.2}\n风险金额: {:.2}\n异常桶: {} 条\n{}\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        metrics.total_documents,
        metrics.processed_count,
        metrics.in_review_count,
        metrics.exception_count,
        metrics.auto_approval_rate,
        metrics.approved_value,
        metrics.at_risk_value,
        exceptions.len(),
        "=".repeat(60)
    )
}

/// 打印最终统计信息
pub fn print_final_metrics(
    metrics: &MetricsSummary,
    alerts: &[ExceptionAlert],
    config: &Config,
) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!(
        "✅ 已处理: {}/{} (自动通过率 {:.1}%)",
        metrics.processed_count, metrics.total_documents, metrics.auto_approval_rate
    );
    info!("🔍 待关注: {}", metrics.needs_attention_count);
    info!("❌ 异常: {}", metrics.exception_count);
    info!("💰 已批准金额: {:.2}", metrics.approved_value);
    info!("⚠️ 风险金额: {:.2}", metrics.at_risk_value);
    for alert in alerts.iter().filter(|a| !a.resolved) {
        info!(
            "  [{:?}] [文档 {}] {} - {}",
            alert.severity,
            alert.id,
            alert.supplier,
            truncate_text(&alert.issue, 40)
        );
    }
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", config.output_log_file);
    info!("异常单据已写入: {}", config.exception_file);
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
