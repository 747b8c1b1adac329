//! 批次轮询协调器 - 编排层
//!
//! ## 职责
//!
//! 对一组文档按"轮"并发轮询，直到每个文档满足终态判定或用完尝试次数。
//!
//! ## 轮询规则
//!
//! 1. 每轮对所有待定文档各发一次查询（并发），结果到达即写入注册表
//! 2. 满足判定条件的文档移出待定集合，计入 `completed`（包括远端报告的 Error）
//! 3. 远端明确返回"不存在"的文档移出待定集合，计入 `failed`
//! 4. 其余情况（处理中、网络错误、响应格式错误）计一次尝试；
//!    尝试次数超过上限的文档计入 `timed_out`
//! 5. 两轮之间等待 `interval`；轮与轮严格串行
//!
//! 等待本轮结果和轮间休眠这两处都响应取消信号。

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::infrastructure::{DocumentRegistry, PutOutcome};
use crate::models::DocumentId;
use crate::services::{PollOutcome, StatusPoller};
use crate::workflow::{PollAttempt, PollCtx, TerminalPredicate};

/// 轮询参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveOptions {
    pub interval: Duration,
    /// 每个文档允许的非终态观测次数
    pub max_attempts: u32,
}

impl DriveOptions {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.poll_interval(), config.max_poll_attempts)
    }
}

/// 一次 drive 的结果汇总
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriveReport {
    /// 满足判定条件（含远端报告 Error 的文档）
    pub completed: Vec<DocumentId>,
    /// 远端不存在
    pub failed: Vec<DocumentId>,
    /// 用完尝试次数仍未满足判定条件
    pub timed_out: Vec<DocumentId>,
    /// 实际执行的轮数
    pub rounds: u32,
    /// 实际发出的查询数
    pub polls: u32,
}

impl DriveReport {
    /// 没有失败也没有超时
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.timed_out.is_empty()
    }

    pub fn total(&self) -> usize {
        self.completed.len() + self.failed.len() + self.timed_out.len()
    }
}

/// drive 的最终结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriveResult {
    /// 所有文档都已有结论
    Settled(DriveReport),
    /// 收到取消信号；附带取消前已得出的部分结论
    Cancelled(DriveReport),
}

impl DriveResult {
    pub fn report(&self) -> &DriveReport {
        match self {
            DriveResult::Settled(report) | DriveResult::Cancelled(report) => report,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DriveResult::Cancelled(_))
    }
}

/// 单个文档本次观测后的去向
enum Verdict {
    Satisfied,
    Missing,
    Pending,
}

/// 批次轮询协调器
///
/// 职责：
/// - 管理待定集合与每个文档的尝试计数
/// - 不关心阶段跳转（属于 StageController）
/// - 注册表是唯一的写入目标
pub struct BatchPollCoordinator {
    poller: StatusPoller,
    registry: Arc<DocumentRegistry>,
}

impl BatchPollCoordinator {
    pub fn new(poller: StatusPoller, registry: Arc<DocumentRegistry>) -> Self {
        Self { poller, registry }
    }

    pub fn registry(&self) -> &Arc<DocumentRegistry> {
        &self.registry
    }

    /// 轮询 `ids` 直到每个文档都有结论，或收到取消信号
    ///
    /// 开始前已满足判定条件的文档直接计入 `completed`，不再查询
    ///
    /// # 参数
    /// - `ids`: 待轮询的文档ID（重复项只查一次）
    /// - `predicate`: 离开当前阶段的判定条件
    /// - `options`: 轮询间隔与单文档查询上限
    /// - `cancel`: 取消信号
    /// - `ctx`: 日志上下文
    ///
    /// # 返回
    /// 返回 `Settled(report)`，或在取消时返回已得到的部分结论 `Cancelled(report)`
    pub async fn drive(
        &self,
        ids: &[DocumentId],
        predicate: &TerminalPredicate,
        options: DriveOptions,
        cancel: &CancellationToken,
        mut ctx: PollCtx,
    ) -> DriveResult {
        let mut report = DriveReport::default();
        let mut attempts: HashMap<DocumentId, u32> = HashMap::new();
        let mut seen = HashSet::new();
        let mut pending = Vec::new();

        for id in ids {
            if !seen.insert(id.clone()) {
                continue;
            }
            if self.is_satisfied(id, predicate) {
                report.completed.push(id.clone());
            } else {
                pending.push(id.clone());
            }
        }

        info!(
            "{} 开始轮询: 待定 {} 个, 已满足 {} 个 (判定: {})",
            ctx,
            pending.len(),
            report.completed.len(),
            predicate.name()
        );

        while !pending.is_empty() {
            if cancel.is_cancelled() {
                warn!("{} ⚠️ 已取消，剩余 {} 个文档未轮询", ctx, pending.len());
                return DriveResult::Cancelled(report);
            }

            ctx.next_round();
            report.rounds += 1;
            report.polls += pending.len() as u32;
            debug!("{} 查询 {} 个文档", ctx, pending.len());

            let mut tasks = JoinSet::new();
            for id in &pending {
                let attempt_number = attempts.get(id).copied().unwrap_or(0) + 1;
                let poller = self.poller.clone();
                let id = id.clone();
                tasks.spawn(async move {
                    let result = poller.poll(&id).await.map(PollOutcome::into_record);
                    PollAttempt {
                        document_id: id,
                        attempt_number,
                        observed_at: Utc::now(),
                        result,
                    }
                });
            }

            let mut unresolved: HashSet<DocumentId> = pending.iter().cloned().collect();
            let mut still_pending = HashSet::new();

            loop {
                let joined = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        warn!("{} ⚠️ 已取消，放弃 {} 个进行中的查询", ctx, tasks.len());
                        tasks.abort_all();
                        return DriveResult::Cancelled(report);
                    }
                    joined = tasks.join_next() => joined,
                };

                let Some(joined) = joined else {
                    break;
                };

                let attempt = match joined {
                    Ok(attempt) => attempt,
                    Err(e) => {
                        error!("{} ❌ 查询任务异常退出: {}", ctx, e);
                        continue;
                    }
                };

                let id = attempt.document_id.clone();
                unresolved.remove(&id);

                match self.settle(attempt, predicate) {
                    Verdict::Satisfied => report.completed.push(id),
                    Verdict::Missing => report.failed.push(id),
                    Verdict::Pending => {
                        if exhausted(&mut attempts, &id, options.max_attempts) {
                            warn!("[文档 {}] ⏱️ 超过最大尝试次数 {}", id, options.max_attempts);
                            report.timed_out.push(id);
                        } else {
                            still_pending.insert(id);
                        }
                    }
                }
            }

            // 异常退出的任务没有结果，按一次失败的观测计
            for id in unresolved {
                if exhausted(&mut attempts, &id, options.max_attempts) {
                    report.timed_out.push(id);
                } else {
                    still_pending.insert(id);
                }
            }

            pending.retain(|id| still_pending.contains(id));

            if pending.is_empty() {
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("{} ⚠️ 轮间等待时已取消，剩余 {} 个文档", ctx, pending.len());
                    return DriveResult::Cancelled(report);
                }
                _ = tokio::time::sleep(options.interval) => {}
            }
        }

        info!(
            "{} ✓ 轮询结束: 完成 {} | 失败 {} | 超时 {} | 共 {} 次查询",
            ctx,
            report.completed.len(),
            report.failed.len(),
            report.timed_out.len(),
            report.polls
        );

        DriveResult::Settled(report)
    }

    fn is_satisfied(&self, id: &DocumentId, predicate: &TerminalPredicate) -> bool {
        self.registry
            .get(id)
            .is_some_and(|doc| predicate.is_satisfied(&doc))
    }

    /// 把一次观测写入注册表并给出结论
    fn settle(&self, attempt: PollAttempt, predicate: &TerminalPredicate) -> Verdict {
        let id = attempt.document_id;

        match attempt.result {
            Ok(record) => {
                if self.registry.put(&id, record) == PutOutcome::Stale {
                    debug!("[文档 {}] 丢弃过期的观测 (第 {} 次)", id, attempt.attempt_number);
                }
                if self.is_satisfied(&id, predicate) {
                    Verdict::Satisfied
                } else {
                    Verdict::Pending
                }
            }
            Err(e) if e.is_permanent() => {
                warn!("[文档 {}] ❌ {}", id, e);
                Verdict::Missing
            }
            Err(e) => {
                warn!(
                    "[文档 {}] 第 {} 次查询失败 ({}): {}",
                    id,
                    attempt.attempt_number,
                    attempt.observed_at.format("%H:%M:%S"),
                    e
                );
                Verdict::Pending
            }
        }
    }
}

/// 计一次非终态观测，返回是否已超过上限
fn exhausted(attempts: &mut HashMap<DocumentId, u32>, id: &DocumentId, max_attempts: u32) -> bool {
    let count = attempts.entry(id.clone()).or_insert(0);
    *count += 1;
    *count > max_attempts
}
