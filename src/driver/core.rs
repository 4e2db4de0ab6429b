use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::trace;

use crate::common::{
    Clock, Result, SchedulerConfig, SchedulerError, SchedulerPhase, SchedulerStats,
};
use crate::driver::{PacemakerEvent, TaskPacemaker};
use crate::policy::WakePolicy;
use crate::queue::{TaskEntry, TimerQueue};

/// 错误上报回调
///
/// 任务回调返回 `Err` 或发生 Panic 时，在派发边界被捕获后交给它。
/// 参数: (任务 ID, 错误)。默认实现走 `tracing::error!`。
pub type ErrorSink = Arc<dyn Fn(&str, &anyhow::Error) + Send + Sync>;

/// 驱动器 Inner 结构体
pub(crate) struct DriverInner {
    /// 时间线 (唯一的共享可变域)
    pub(crate) queue: TimerQueue,
    /// 单调时钟 (可注入，测试用)
    pub(crate) clock: Arc<dyn Clock>,
    /// 全局配置
    pub(crate) config: SchedulerConfig,
    /// 调度器阶段 (Created/Running/Stopping/Stopped)
    pub(crate) phase: AtomicU8,
    /// 错误上报回调
    error_sink: ErrorSink,
    /// 成功执行计数
    completed: AtomicU64,
    /// 失败执行计数 (Err + Panic)
    failed: AtomicU64,
}

/// 任务驱动器 (The Engine)
///
/// 拥有 Worker 池的全部运行逻辑: 等待 (Pacemaker)、取任务、执行、结算。
pub(crate) struct TaskDriver {
    inner: Arc<DriverInner>,
}

impl Clone for TaskDriver {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl TaskDriver {
    pub(crate) fn new(config: SchedulerConfig, clock: Arc<dyn Clock>, error_sink: ErrorSink) -> Self {
        let queue = TimerQueue::new(config.policy.duplicate_allowed);
        Self {
            inner: Arc::new(DriverInner {
                queue,
                clock,
                config,
                phase: AtomicU8::new(SchedulerPhase::Created as u8),
                error_sink,
                completed: AtomicU64::new(0),
                failed: AtomicU64::new(0),
            }),
        }
    }

    pub(crate) fn queue(&self) -> &TimerQueue {
        &self.inner.queue
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        &*self.inner.clock
    }

    pub(crate) fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    // ==========================================
    // 阶段管理 (Phase)
    // ==========================================

    pub(crate) fn phase(&self) -> SchedulerPhase {
        SchedulerPhase::from_u8(self.inner.phase.load(Ordering::Acquire))
    }

    /// CAS 推进阶段，成功返回 true
    pub(crate) fn advance_phase(&self, from: SchedulerPhase, to: SchedulerPhase) -> bool {
        self.inner
            .phase
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn set_phase(&self, phase: SchedulerPhase) {
        self.inner.phase.store(phase as u8, Ordering::Release);
    }

    // ==========================================
    // Worker 池
    // ==========================================

    /// 启动固定数量的常驻 Worker 线程
    pub(crate) fn spawn_workers(&self) -> Result<Vec<JoinHandle<()>>> {
        let count = self.inner.config.worker.workers.max(1);
        trace!(workers = count, "spawning worker threads");

        let mut handles = Vec::with_capacity(count);
        for i in 0..count {
            let driver = self.clone();
            let handle = std::thread::Builder::new()
                .name(format!("kairos-worker-{i}"))
                .spawn(move || driver.worker_loop(i))
                .map_err(|e| SchedulerError::Config(format!("failed to spawn worker: {e}")))?;
            handles.push(handle);
        }
        Ok(handles)
    }

    /// Worker 主循环
    ///
    /// 职责：
    /// 1. 监听起搏器 (Pacemaker) 的信号 (Trigger/Shutdown)。
    /// 2. 原子地取走到期任务 (标记 Running)。
    /// 3. 不持任何锁执行回调。
    /// 4. 结算: 循环任务按计划触发点重排，一次性任务删除。
    fn worker_loop(&self, idx: usize) {
        trace!(worker = idx, "worker started");

        let policy = WakePolicy::new(self.inner.config.warm_up());
        let pacemaker = TaskPacemaker::new(
            &self.inner.queue,
            &self.inner.phase,
            &*self.inner.clock,
            policy,
        );

        loop {
            match pacemaker.wait_next() {
                PacemakerEvent::Shutdown => break,
                PacemakerEvent::Trigger => {}
            }

            // Worker 之间对称竞争，取不到说明别人抢先了，回去继续等
            let Some(entry) = self.inner.queue.pop_due(self.inner.clock.now()) else {
                continue;
            };
            self.execute(entry);
        }

        trace!(worker = idx, "worker exited");
    }

    // ==========================================
    // Core Logic: 执行逻辑
    // ==========================================

    /// 执行任务回调并结算
    ///
    /// 回调的 `Err` 和 Panic 都在这里被捕获: 上报错误回调、计数，
    /// 不影响 Worker 本身，也不影响循环任务的下一次触发。
    /// 失败只上报一次，由错误回调负责记录 (默认实现走 `tracing::error!`)。
    fn execute(&self, mut entry: TaskEntry) {
        let job = &mut entry.job;
        let result = catch_unwind(AssertUnwindSafe(|| (job)()));

        let outcome = match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(panic_err) => {
                let msg = if let Some(s) = panic_err.downcast_ref::<&str>() {
                    format!("Panic: {s}")
                } else if let Some(s) = panic_err.downcast_ref::<String>() {
                    format!("Panic: {s}")
                } else {
                    "Panic: Unknown error".to_string()
                };
                Err(anyhow::anyhow!(msg))
            }
        };

        match outcome {
            Ok(()) => {
                self.inner.completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.inner.failed.fetch_add(1, Ordering::Relaxed);
                (self.inner.error_sink)(&entry.id, &e);
            }
        }

        // 停机期间不再重排 (本周期视为已完成)
        let allow_reschedule = self.phase() == SchedulerPhase::Running;
        self.inner.queue.complete(entry, allow_reschedule);
    }

    // ==========================================
    // 停机与统计
    // ==========================================

    /// 触发停机
    ///
    /// 停机是最高优先级的唤醒原因: 置位阶段后短暂过一下时间线锁再
    /// notify_all + 推进 epoch，保证睡眠和自旋中的 Worker 都立刻退出。
    pub(crate) fn shutdown(&self) {
        trace!("shutdown triggered");
        drop(self.inner.queue.state.lock());
        self.inner.queue.bump_epoch();
        self.inner.queue.cond.notify_all();
    }

    /// 运行时统计快照
    pub(crate) fn stats(&self) -> SchedulerStats {
        let (pending, running) = self.inner.queue.counts();
        SchedulerStats {
            pending_tasks: pending,
            running_tasks: running,
            completed_count: self.inner.completed.load(Ordering::Relaxed),
            failed_count: self.inner.failed.load(Ordering::Relaxed),
            skipped_count: self.inner.queue.skipped(),
            workers: self.inner.config.worker.workers,
        }
    }
}
