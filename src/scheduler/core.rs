use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::common::{FireRule, Result, SchedulerError, SchedulerPhase, SchedulerStats};
use crate::driver::TaskDriver;
use crate::queue::Job;
use crate::scheduler::SchedulerBuilder;

/// 任务调度器 (The Public Face)
///
/// 这是用户直接交互的对象。它组合了时间线、Worker 池和唤醒控制，
/// 对外暴露注册 (`at` / `after` / `every`)、生命周期 (`start` / `stop`)、
/// 自省 (`is_scheduled` / `is_enabled` / `size`) 和变更
/// (`enable` / `disable` / `remove`) 操作。
///
/// 生命周期: `Created → Running → Stopping → Stopped`，单程，不支持重启。
/// `start()` 返回之后，所有操作都可以从任意线程并发调用。
///
/// 已知特征: 没有任务级超时 (慢回调会占住一个 Worker)，只有在耗尽
/// 整个池时才会延迟其他任务 (背压特征，不是 Bug)。
pub struct TaskScheduler {
    /// 内部核心驱动器 (引擎)
    driver: TaskDriver,
    /// Worker 线程句柄，stop/Drop 时回收
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScheduler").finish_non_exhaustive()
    }
}

impl TaskScheduler {
    /// 快捷构造: 指定线程数与预热时长，其余用默认配置
    ///
    /// `workers = 0` 是致命配置错误，构建直接失败。
    pub fn new(workers: usize, warm_up: Duration) -> Result<Self> {
        SchedulerBuilder::new().workers(workers).warm_up(warm_up).build()
    }

    /// 创建一个构建器 (注入配置 / 时钟 / 错误回调)
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    pub(crate) fn from_driver(driver: TaskDriver) -> Self {
        Self {
            driver,
            handles: Mutex::new(Vec::new()),
        }
    }

    // ==========================================
    // 1. 生命周期 (Lifecycle)
    // ==========================================

    /// 启动 Worker 池 (Created -> Running)
    ///
    /// 只能调用一次；重复 start 或停机后 start 返回 `SchedulerStopped`。
    pub fn start(&self) -> Result<()> {
        if !self
            .driver
            .advance_phase(SchedulerPhase::Created, SchedulerPhase::Running)
        {
            return Err(SchedulerError::SchedulerStopped);
        }
        let handles = self.driver.spawn_workers()?;
        *self.handles.lock() = handles;
        debug!(workers = self.driver.config().worker.workers, "scheduler started");
        Ok(())
    }

    /// 停机
    ///
    /// - `graceful = true`: 唤醒全部 Worker，等待在途回调执行完并 join 线程后返回。
    /// - `graceful = false`: 只发停机信号就返回，不再派发新任务；在途回调
    ///   不会被强行中断 ("立即" 指不再开始新任务)，线程在 Drop 时回收。
    ///
    /// 两种模式返回后 `phase()` 都是 `Stopped`。
    /// 恰好在 stop 时到期的任务可能执行也可能不执行 (时序相关，设计如此)。
    pub fn stop(&self, graceful: bool) {
        // Created 直接终止；Running 进入 Stopping；其余幂等
        if !self
            .driver
            .advance_phase(SchedulerPhase::Running, SchedulerPhase::Stopping)
        {
            self.driver
                .advance_phase(SchedulerPhase::Created, SchedulerPhase::Stopped);
        }
        self.driver.shutdown();

        if graceful {
            let handles = std::mem::take(&mut *self.handles.lock());
            for handle in handles {
                // Worker 线程不会 Panic (回调的 Panic 在派发边界就被捕获了)
                let _ = handle.join();
            }
            debug!("scheduler stopped (graceful)");
        } else {
            debug!("scheduler stop signalled (non-graceful)");
        }
        self.driver.set_phase(SchedulerPhase::Stopped);
    }

    // ==========================================
    // 2. 注册 (Registration)
    // ==========================================

    /// 在绝对时间点执行一次 (匿名 ID)
    ///
    /// 过去的时间点不报错，按"立即触发"处理。
    /// 返回任务 ID；去重策略拒绝时返回 `DuplicateTask`。
    pub fn at<F>(&self, fire_at: Instant, job: F) -> Result<String>
    where
        F: FnMut() -> anyhow::Result<()> + Send + 'static,
    {
        self.register(None, fire_at, FireRule::OneShot, Box::new(job), None)
    }

    /// 在绝对时间点执行一次 (指定 ID)
    pub fn at_as<F>(&self, id: impl Into<String>, fire_at: Instant, job: F) -> Result<String>
    where
        F: FnMut() -> anyhow::Result<()> + Send + 'static,
    {
        self.register(Some(id.into()), fire_at, FireRule::OneShot, Box::new(job), None)
    }

    /// 在绝对时间点执行一次 (指定 ID，并为本次注册覆盖去重策略)
    ///
    /// `duplicate_allowed` 只对这一次注册生效，不改变全局开关。
    pub fn at_as_with<F>(
        &self,
        id: impl Into<String>,
        fire_at: Instant,
        duplicate_allowed: bool,
        job: F,
    ) -> Result<String>
    where
        F: FnMut() -> anyhow::Result<()> + Send + 'static,
    {
        self.register(
            Some(id.into()),
            fire_at,
            FireRule::OneShot,
            Box::new(job),
            Some(duplicate_allowed),
        )
    }

    /// 延迟执行一次 (匿名 ID)，即 `at(now + delay, ...)`
    pub fn after<F>(&self, delay: Duration, job: F) -> Result<String>
    where
        F: FnMut() -> anyhow::Result<()> + Send + 'static,
    {
        let fire_at = self.driver.clock().now() + delay;
        self.register(None, fire_at, FireRule::OneShot, Box::new(job), None)
    }

    /// 延迟执行一次 (指定 ID)
    pub fn after_as<F>(&self, id: impl Into<String>, delay: Duration, job: F) -> Result<String>
    where
        F: FnMut() -> anyhow::Result<()> + Send + 'static,
    {
        let fire_at = self.driver.clock().now() + delay;
        self.register(Some(id.into()), fire_at, FireRule::OneShot, Box::new(job), None)
    }

    /// 延迟执行一次 (指定 ID，并为本次注册覆盖去重策略)
    pub fn after_as_with<F>(
        &self,
        id: impl Into<String>,
        delay: Duration,
        duplicate_allowed: bool,
        job: F,
    ) -> Result<String>
    where
        F: FnMut() -> anyhow::Result<()> + Send + 'static,
    {
        let fire_at = self.driver.clock().now() + delay;
        self.register(
            Some(id.into()),
            fire_at,
            FireRule::OneShot,
            Box::new(job),
            Some(duplicate_allowed),
        )
    }

    /// 固定间隔循环执行 (匿名 ID)
    ///
    /// 首次触发默认在 `now + interval`；配置
    /// `policy.every_fires_immediately = true` 则注册后立即触发第一次。
    /// 间隔为 0 返回 `InvalidSchedule`。
    pub fn every<F>(&self, interval: Duration, job: F) -> Result<String>
    where
        F: FnMut() -> anyhow::Result<()> + Send + 'static,
    {
        self.every_inner(None, interval, Box::new(job), None)
    }

    /// 固定间隔循环执行 (指定 ID)
    pub fn every_as<F>(&self, id: impl Into<String>, interval: Duration, job: F) -> Result<String>
    where
        F: FnMut() -> anyhow::Result<()> + Send + 'static,
    {
        self.every_inner(Some(id.into()), interval, Box::new(job), None)
    }

    /// 固定间隔循环执行 (指定 ID，并为本次注册覆盖去重策略)
    pub fn every_as_with<F>(
        &self,
        id: impl Into<String>,
        interval: Duration,
        duplicate_allowed: bool,
        job: F,
    ) -> Result<String>
    where
        F: FnMut() -> anyhow::Result<()> + Send + 'static,
    {
        self.every_inner(Some(id.into()), interval, Box::new(job), Some(duplicate_allowed))
    }

    fn every_inner(
        &self,
        id: Option<String>,
        interval: Duration,
        job: Job,
        duplicate_override: Option<bool>,
    ) -> Result<String> {
        if interval.is_zero() {
            return Err(SchedulerError::InvalidSchedule(
                "repeat interval must be non-zero".to_string(),
            ));
        }
        let now = self.driver.clock().now();
        let first_fire = if self.driver.config().policy.every_fires_immediately {
            now
        } else {
            now + interval
        };
        self.register(id, first_fire, FireRule::Every(interval), job, duplicate_override)
    }

    /// 注册的统一入口: 阶段闸门 + 入队
    fn register(
        &self,
        id: Option<String>,
        fire_at: Instant,
        rule: FireRule,
        job: Job,
        duplicate_override: Option<bool>,
    ) -> Result<String> {
        if !self.driver.phase().accepts_work() {
            return Err(SchedulerError::SchedulerStopped);
        }
        let id = self
            .driver
            .queue()
            .insert_job(id, fire_at, rule, job, duplicate_override)?;
        trace!(task_id = %id, "task registered");
        Ok(id)
    }

    // ==========================================
    // 3. 自省与变更 (Introspection & Mutation)
    // ==========================================

    /// ID 是否被追踪 (含正在执行的)
    pub fn is_scheduled(&self, id: &str) -> bool {
        self.driver.queue().contains(id)
    }

    /// ID 的匹配记录中是否至少有一条处于启用状态
    pub fn is_enabled(&self, id: &str) -> bool {
        self.driver.queue().any_enabled(id)
    }

    /// 被追踪的任务总数 (时间线上的 + 运行中的，不含已移除)
    pub fn size(&self) -> usize {
        self.driver.queue().size()
    }

    /// 启用 ID 的全部匹配记录，返回受影响条数
    pub fn enable(&self, id: &str) -> usize {
        self.driver.queue().set_enabled(id, true)
    }

    /// 禁用 ID 的全部匹配记录，返回受影响条数
    ///
    /// 禁用的任务保留时间槽: 到期时跳过回调，循环任务直接排到下一个周期，
    /// 一次性任务则被抑制掉唯一的一次执行。
    pub fn disable(&self, id: &str) -> usize {
        self.driver.queue().set_enabled(id, false)
    }

    /// 移除 ID 的全部匹配记录，返回移除条数
    ///
    /// 移除后保证不会再执行；正在执行的等本次回调返回后生效
    /// (不强制中断在途工作)。
    pub fn remove(&self, id: &str) -> usize {
        self.driver.queue().remove_by_id(id)
    }

    /// 去重策略开关，只影响后续注册
    pub fn set_duplicate_allowed(&self, allowed: bool) {
        self.driver.queue().set_duplicate_allowed(allowed);
    }

    /// 当前生命周期阶段
    pub fn phase(&self) -> SchedulerPhase {
        self.driver.phase()
    }

    /// 运行时统计快照
    pub fn stats(&self) -> SchedulerStats {
        self.driver.stats()
    }
}

impl Drop for TaskScheduler {
    /// 兜底回收: 保证没有 Worker 线程活得比调度器久
    fn drop(&mut self) {
        self.driver.set_phase(SchedulerPhase::Stopped);
        self.driver.shutdown();
        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            let _ = handle.join();
        }
    }
}
