use std::sync::Arc;
use std::time::Duration;

use tracing::error;

use crate::common::{Clock, Result, SchedulerConfig, SchedulerError, SystemClock};
use crate::driver::{ErrorSink, TaskDriver};
use crate::scheduler::TaskScheduler;

/// 调度器构建器
///
/// 用于一步步配置并生成 TaskScheduler 实例。
/// 时钟和错误回调都是显式注入的依赖，核心里没有任何进程级单例。
pub struct SchedulerBuilder {
    /// 全局配置
    config: SchedulerConfig,
    /// 单调时钟 (默认 SystemClock；测试可注入 Mock)
    clock: Arc<dyn Clock>,
    /// 错误上报回调 (默认走 tracing)
    error_sink: Option<ErrorSink>,
}

impl SchedulerBuilder {
    pub fn new() -> Self {
        Self {
            config: SchedulerConfig::default(),
            clock: Arc::new(SystemClock),
            error_sink: None,
        }
    }

    /// [可选] 整体替换配置
    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// [可选] 设置 Worker 线程数
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.worker.workers = workers;
        self
    }

    /// [可选] 设置预热时长 (0 = 纯睡眠模式)
    pub fn warm_up(mut self, warm: Duration) -> Self {
        self.config.policy.warm_up_ms = warm.as_millis() as u64;
        self
    }

    /// [可选] 注入自定义时钟
    pub fn clock<C: Clock>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// [可选] 注入错误上报回调
    ///
    /// 任务回调的 `Err` / Panic 在派发边界被捕获后交给它，
    /// 绝不会跨 Worker 边界向外传播。
    pub fn on_error<F>(mut self, sink: F) -> Self
    where
        F: Fn(&str, &anyhow::Error) + Send + Sync + 'static,
    {
        self.error_sink = Some(Arc::new(sink));
        self
    }

    /// [核心] 构建调度器
    ///
    /// 这里完成所有组件的组装: Config + Clock + ErrorSink -> Driver -> Scheduler。
    /// 零线程配置在这里被拦下 (致命配置错误)。
    pub fn build(self) -> Result<TaskScheduler> {
        if self.config.worker.workers == 0 {
            return Err(SchedulerError::Config(
                "worker count must be at least 1".to_string(),
            ));
        }

        let sink: ErrorSink = self.error_sink.unwrap_or_else(|| {
            Arc::new(|task_id: &str, err: &anyhow::Error| {
                error!(task_id = %task_id, error = %err, "unhandled task failure");
            })
        });

        let driver = TaskDriver::new(self.config, self.clock, sink);
        Ok(TaskScheduler::from_driver(driver))
    }
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
