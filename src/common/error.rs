use thiserror::Error;

/// 调度器统一结果类型
///
/// 使用此别名可以简化函数签名：`fn do_something() -> Result<()>`
pub type Result<T> = std::result::Result<T, SchedulerError>;

#[derive(Error, Debug)]
pub enum SchedulerError {
    // ==========================================
    // 1. 基础配置与启动错误 (Configuration & Startup)
    // ==========================================
    /// 配置错误
    ///
    /// - 触发场景: 构造参数校验不通过 (如 workers = 0)。
    /// - 后果: 调度器构建失败。
    /// - 处理: 检查构造参数或配置文件。
    #[error("Configuration error: {0}")]
    Config(String),

    /// 调度器已停机
    ///
    /// - 触发场景: 在调用 `stop()` 之后 (或期间)，仍有线程尝试注册新任务或再次 `start()`。
    /// - 后果: 请求被同步拒绝。调度器是单程生命周期，不支持重启。
    #[error("Scheduler is stopping or stopped, rejecting new work.")]
    SchedulerStopped,

    // ==========================================
    // 2. 注册错误 (Registration)
    // ==========================================
    /// 任务 ID 重复
    ///
    /// - 触发场景: `duplicate_allowed = false` 时，注册了一个已被追踪的 ID。
    /// - 后果: 本次注册被同步拒绝，已有任务不受影响。
    /// - 处理: 换一个 ID，或调用 `set_duplicate_allowed(true)`。
    #[error("Task id '{id}' is already scheduled and duplicates are not allowed.")]
    DuplicateTask { id: String },

    /// 调度参数非法
    ///
    /// - 触发场景: `every` 的间隔为 0 (会导致忙循环)。
    /// - 注意: 过去的时间点不报错，按"立即触发"处理 (Clamp)。
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),
}
