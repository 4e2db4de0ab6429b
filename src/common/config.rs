use std::time::Duration;

use serde::{Deserialize, Serialize};

// ==========================================
// 1. 资源配置 (WorkerConfig)
// ==========================================

/// 线程资源配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// 工作线程数
    ///
    /// - 说明: 常驻执行线程的数量，直接决定并发度。必须 >= 1。
    /// - 默认值: 系统逻辑核心数 (`num_cpus::get()`)
    /// - 建议: 任务普遍很短可以调小；存在慢任务时调大，防止独占线程拖慢其他任务。
    pub workers: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(), // [智能默认] 自动获取核数
        }
    }
}

// ==========================================
// 2. 策略配置 (PolicyConfig)
// ==========================================

/// 调度策略配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// 预热时长 (毫秒)
    ///
    /// - 说明: Worker 会提前 `warm_up_ms` 醒来，然后自旋轮询时钟直到精确的触发点，
    ///   以此消除操作系统唤醒延迟带来的抖动 (通常几百微秒到几毫秒)。
    /// - 默认值: 0 (纯睡眠模式，CPU 占用最低，抖动较大)
    /// - 权衡: 每次触发前最多燃烧 `warm_up_ms` 的单核 CPU。建议 1~10ms。
    pub warm_up_ms: u64,

    /// 是否允许重复任务 ID (初始值)
    ///
    /// - 说明: false 时，注册已被追踪的 ID 会被同步拒绝。
    /// - 运行期可以通过 `set_duplicate_allowed` 切换，只影响后续注册。
    pub duplicate_allowed: bool,

    /// `every` 任务是否立即触发第一次
    ///
    /// - false (默认): 首次触发在 `now + interval`。
    /// - true: 注册后立即触发一次，之后按间隔执行。
    pub every_fires_immediately: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            warm_up_ms: 0,
            duplicate_allowed: true,
            every_fires_immediately: false,
        }
    }
}

// ==========================================
// 3. 总配置入口 (SchedulerConfig)
// ==========================================

/// 调度器总配置
///
/// 使用分层结构组织配置项。支持 `serde` 序列化，可直接从 YAML/JSON 加载。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// 线程资源
    #[serde(default)]
    pub worker: WorkerConfig,

    /// 策略与行为
    #[serde(default)]
    pub policy: PolicyConfig,
}

impl SchedulerConfig {
    /// 快速创建一个指定线程数与预热时长的配置
    pub fn with_pool(workers: usize, warm_up: Duration) -> Self {
        let mut cfg = Self::default();
        cfg.worker.workers = workers;
        cfg.policy.warm_up_ms = warm_up.as_millis() as u64;
        cfg
    }

    /// 预热时长的 Duration 视图
    pub fn warm_up(&self) -> Duration {
        Duration::from_millis(self.policy.warm_up_ms)
    }
}
