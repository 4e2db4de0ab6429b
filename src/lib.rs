// 1. 基础模块
pub mod common;

// 2. 核心组件
pub mod policy;
pub mod queue;

// 3. 执行引擎
pub mod driver;

// 4. 调度器门面
pub mod scheduler;

// 导出配置
pub use common::{PolicyConfig, SchedulerConfig, WorkerConfig};

// 导出错误类型
pub use common::{Result, SchedulerError};

// 导出核心模型
pub use common::{FireRule, SchedulerPhase, SchedulerStats, TaskState};

// 导出时钟接口 (可注入，测试用)
pub use common::{Clock, SystemClock};

// 导出唤醒策略与回调类型
pub use driver::ErrorSink;
pub use policy::{WakeDecision, WakePolicy};
pub use queue::Job;

// 导出调度器入口
pub use scheduler::{SchedulerBuilder, TaskScheduler};

/// 库版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
