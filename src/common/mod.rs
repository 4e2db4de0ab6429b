pub mod config;
pub mod error;
pub mod model;
pub mod time;
pub(crate) mod utils;

// 导出配置
pub use config::{PolicyConfig, SchedulerConfig, WorkerConfig};

// 导出错误类型
pub use error::{Result, SchedulerError};

// 导出核心模型
pub use model::{FireRule, SchedulerPhase, SchedulerStats, TaskState};

// 导出时钟接口
pub use time::{Clock, SystemClock};

// 内部工具的快捷访问
pub(crate) use utils::new_task_id;
