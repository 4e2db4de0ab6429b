use std::time::Duration;

use serde::{Deserialize, Serialize};

// ==========================================
// 1. 任务状态枚举 (TaskState)
// ==========================================

/// 任务生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    /// 已调度
    /// - 任务在时间线上等待到期，可被任意空闲 Worker 取走。
    Scheduled,

    /// 运行中
    /// - 任务已被某个 Worker 取走并正在执行回调。
    /// - 处于此状态的任务不在时间线的"到期视图"里；对它的 enable/disable/remove
    ///   会被记录下来，在回调返回后统一生效。
    Running,

    /// 已移除
    /// - 显式 remove，或一次性任务执行完毕。终态。
    Removed,
}

impl TaskState {
    /// 状态是否是终态（不可流转）
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Removed)
    }
}

// ==========================================
// 2. 调度器阶段 (SchedulerPhase)
// ==========================================

/// 调度器生命周期阶段
///
/// 状态机: `Created → Running → Stopping → Stopped`。
/// `Stopped` 是终态，不支持重启。注册调用仅在 `Created` / `Running` 阶段合法。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SchedulerPhase {
    Created = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl SchedulerPhase {
    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            0 => SchedulerPhase::Created,
            1 => SchedulerPhase::Running,
            2 => SchedulerPhase::Stopping,
            _ => SchedulerPhase::Stopped,
        }
    }

    /// 是否还接受新任务注册
    pub fn accepts_work(&self) -> bool {
        matches!(self, SchedulerPhase::Created | SchedulerPhase::Running)
    }
}

// ==========================================
// 3. 触发规则 (FireRule)
// ==========================================

/// 任务触发规则
///
/// - `OneShot`: 到期执行一次后移除。
/// - `Every`: 固定间隔循环。下一次触发点 = 本次计划触发点 + 间隔
///   (基于计划时间而非完成时间，避免周期漂移)。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireRule {
    OneShot,
    Every(Duration),
}

impl FireRule {
    /// 循环间隔 (一次性任务返回 None)
    pub fn interval(&self) -> Option<Duration> {
        match self {
            FireRule::OneShot => None,
            FireRule::Every(d) => Some(*d),
        }
    }
}

// ==========================================
// 4. 统计指标 (SchedulerStats)
// ==========================================

/// 调度器运行时统计快照
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// 时间线上等待到期的任务数
    pub pending_tasks: usize,
    /// 正在执行回调的任务数
    pub running_tasks: usize,
    /// 成功执行计数 (累计)
    pub completed_count: u64,
    /// 失败执行计数 (Err 或 Panic，累计)
    pub failed_count: u64,
    /// 因 disabled 被跳过的到期次数 (累计)
    pub skipped_count: u64,
    /// Worker 线程数
    pub workers: usize,
}
