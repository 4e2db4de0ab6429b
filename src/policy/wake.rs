use std::time::{Duration, Instant};

/// 唤醒决策 (The Decision)
///
/// - 策略层返回给 Pacemaker 的具体行动指令。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeDecision {
    /// [立即派发]
    ///
    /// 含义: "最早的任务已经到期，直接去取！"
    ///
    /// - 行为: Pacemaker 直接返回 Trigger，Worker 立刻尝试 `pop_due`。
    Dispatch,

    /// [挂起等待]
    ///
    /// 含义: "时间线是空的，睡到有人叫我。"
    ///
    /// - 行为: 在条件变量上无限期等待。插入新任务或 stop() 会把它叫醒。
    /// - 优势: 空闲时零 CPU 消耗。
    Park,

    /// [定时睡眠]
    ///
    /// 含义: "最早的任务还远，先睡到预热窗口的起点。"
    ///
    /// - 行为: `Condvar::wait_until(target)`。期间插入了更早的任务会被
    ///   notify 提前叫醒，重新评估睡眠目标 (不会睡过头)。
    /// - `warm = 0` 时 target 就是触发点本身，退化为纯睡眠模式。
    SleepUntil(Instant),

    /// [预热自旋]
    ///
    /// 含义: "已经进入预热窗口，自旋轮询时钟直到精确的触发点。"
    ///
    /// - 行为: 不持锁的紧密循环反复读时钟，消除操作系统唤醒延迟的抖动分量。
    /// - 代价: 最多燃烧 `warm` 时长的单核 CPU。
    /// - 自旋期间每轮都检查停机标志和队列 epoch；更早的任务插进来会
    ///   提前结束自旋，重新决策。
    SpinUntil(Instant),
}

/// 唤醒策略 (预热窗口计算)
///
/// 多个任务同时临近时的策略: 每个观察到"最早任务已进预热窗口"的 Worker
/// 都会为它自旋，随后的 `pop_due` 竞争决定谁真正派发，落选者重新决策。
/// 简单、无协调开销；代价是临近时刻可能有多个核在烧 CPU。
#[derive(Debug, Clone, Copy)]
pub struct WakePolicy {
    /// 预热时长。0 = 纯睡眠模式。
    warm: Duration,
}

impl WakePolicy {
    pub fn new(warm: Duration) -> Self {
        Self { warm }
    }

    pub fn warm(&self) -> Duration {
        self.warm
    }

    /// 核心决策: 根据最早触发点与当前时刻给出行动指令
    pub fn decide(&self, earliest: Option<Instant>, now: Instant) -> WakeDecision {
        let Some(due) = earliest else {
            return WakeDecision::Park;
        };

        if due <= now {
            return WakeDecision::Dispatch;
        }

        // 预热窗口起点。触发点太近 (不足 warm) 时直接进入自旋。
        let warm_start = due.checked_sub(self.warm).unwrap_or(now);
        if now < warm_start {
            WakeDecision::SleepUntil(warm_start)
        } else {
            WakeDecision::SpinUntil(due)
        }
    }
}
