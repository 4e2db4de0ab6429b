use std::sync::atomic::{AtomicU8, Ordering};

use crate::common::{Clock, SchedulerPhase};
use crate::policy::{WakeDecision, WakePolicy};
use crate::queue::TimerQueue;

/// 任务起搏器
///
/// 核心职责：负责驱动单个 Worker 的执行节奏。
/// 它根据 WakePolicy 的决策，决定是立刻派发、挂起等待、定时睡眠还是预热自旋。
///
/// 与时间线共享同一个锁域: "插入更早的任务" 和 "等待下一个到期" 之间不存在竞态。
pub(crate) struct TaskPacemaker<'a> {
    /// 时间线 (锁 + 条件变量 + epoch)
    queue: &'a TimerQueue,
    /// 调度器阶段 (停机是最高优先级的唤醒原因)
    phase: &'a AtomicU8,
    /// 单调时钟
    clock: &'a dyn Clock,
    /// 预热策略
    policy: WakePolicy,
}

impl<'a> TaskPacemaker<'a> {
    pub(crate) fn new(
        queue: &'a TimerQueue,
        phase: &'a AtomicU8,
        clock: &'a dyn Clock,
        policy: WakePolicy,
    ) -> Self {
        Self {
            queue,
            phase,
            clock,
            policy,
        }
    }

    #[inline]
    fn stopping(&self) -> bool {
        !SchedulerPhase::from_u8(self.phase.load(Ordering::Acquire)).accepts_work()
    }

    /// 等待下一次动作触发
    ///
    /// 返回 `Trigger` 只表示"最早的任务到期了"，不保证本 Worker 能抢到它；
    /// 调用方 `pop_due` 落空后应当重新进入等待。
    pub(crate) fn wait_next(&self) -> PacemakerEvent {
        loop {
            let mut guard = self.queue.state.lock();

            // 停机检查必须在锁内做: stop() 先置位再 (短暂持锁后) notify_all，
            // 保证不会出现 "检查完阶段、还没睡下、通知已经发过了" 的丢失唤醒。
            if self.stopping() {
                return PacemakerEvent::Shutdown;
            }

            let now = self.clock.now();
            match self.policy.decide(guard.earliest(), now) {
                // 最早任务已到期
                WakeDecision::Dispatch => return PacemakerEvent::Trigger,

                // 时间线为空: 睡到有人插入任务或停机
                WakeDecision::Park => {
                    self.queue.cond.wait(&mut guard);
                }

                // 睡到预热窗口起点。插入更早的任务会 notify 提前叫醒，
                // 醒来后重新决策，不会睡过头。
                WakeDecision::SleepUntil(target) => {
                    let _ = self.queue.cond.wait_until(&mut guard, target);
                }

                // 预热窗口内: 放开锁自旋轮询时钟直到精确的触发点
                WakeDecision::SpinUntil(due) => {
                    let epoch = self.queue.epoch.load(Ordering::Acquire);
                    drop(guard);
                    loop {
                        if self.stopping() {
                            return PacemakerEvent::Shutdown;
                        }
                        if self.clock.now() >= due {
                            return PacemakerEvent::Trigger;
                        }
                        // 时间线变了 (更早的插入 / 别人抢走了头部): 重新决策
                        if self.queue.epoch.load(Ordering::Acquire) != epoch {
                            break;
                        }
                        std::hint::spin_loop();
                    }
                }
            }
        }
    }
}

/// 起搏器产生的事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PacemakerEvent {
    /// [触发] 最早的任务到期了，请立即去取
    Trigger,
    /// [关闭] 系统停机
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{FireRule, SystemClock};
    use std::sync::atomic::AtomicU8;
    use std::time::{Duration, Instant};

    #[test]
    fn shutdown_wins_over_everything() {
        let queue = TimerQueue::new(true);
        let phase = AtomicU8::new(SchedulerPhase::Stopping as u8);
        let clock = SystemClock;
        let pm = TaskPacemaker::new(&queue, &phase, &clock, WakePolicy::new(Duration::ZERO));
        assert_eq!(pm.wait_next(), PacemakerEvent::Shutdown);
    }

    #[test]
    fn due_task_triggers_without_sleeping() {
        let queue = TimerQueue::new(true);
        queue
            .insert_job(None, Instant::now(), FireRule::OneShot, Box::new(|| Ok(())), None)
            .unwrap();
        let phase = AtomicU8::new(SchedulerPhase::Running as u8);
        let clock = SystemClock;
        let pm = TaskPacemaker::new(&queue, &phase, &clock, WakePolicy::new(Duration::ZERO));
        assert_eq!(pm.wait_next(), PacemakerEvent::Trigger);
    }

    #[test]
    fn spin_covers_the_warm_window() {
        let queue = TimerQueue::new(true);
        let due = Instant::now() + Duration::from_millis(3);
        queue
            .insert_job(None, due, FireRule::OneShot, Box::new(|| Ok(())), None)
            .unwrap();
        let phase = AtomicU8::new(SchedulerPhase::Running as u8);
        let clock = SystemClock;
        // 预热 10ms > 3ms: 直接进入自旋，返回时必须已到触发点
        let pm = TaskPacemaker::new(&queue, &phase, &clock, WakePolicy::new(Duration::from_millis(10)));
        assert_eq!(pm.wait_next(), PacemakerEvent::Trigger);
        assert!(Instant::now() >= due);
    }
}
