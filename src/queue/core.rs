use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use ahash::AHashMap;
use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::common::{new_task_id, FireRule, Result, SchedulerError, TaskState};

/// 任务回调类型
///
/// - 零参数工作单元。返回 `Err` 表示本次执行失败，会被上报到错误回调，
///   但不影响循环任务的下一次触发。
/// - 回调被 **move** 进任务记录，独占所有权；调用方不要捕获短生命周期引用。
pub type Job = Box<dyn FnMut() -> anyhow::Result<()> + Send + 'static>;

/// 任务记录：调度的基本单元
///
/// 同一个 `seq` 同一时刻只会出现在两个地方之一：
/// 时间线 (`Scheduled`) 或运行表 (`Running`)。
pub(crate) struct TaskEntry {
    /// 插入序号，全局唯一。同一触发时刻按序号先注册先派发 (FIFO)。
    pub seq: u64,
    /// 任务 ID (调用方指定或自动生成)，去重与批量操作的键
    pub id: String,
    /// 下一次触发点 (单调时钟)。循环任务每次重排后严格不回退。
    pub next_fire: Instant,
    /// 触发规则 (一次性 / 固定间隔循环)
    pub rule: FireRule,
    /// 禁用的任务保留时间槽，到期时跳过回调并直接重排
    pub enabled: bool,
    /// 生命周期状态 (Scheduled / Running / Removed)
    pub state: TaskState,
    /// 用户回调
    pub job: Job,
}

/// 运行中任务的控制块
///
/// 回调执行期间到达的 enable/disable/remove 落在这里，回调返回后统一生效。
#[derive(Default)]
struct RunningCtl {
    remove_requested: bool,
    enabled_override: Option<bool>,
}

/// 时间线内部状态：唯一的共享可变域
///
/// 所有字段的读写都必须持有 `TimerQueue::state` 锁。
/// "插入更早的任务" 与 "Worker 等待下一个到期" 共享这一个锁域，因此不会竞争出错。
pub(crate) struct TimelineState {
    /// 最小堆语义的时间线: (触发点, 序号) -> ()
    /// BTreeMap 的首个键就是最早到期的任务，键内序号保证同刻 FIFO。
    timeline: BTreeMap<(Instant, u64), ()>,
    /// 任务数据: 序号 -> 记录 (Running 中的任务不在这里)
    entries: AHashMap<u64, TaskEntry>,
    /// ID 索引: id -> 序号列表 (包含 Running 中的，逻辑移除的除外)
    index: AHashMap<String, Vec<u64>>,
    /// 运行表: 序号 -> 控制块
    running: AHashMap<u64, RunningCtl>,
    /// 序号分配器
    next_seq: u64,
}

impl TimelineState {
    fn new() -> Self {
        Self {
            timeline: BTreeMap::new(),
            entries: AHashMap::new(),
            index: AHashMap::new(),
            running: AHashMap::new(),
            next_seq: 0,
        }
    }

    /// 最早触发点 (Pacemaker 决策输入)
    pub(crate) fn earliest(&self) -> Option<Instant> {
        self.timeline.keys().next().map(|(t, _)| *t)
    }

    /// 从 ID 索引里摘掉一个序号
    fn unindex(&mut self, id: &str, seq: u64) {
        if let Some(seqs) = self.index.get_mut(id) {
            seqs.retain(|s| *s != seq);
            if seqs.is_empty() {
                self.index.remove(id);
            }
        }
    }
}

/// 时间有序任务队列 (The Timeline)
///
/// - 插入、取到期、按 ID 批量操作都在同一个锁域内完成。
/// - `epoch` 在每次时间线变化时自增，预热自旋的 Worker 靠它发现
///   "有更早的任务插进来了"，从而提前结束自旋重新决策。
pub(crate) struct TimerQueue {
    pub(crate) state: Mutex<TimelineState>,
    pub(crate) cond: Condvar,
    pub(crate) epoch: AtomicU64,
    duplicate_allowed: AtomicBool,
    skipped: AtomicU64,
}

impl TimerQueue {
    pub(crate) fn new(duplicate_allowed: bool) -> Self {
        Self {
            state: Mutex::new(TimelineState::new()),
            cond: Condvar::new(),
            epoch: AtomicU64::new(0),
            duplicate_allowed: AtomicBool::new(duplicate_allowed),
            skipped: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn bump_epoch(&self) {
        self.epoch.fetch_add(1, Ordering::Release);
    }

    /// 去重策略开关，仅影响后续注册
    pub(crate) fn set_duplicate_allowed(&self, allowed: bool) {
        self.duplicate_allowed.store(allowed, Ordering::Relaxed);
    }

    /// 注册一条任务记录
    ///
    /// - `id` 为 None 时自动生成 NanoID，与自定义 ID 走同一套索引和去重。
    /// - 去重在插入点强制执行: 不允许重复时，ID 已被追踪 (含 Running) 则同步拒绝。
    /// - `duplicate_override` 为 Some 时只对本次注册生效，覆盖全局开关。
    pub(crate) fn insert_job(
        &self,
        id: Option<String>,
        next_fire: Instant,
        rule: FireRule,
        job: Job,
        duplicate_override: Option<bool>,
    ) -> Result<String> {
        let id = id.unwrap_or_else(new_task_id);
        let mut st = self.state.lock();

        let allowed = duplicate_override
            .unwrap_or_else(|| self.duplicate_allowed.load(Ordering::Relaxed));
        if !allowed && st.index.contains_key(&id) {
            trace!(task_id = %id, "registration rejected: duplicate id");
            return Err(SchedulerError::DuplicateTask { id });
        }

        let seq = st.next_seq;
        st.next_seq += 1;

        st.timeline.insert((next_fire, seq), ());
        st.entries.insert(
            seq,
            TaskEntry {
                seq,
                id: id.clone(),
                next_fire,
                rule,
                enabled: true,
                state: TaskState::Scheduled,
                job,
            },
        );
        st.index.entry(id.clone()).or_default().push(seq);

        // 唤醒一个等待中的 Worker 重新评估睡眠目标。
        // 正在自旋的 Worker 不在条件变量上，它们通过 epoch 发现变化。
        self.bump_epoch();
        self.cond.notify_one();
        Ok(id)
    }

    /// 取走最早的到期任务 (到期 = `next_fire <= now`)
    ///
    /// - 返回的记录已被标记为 Running，数据从时间线上摘除，由调用方独占。
    /// - 到期但被禁用的任务在这里直接消化: 跳过回调，循环任务原地重排到
    ///   下一个周期，一次性任务丢弃。
    pub(crate) fn pop_due(&self, now: Instant) -> Option<TaskEntry> {
        let mut st = self.state.lock();
        loop {
            let key = *st.timeline.keys().next()?;
            let (fire, seq) = key;
            if fire > now {
                return None;
            }

            st.timeline.remove(&key);
            let Some(mut entry) = st.entries.remove(&seq) else {
                // 时间线与数据表不一致属于编程错误，不能静默吞掉
                unreachable!("timeline references missing entry {seq}");
            };

            if entry.enabled {
                entry.state = TaskState::Running;
                st.running.insert(seq, RunningCtl::default());
                self.bump_epoch();
                return Some(entry);
            }

            // 禁用任务: 占着时间槽但不执行
            self.skipped.fetch_add(1, Ordering::Relaxed);
            match entry.rule.interval() {
                Some(iv) => {
                    entry.next_fire = fire + iv;
                    st.timeline.insert((entry.next_fire, seq), ());
                    st.entries.insert(seq, entry);
                }
                None => {
                    // 一次性任务被禁用 = 抑制它唯一的一次执行
                    st.unindex(&entry.id, seq);
                }
            }
            self.bump_epoch();
        }
    }

    /// 回调返回后结算任务
    ///
    /// - 循环任务且未被移除且调度器仍在运行 -> 以 **计划触发点 + 间隔** 重排
    ///   (不用完成时间，保证周期不随执行耗时漂移)。
    /// - 其余情况 (一次性 / 已请求移除 / 停机) -> 删除记录。
    pub(crate) fn complete(&self, mut entry: TaskEntry, allow_reschedule: bool) {
        let mut st = self.state.lock();
        let ctl = st.running.remove(&entry.seq).unwrap_or_default();

        let interval = entry.rule.interval();
        if allow_reschedule && !ctl.remove_requested && interval.is_some() {
            if let Some(enabled) = ctl.enabled_override {
                entry.enabled = enabled;
            }
            entry.state = TaskState::Scheduled;
            entry.next_fire += interval.unwrap_or_default();
            st.timeline.insert((entry.next_fire, entry.seq), ());
            st.entries.insert(entry.seq, entry);
            self.bump_epoch();
            self.cond.notify_one();
        } else {
            st.unindex(&entry.id, entry.seq);
            self.bump_epoch();
        }
    }

    /// ID 是否被追踪 (含 Running，不含逻辑已移除)
    pub(crate) fn contains(&self, id: &str) -> bool {
        self.state.lock().index.contains_key(id)
    }

    /// ID 对应的记录中是否至少有一条处于启用状态
    ///
    /// Running 中的记录默认视为启用 (禁用的到期记录根本不会进入运行表)，
    /// 除非执行期间被 disable 过。
    pub(crate) fn any_enabled(&self, id: &str) -> bool {
        let st = self.state.lock();
        let Some(seqs) = st.index.get(id) else {
            return false;
        };
        seqs.iter().any(|seq| {
            if let Some(entry) = st.entries.get(seq) {
                entry.enabled
            } else if let Some(ctl) = st.running.get(seq) {
                ctl.enabled_override.unwrap_or(true)
            } else {
                false
            }
        })
    }

    /// 被追踪的任务总数 = 时间线上的 + 运行中的 (不含逻辑已移除)
    pub(crate) fn size(&self) -> usize {
        let st = self.state.lock();
        let in_flight = st
            .running
            .values()
            .filter(|ctl| !ctl.remove_requested)
            .count();
        st.entries.len() + in_flight
    }

    /// (pending, running) 计数快照
    pub(crate) fn counts(&self) -> (usize, usize) {
        let st = self.state.lock();
        (st.entries.len(), st.running.len())
    }

    /// 累计跳过次数 (disabled 到期)
    pub(crate) fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// 启用/禁用 ID 的全部匹配记录，返回受影响条数
    ///
    /// Running 中的记录记到控制块里，回调返回后生效。
    pub(crate) fn set_enabled(&self, id: &str, enabled: bool) -> usize {
        let mut st = self.state.lock();
        let Some(seqs) = st.index.get(id).cloned() else {
            return 0;
        };
        let mut touched = 0;
        for seq in seqs {
            if let Some(entry) = st.entries.get_mut(&seq) {
                entry.enabled = enabled;
                touched += 1;
            } else if let Some(ctl) = st.running.get_mut(&seq) {
                ctl.enabled_override = Some(enabled);
                touched += 1;
            }
        }
        touched
    }

    /// 移除 ID 的全部匹配记录，返回移除条数
    ///
    /// - 时间线上的记录立即删除，保证不会再执行。
    /// - Running 中的记录标记移除，在本次回调完成后生效 (不强制中断在途工作)。
    pub(crate) fn remove_by_id(&self, id: &str) -> usize {
        let mut st = self.state.lock();
        let Some(seqs) = st.index.remove(id) else {
            return 0;
        };
        let mut removed = 0;
        for seq in seqs {
            if let Some(entry) = st.entries.remove(&seq) {
                st.timeline.remove(&(entry.next_fire, seq));
                removed += 1;
            } else if let Some(ctl) = st.running.get_mut(&seq) {
                ctl.remove_requested = true;
                removed += 1;
            }
        }
        if removed > 0 {
            self.bump_epoch();
        }
        removed
    }
}
