//! 调度器端到端测试
//!
//! 真实线程 + 真实时钟。时间参数都留了较大余量，避免 CI 抖动误报。

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::sleep;
use std::time::{Duration, Instant};

use kairos::{SchedulerError, SchedulerPhase, TaskScheduler};

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

// ==========================================
// 1. 派发顺序 (Ordering)
// ==========================================

#[test]
fn dispatch_order_follows_fire_time() {
    let s = TaskScheduler::new(4, Duration::ZERO).unwrap();
    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    // 乱序注册，触发点彼此隔开 80ms，远大于派发抖动
    let base = Instant::now() + ms(50);
    for (label, offset) in [("d", 240u64), ("a", 0), ("c", 160), ("b", 80)] {
        let order = order.clone();
        s.at(base + ms(offset), move || {
            order.lock().unwrap().push(label);
            Ok(())
        })
        .unwrap();
    }

    s.start().unwrap();
    sleep(ms(600));
    s.stop(true);

    assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c", "d"]);
}

// ==========================================
// 2. 去重策略 (Duplicate Suppression)
// ==========================================

#[test]
fn duplicates_not_allowed_keeps_one_record() {
    let s = TaskScheduler::new(4, Duration::ZERO).unwrap();
    s.set_duplicate_allowed(false);

    let mut rejected = 0;
    for _ in 0..8 {
        match s.after_as("task_id", Duration::from_secs(3600), || Ok(())) {
            Ok(_) => {}
            Err(SchedulerError::DuplicateTask { .. }) => rejected += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(rejected, 7);
    assert_eq!(s.size(), 1);
}

#[test]
fn duplicates_allowed_tracks_all_records() {
    let s = TaskScheduler::new(4, Duration::ZERO).unwrap();
    s.set_duplicate_allowed(true);

    for _ in 0..8 {
        s.after_as("task_id", Duration::from_secs(3600), || Ok(())).unwrap();
    }
    assert_eq!(s.size(), 8);

    // 按 ID 移除命中全部 8 条
    assert_eq!(s.remove("task_id"), 8);
    assert_eq!(s.size(), 0);
}

#[test]
fn per_registration_override_beats_global_policy() {
    let s = TaskScheduler::new(2, Duration::ZERO).unwrap();
    s.set_duplicate_allowed(false);

    let far = Duration::from_secs(3600);
    s.after_as("task_id", far, || Ok(())).unwrap();

    // 全局禁止重复，这几次注册显式放行
    s.after_as_with("task_id", far, true, || Ok(())).unwrap();
    s.at_as_with("task_id", Instant::now() + far, true, || Ok(())).unwrap();
    assert_eq!(s.size(), 3);

    // 全局放行后，仍可按次禁止
    s.set_duplicate_allowed(true);
    let err = s.every_as_with("task_id", ms(100), false, || Ok(())).unwrap_err();
    assert!(matches!(err, SchedulerError::DuplicateTask { .. }));
    assert_eq!(s.size(), 3);

    // 覆盖只对单次注册生效，全局开关不受影响
    s.every_as("task_id", ms(100), || Ok(())).unwrap();
    assert_eq!(s.size(), 4);
}

// ==========================================
// 3. 一次性任务 (One-shot)
// ==========================================

#[test]
fn one_shots_fire_once_and_drain() {
    let s = TaskScheduler::new(4, Duration::ZERO).unwrap();
    s.start().unwrap();

    let fired = Arc::new(AtomicUsize::new(0));
    for i in 0..8 {
        let fired = fired.clone();
        s.after_as(format!("task_{i}"), ms(10), move || {
            fired.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
    }

    sleep(ms(500));
    assert_eq!(fired.load(Ordering::SeqCst), 8);
    assert_eq!(s.size(), 0);
    assert_eq!(s.stats().completed_count, 8);
    s.stop(true);
}

#[test]
fn past_fire_time_clamps_to_immediate() {
    let s = TaskScheduler::new(1, Duration::ZERO).unwrap();
    s.start().unwrap();

    let fired = Arc::new(AtomicBool::new(false));
    let flag = fired.clone();
    s.at(Instant::now() - ms(100), move || {
        flag.store(true, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();

    sleep(ms(200));
    assert!(fired.load(Ordering::SeqCst));
    s.stop(true);
}

// ==========================================
// 4. 循环任务 (Repeating)
// ==========================================

#[test]
fn repeating_task_fires_steadily_without_drift() {
    let s = TaskScheduler::new(2, Duration::ZERO).unwrap();
    s.start().unwrap();

    let marks: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = marks.clone();
    s.every(ms(100), move || {
        sink.lock().unwrap().push(Instant::now());
        Ok(())
    })
    .unwrap();

    sleep(Duration::from_secs(2));
    s.stop(true);

    let marks = marks.lock().unwrap();
    // 2s / 100ms ≈ 19~20 次；给调度噪声留余量
    assert!(
        (15..=21).contains(&marks.len()),
        "unexpected fire count: {}",
        marks.len()
    );

    // 重排基于计划触发点: 平均间隔不应向上漂移
    let gaps: Vec<Duration> = marks.windows(2).map(|w| w[1] - w[0]).collect();
    let mean = gaps.iter().sum::<Duration>() / gaps.len() as u32;
    assert!(
        mean >= ms(80) && mean <= ms(135),
        "mean gap drifted: {mean:?}"
    );
}

#[test]
fn zero_interval_is_rejected() {
    let s = TaskScheduler::new(1, Duration::ZERO).unwrap();
    let err = s.every(Duration::ZERO, || Ok(())).unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidSchedule(_)));
}

// ==========================================
// 5. 启用 / 禁用 (Enable / Disable)
// ==========================================

#[test]
fn disabled_task_keeps_slot_but_never_runs() {
    let s = TaskScheduler::new(2, Duration::ZERO).unwrap();
    s.start().unwrap();

    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    s.every_as("tick", ms(50), move || {
        c.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();

    sleep(ms(180));
    assert!(s.disable("tick") >= 1);
    sleep(ms(80)); // 让可能在途的一次回调落地
    let frozen = count.load(Ordering::SeqCst);
    assert!(frozen >= 1, "task should have fired before disable");

    // 禁用期间: 零次调用，仍被追踪，槽位照常推进
    sleep(ms(300));
    assert_eq!(count.load(Ordering::SeqCst), frozen);
    assert!(s.is_scheduled("tick"));
    assert!(!s.is_enabled("tick"));
    assert!(s.stats().skipped_count >= 1);

    // 重新启用: 在下一个到期点恢复调用
    s.enable("tick");
    assert!(s.is_enabled("tick"));
    sleep(ms(300));
    assert!(count.load(Ordering::SeqCst) > frozen);

    s.stop(true);
}

// ==========================================
// 6. 移除 (Removal)
// ==========================================

#[test]
fn removed_task_never_executes_even_if_already_due() {
    let s = TaskScheduler::new(2, Duration::ZERO).unwrap();

    // 注册一个已到期的任务，但调度器还没启动 (它已在"到期视图"里排队)
    let fired = Arc::new(AtomicBool::new(false));
    let flag = fired.clone();
    s.at_as("doomed", Instant::now(), move || {
        flag.store(true, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();

    assert_eq!(s.remove("doomed"), 1);
    s.start().unwrap();
    sleep(ms(200));

    assert!(!fired.load(Ordering::SeqCst));
    assert_eq!(s.size(), 0);
    s.stop(true);
}

// ==========================================
// 7. 停机 (Stop)
// ==========================================

#[test]
fn graceful_stop_waits_for_in_flight_jobs() {
    let s = TaskScheduler::new(2, Duration::ZERO).unwrap();
    s.start().unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let flag = done.clone();
    s.after(ms(10), move || {
        sleep(ms(300));
        flag.store(true, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();

    sleep(ms(100)); // 确保回调已经开始
    let begun = Instant::now();
    s.stop(true);

    assert!(done.load(Ordering::SeqCst), "stop returned before job finished");
    assert!(begun.elapsed() >= ms(150));
    assert_eq!(s.phase(), SchedulerPhase::Stopped);
}

#[test]
fn non_graceful_stop_returns_without_waiting() {
    let s = TaskScheduler::new(1, Duration::ZERO).unwrap();
    s.start().unwrap();

    let started = Arc::new(AtomicBool::new(false));
    let flag = started.clone();
    s.after(ms(10), move || {
        flag.store(true, Ordering::SeqCst);
        sleep(ms(400));
        Ok(())
    })
    .unwrap();

    // 等回调开始再停
    while !started.load(Ordering::SeqCst) {
        sleep(ms(5));
    }
    let begun = Instant::now();
    s.stop(false);
    assert!(begun.elapsed() < ms(200), "non-graceful stop blocked on the job");
    // 信号发出后阶段立即可观测为 Stopped；Drop 时 join，保证没有线程活得比调度器久
    assert_eq!(s.phase(), SchedulerPhase::Stopped);
}

#[test]
fn registration_after_stop_is_rejected() {
    let s = TaskScheduler::new(1, Duration::ZERO).unwrap();
    s.start().unwrap();
    s.stop(true);

    let err = s.after(ms(10), || Ok(())).unwrap_err();
    assert!(matches!(err, SchedulerError::SchedulerStopped));
    let err = s.start().unwrap_err();
    assert!(matches!(err, SchedulerError::SchedulerStopped));
}

#[test]
fn zero_worker_construction_fails() {
    let err = TaskScheduler::new(0, Duration::ZERO).unwrap_err();
    assert!(matches!(err, SchedulerError::Config(_)));
}

// ==========================================
// 8. 错误隔离 (Failure Containment)
// ==========================================

#[test]
fn failing_job_is_reported_and_repeating_task_survives() {
    let reported = Arc::new(AtomicUsize::new(0));
    let sink_hits = reported.clone();

    let s = TaskScheduler::builder()
        .workers(2)
        .on_error(move |_id, _err| {
            sink_hits.fetch_add(1, Ordering::SeqCst);
        })
        .build()
        .unwrap();
    s.start().unwrap();

    s.every_as("flaky", ms(50), || Err(anyhow::anyhow!("boom"))).unwrap();

    sleep(ms(400));
    s.stop(true);

    // 每次触发都失败、都上报，但任务一直在重排
    let hits = reported.load(Ordering::SeqCst);
    assert!(hits >= 3, "error sink hits: {hits}");
    assert_eq!(s.stats().failed_count, hits as u64);
}

#[test]
fn panicking_job_does_not_kill_the_worker() {
    let s = TaskScheduler::new(1, Duration::ZERO).unwrap();
    s.start().unwrap();

    let fired = Arc::new(AtomicBool::new(false));
    let flag = fired.clone();

    s.after(ms(10), || -> anyhow::Result<()> { panic!("worker, survive this") })
        .unwrap();
    s.after(ms(100), move || {
        flag.store(true, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();

    sleep(ms(400));
    s.stop(true);

    // 唯一的 Worker 扛过了 Panic，还执行了后面的任务
    assert!(fired.load(Ordering::SeqCst));
    assert_eq!(s.stats().failed_count, 1);
    assert_eq!(s.stats().completed_count, 1);
}

// ==========================================
// 9. 预热模式 (Warm-up)
// ==========================================

#[test]
fn warm_up_mode_dispatches_on_time() {
    let s = TaskScheduler::new(2, ms(3)).unwrap();
    s.start().unwrap();

    let fired = Arc::new(AtomicBool::new(false));
    let flag = fired.clone();
    let due = Instant::now() + ms(50);
    s.at(due, move || {
        flag.store(true, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();

    sleep(ms(250));
    assert!(fired.load(Ordering::SeqCst));
    s.stop(true);
}
