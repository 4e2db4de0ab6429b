//! 预热精度演示
//!
//! 对比纯睡眠模式和预热自旋模式下，周期触发的实际间隔抖动。
//! 运行: `cargo run --example precision --release`

use std::sync::{Arc, Mutex};
use std::thread::sleep;
use std::time::{Duration, Instant};

use kairos::TaskScheduler;

/// (均值, 标准差, 最大值)，单位毫秒
fn mean_stddev_and_largest(gaps: &[Duration]) -> (f64, f64, f64) {
    assert!(!gaps.is_empty(), "no samples collected");

    let samples: Vec<f64> = gaps.iter().map(|d| d.as_secs_f64() * 1000.0).collect();
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    let variance =
        samples.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / samples.len() as f64;
    let largest = samples.iter().cloned().fold(f64::MIN, f64::max);

    (mean, variance.sqrt(), largest)
}

fn run(label: &str, warm: Duration) {
    let s = TaskScheduler::new(8, warm).expect("scheduler construction");
    s.set_duplicate_allowed(false);
    s.start().expect("scheduler start");

    let marks: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));

    println!("        Starting: {label}");

    // 每 100ms 一个标记点，共 10 个
    for i in 0..10u32 {
        let marks = marks.clone();
        s.after(Duration::from_millis(100) * i, move || {
            tracing::info!("mark");
            marks.lock().unwrap().push(Instant::now());
            Ok(())
        })
        .expect("registration");
    }

    sleep(Duration::from_secs(2));
    s.stop(true);

    let marks = marks.lock().unwrap();
    let gaps: Vec<Duration> = marks.windows(2).map(|w| w[1] - w[0]).collect();
    let (mean, stddev, largest) = mean_stddev_and_largest(&gaps);

    println!("         Samples: {} intervals", gaps.len());
    println!("            Mean: {mean:>10.6} ms");
    println!("         Largest: {largest:>10.6} ms");
    println!("          Stddev: {stddev:>10.6} ms");
    println!(" ============================\n");
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    println!("kairos {}", kairos::version());

    run("non-warmed", Duration::ZERO);
    run("warmed 5ms", Duration::from_millis(5));
    run("non-warmed", Duration::ZERO);
    run("warmed 2ms", Duration::from_millis(2));
    run("non-warmed", Duration::ZERO);
    run("warmed 10ms", Duration::from_millis(10));
}
