use std::time::Instant;

/// 单调时钟接口
///
/// 全系统统一通过它获取"现在"，方便测试时 Mock 或做时钟偏移。
/// - 特性：永不倒流，不受 NTP/手动改时间影响。
/// - 所有调度计算 (到期判断、预热窗口、重排) 都基于它。
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

/// 默认实现：直接读取 `std::time::Instant`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }
}
