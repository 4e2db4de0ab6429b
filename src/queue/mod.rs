pub mod core;

pub use self::core::Job;
pub(crate) use self::core::{TaskEntry, TimerQueue};
