pub mod builder;
pub mod core;

pub use self::builder::SchedulerBuilder;
pub use self::core::TaskScheduler;
