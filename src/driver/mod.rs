pub mod core;
pub mod pacemaker;

pub use self::core::ErrorSink;
pub(crate) use self::core::TaskDriver;
pub(crate) use self::pacemaker::{PacemakerEvent, TaskPacemaker};
