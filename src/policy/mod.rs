pub mod wake;

pub use wake::{WakeDecision, WakePolicy};
