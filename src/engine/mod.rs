//! Session engine: pure state machine, timers and the Tokio task that drives them.

pub mod clock;
pub mod driver;
pub mod duration;
pub mod grade;
pub mod machine;
pub mod selector;
pub mod summary;
pub mod timer;

pub use driver::{Command, SessionDriver, SessionHandle};
pub use machine::{SessionEvent, SessionMachine, SessionPhase, SessionView};
