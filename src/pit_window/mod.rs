pub mod commands;
pub mod controller;
pub mod scheduler;
pub mod snapshot;
pub mod state;

pub use controller::{Clock, PitWindowController, PitWindowEvent, SystemClock};
pub use scheduler::PitWindowScheduler;
pub use snapshot::{Countdown, CountdownKind, PitWindowSnapshot};
pub use state::{AlertState, PitWindowError, WallClock, WindowTime};
