pub mod constants;
pub mod logging;
pub mod progress;
pub mod timestamps;

pub use constants::*;
pub use logging::init_tracing;
pub use progress::ProgressReporter;
pub use timestamps::{Clock, SystemClock};
