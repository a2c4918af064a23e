mod durations;
mod engine;
mod ticker;

pub use durations::{TimerDurations, TimerMode, DEFAULT_BREAK_MINUTES, DEFAULT_WORK_MINUTES};
pub use engine::{TimerEngine, TimerState};
pub use ticker::Ticker;
