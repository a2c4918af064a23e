//! User-facing alert when a session runs out.

use crate::timer::TimerMode;

pub trait Notifier: Send + Sync {
    fn mode_changed(&self, from: TimerMode, to: TimerMode);
}

/// Writes the alert to the log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn mode_changed(&self, from: TimerMode, to: TimerMode) {
        tracing::info!("{} is over, {} starts now", from.label(), to.label().to_lowercase());
    }
}

/// Message shown to the user for a transition.
pub fn mode_change_message(to: TimerMode) -> &'static str {
    match to {
        TimerMode::OnBreak => "Work session complete. Time for a break!",
        TimerMode::Working => "Break is over. Back to work!",
    }
}
