use serde::{Deserialize, Serialize};

pub const DEFAULT_WORK_MINUTES: u32 = 25;
pub const DEFAULT_BREAK_MINUTES: u32 = 5;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerMode {
    #[default]
    Working,
    OnBreak,
}

impl TimerMode {
    /// The mode a finished session hands over to.
    pub fn flipped(self) -> Self {
        match self {
            TimerMode::Working => TimerMode::OnBreak,
            TimerMode::OnBreak => TimerMode::Working,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TimerMode::Working => "Working",
            TimerMode::OnBreak => "On break",
        }
    }
}

/// Work and break lengths for future sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerDurations {
    pub work_minutes: u32,
    pub break_minutes: u32,
}

impl TimerDurations {
    /// Build from raw user input.
    ///
    /// Each field falls back to its default independently when absent,
    /// non-numeric or zero. Never fails.
    pub fn from_inputs(work: Option<&str>, brk: Option<&str>) -> Self {
        Self {
            work_minutes: parse_minutes(work).unwrap_or(DEFAULT_WORK_MINUTES),
            break_minutes: parse_minutes(brk).unwrap_or(DEFAULT_BREAK_MINUTES),
        }
    }

    /// Get the duration of `mode` in seconds.
    ///
    /// Uses saturating arithmetic to prevent overflow with large values.
    pub fn secs_for(&self, mode: TimerMode) -> u64 {
        let minutes = match mode {
            TimerMode::Working => self.work_minutes,
            TimerMode::OnBreak => self.break_minutes,
        };
        u64::from(minutes).saturating_mul(60)
    }

    pub fn work_secs(&self) -> u64 {
        self.secs_for(TimerMode::Working)
    }

    pub fn break_secs(&self) -> u64 {
        self.secs_for(TimerMode::OnBreak)
    }
}

impl Default for TimerDurations {
    fn default() -> Self {
        Self {
            work_minutes: DEFAULT_WORK_MINUTES,
            break_minutes: DEFAULT_BREAK_MINUTES,
        }
    }
}

fn parse_minutes(raw: Option<&str>) -> Option<u32> {
    raw.map(str::trim)
        .and_then(|s| s.parse::<u32>().ok())
        .filter(|&m| m > 0)
}
