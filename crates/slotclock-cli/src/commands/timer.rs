use std::io::Write;
use std::sync::Arc;

use clap::Subcommand;
use slotclock_core::notify::mode_change_message;
use slotclock_core::{Event, LogNotifier, Notifier, TimerMode, TimerService};
use tokio::sync::broadcast::error::RecvError;

use super::{format_clock, print_events, print_json, CliResult, Context};

#[derive(Subcommand)]
pub enum TimerAction {
    /// Start a countdown in the current mode (a full work session by default)
    Start {
        /// Countdown length in minutes
        #[arg(long)]
        minutes: Option<u64>,
    },
    /// Freeze the countdown
    Pause,
    /// Back to an idle work session; banks the running task first
    Reset,
    /// Print current timer state as JSON
    Status,
    /// Drive the countdown in the foreground until interrupted
    Run,
    /// Set work and break lengths in minutes; invalid values fall back to defaults
    Configure {
        #[arg(long)]
        work: Option<String>,
        #[arg(long = "break")]
        break_minutes: Option<String>,
    },
}

/// Bell plus a one-line message on stderr.
struct TerminalNotifier {
    bell: bool,
}

impl Notifier for TerminalNotifier {
    fn mode_changed(&self, from: TimerMode, to: TimerMode) {
        LogNotifier.mode_changed(from, to);
        let mut stderr = std::io::stderr().lock();
        if self.bell {
            let _ = write!(stderr, "\x07");
        }
        let _ = writeln!(stderr, "{}", mode_change_message(to));
    }
}

pub fn run(action: TimerAction) -> CliResult {
    let mut ctx = Context::open()?;

    match action {
        TimerAction::Start { minutes } => {
            let event = match minutes {
                Some(m) => ctx.timer.start(m.saturating_mul(60)),
                None => ctx.timer.start_work(),
            };
            ctx.broadcast_timer();
            print_json(&event)?;
        }
        TimerAction::Pause => match ctx.timer.pause() {
            Some(event) => {
                ctx.broadcast_timer();
                print_json(&event)?;
            }
            None => print_json(&ctx.timer.snapshot())?,
        },
        TimerAction::Reset => {
            let events = ctx.tasks.reset_timer(&mut ctx.timer);
            ctx.save_tasks()?;
            ctx.broadcast_timer();
            print_events(&events)?;
        }
        TimerAction::Status => {
            print_json(&ctx.timer.snapshot())?;
        }
        TimerAction::Configure {
            work,
            break_minutes,
        } => {
            let durations = ctx.timer.configure(work.as_deref(), break_minutes.as_deref());
            ctx.config.timer.work_minutes = durations.work_minutes;
            ctx.config.timer.break_minutes = durations.break_minutes;
            ctx.config.save()?;
            print_json(&durations)?;
        }
        TimerAction::Run => {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            rt.block_on(run_foreground(ctx))?;
        }
    }
    Ok(())
}

async fn run_foreground(ctx: Context) -> CliResult {
    let Context {
        config,
        db,
        timer,
        tasks,
        sync,
    } = ctx;

    let notifier: Arc<dyn Notifier> = if config.notifications.enabled {
        Arc::new(TerminalNotifier {
            bell: config.notifications.bell,
        })
    } else {
        Arc::new(LogNotifier)
    };
    let service = TimerService::new(timer, tasks, notifier, sync);
    let mut events = service.subscribe();
    service.activate();
    if !service.with_core(|core| core.timer.is_active()) {
        let remaining = service.with_core(|core| core.timer.remaining_seconds());
        service.start_timer(remaining);
    }

    let mut stdout = std::io::stdout();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            received = events.recv() => match received {
                Ok(Event::TimerTicked { mode, remaining_seconds, .. }) => {
                    write!(stdout, "\r{} {}  ", mode.label(), format_clock(remaining_seconds))?;
                    stdout.flush()?;
                }
                Ok(event @ Event::ModeChanged { .. }) => {
                    writeln!(stdout)?;
                    println!("{}", serde_json::to_string(&event)?);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => tracing::debug!(skipped, "display lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }
    writeln!(stdout)?;

    // A running countdown stays persisted as active; the next invocation
    // catches up by wall-clock time.
    service.shutdown();
    service.with_core(|core| db.save_tasks(core.tasks.iter()))?;
    Ok(())
}
