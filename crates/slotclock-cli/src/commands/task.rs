use clap::Subcommand;
use slotclock_core::{Slot, TaskId};

use super::{print_events, print_json, record_completion, CliResult, Context};

#[derive(Subcommand)]
pub enum TaskAction {
    /// Book a time slot; the allotment is the slot length
    Book {
        /// Slot start (HH:MM)
        #[arg(long)]
        start: String,
        /// Slot end (HH:MM)
        #[arg(long)]
        end: String,
        /// What the slot is for
        description: String,
    },
    /// Register a task under a chosen id
    Register {
        id: String,
        /// Allotted minutes
        minutes: u32,
        description: String,
    },
    /// Start a task; pauses whichever task is running
    Start { id: String },
    /// Pause the running task
    Pause { id: String },
    /// Mark a task completed
    Complete { id: String },
    /// Elapsed against allotted minutes
    Report { id: String },
    /// List tasks
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: TaskAction) -> CliResult {
    let mut ctx = Context::open()?;

    match action {
        TaskAction::Book {
            start,
            end,
            description,
        } => {
            let slot = Slot::parse(&start, &end)?;
            let (task_id, _) = ctx.tasks.book(slot, description)?;
            ctx.save_tasks()?;
            if let Some(record) = ctx.tasks.get(&task_id) {
                print_json(record)?;
            }
        }
        TaskAction::Register {
            id,
            minutes,
            description,
        } => {
            let event = ctx.tasks.register(TaskId::from(id), description, minutes)?;
            ctx.save_tasks()?;
            print_json(&event)?;
        }
        TaskAction::Start { id } => {
            let events = ctx.tasks.start(&mut ctx.timer, &TaskId::from(id))?;
            ctx.save_tasks()?;
            ctx.broadcast_timer();
            print_events(&events)?;
        }
        TaskAction::Pause { id } => {
            let events = ctx.tasks.pause(&mut ctx.timer, &TaskId::from(id))?;
            ctx.save_tasks()?;
            ctx.broadcast_timer();
            print_events(&events)?;
        }
        TaskAction::Complete { id } => {
            let (completion, events) = ctx.tasks.complete(&mut ctx.timer, &TaskId::from(id))?;
            ctx.save_tasks()?;
            ctx.broadcast_timer();
            record_completion(&ctx.db, &completion);
            print_events(&events)?;
        }
        TaskAction::Report { id } => {
            print_json(&ctx.tasks.report(&TaskId::from(id))?)?;
        }
        TaskAction::List { json } => {
            if json {
                let tasks: Vec<_> = ctx.tasks.iter().collect();
                print_json(&tasks)?;
            } else if ctx.tasks.is_empty() {
                println!("no tasks");
            } else {
                let active = ctx.tasks.active_id().cloned();
                for task in ctx.tasks.iter() {
                    let label = ctx
                        .tasks
                        .report(&task.id)
                        .map(|r| r.label)
                        .unwrap_or_default();
                    let marker = if active.as_ref() == Some(&task.id) { "*" } else { " " };
                    let slot = task.slot.map(|s| s.to_string()).unwrap_or_default();
                    println!(
                        "{marker} {:<24} {:<12} {:>9}  {slot:<13}  {}",
                        task.id.as_str(),
                        task.status.to_string(),
                        label,
                        task.description
                    );
                }
            }
        }
    }
    Ok(())
}
