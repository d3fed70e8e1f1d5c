use super::AppContext;
use crate::output::Output;
use crate::QueueCommands;
use color_eyre::Result;
use comfy_table::{Cell, Table};
use media_sync_models::MutationMessage;
use owo_colors::OwoColorize;
use serde_json::json;

pub async fn run_queue(cmd: QueueCommands, output: &Output) -> Result<()> {
    let ctx = AppContext::open(output).await?;

    match cmd {
        QueueCommands::Pending => {
            let pending = ctx.coordinator.pending()?;
            output.emit(&pending, || print_messages(&pending, "Nothing waiting to sync"));
        }
        QueueCommands::Dead => {
            let dead = ctx.coordinator.dead_letters()?;
            output.emit(&dead, || print_messages(&dead, "No dead letters"));
        }
        QueueCommands::Retry => {
            let requeued = ctx.coordinator.retry_dead_letters()?;
            output.emit(&json!({ "requeued": requeued }), || {
                if requeued == 0 {
                    println!("{}", "No dead letters to retry".bright_black());
                } else {
                    println!("{} Requeued {} change(s); they are sent on the next sync", "✓".green(), requeued);
                }
            });
        }
    }
    Ok(())
}

fn print_messages(messages: &[MutationMessage], empty: &str) {
    if messages.is_empty() {
        println!("{}", empty.bright_black());
        return;
    }
    let mut table = Table::new();
    table.set_header(vec!["Queued", "Table", "Operation", "Record", "Attempts", "Last error"]);
    for message in messages {
        table.add_row(vec![
            Cell::new(message.enqueued_at.format("%Y-%m-%d %H:%M:%S")),
            Cell::new(message.table.as_str()),
            Cell::new(message.operation.as_str()),
            Cell::new(&message.record_id),
            Cell::new(message.attempts),
            Cell::new(message.last_error.clone().unwrap_or_default()),
        ]);
    }
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);
    println!("{}", table);
}
