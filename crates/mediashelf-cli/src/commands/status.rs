use super::AppContext;
use crate::output::Output;
use chrono::Local;
use color_eyre::Result;
use comfy_table::{Cell, Table};
use owo_colors::OwoColorize;
use serde_json::json;

pub async fn run_status(output: &Output) -> Result<()> {
    let ctx = AppContext::open(output).await?;
    let status = ctx.coordinator.refresh_status();
    let library_size = ctx.coordinator.library().len();
    let remote = ctx.coordinator.remote().name().to_string();

    let data = json!({
        "remote": remote,
        "library_size": library_size,
        "status": status,
    });
    output.emit(&data, || {
        let mut table = Table::new();
        table.set_header(vec![Cell::new("Sync Status").add_attribute(comfy_table::Attribute::Bold)]);
        table.add_row(vec![Cell::new("Remote"), Cell::new(&remote)]);
        table.add_row(vec![
            Cell::new("Connectivity"),
            Cell::new(if status.is_online {
                "online".green().to_string()
            } else {
                "offline".red().to_string()
            }),
        ]);
        table.add_row(vec![Cell::new("Library"), Cell::new(library_size)]);
        table.add_row(vec![Cell::new("Pending changes"), Cell::new(status.pending_changes)]);
        table.add_row(vec![Cell::new("Dead letters"), Cell::new(status.dead_letters)]);
        table.add_row(vec![
            Cell::new("Last sync"),
            Cell::new(
                status
                    .last_sync
                    .map(|at| at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "never".to_string()),
            ),
        ]);
        table.load_preset(comfy_table::presets::UTF8_FULL);
        table.apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);
        println!("{}", table);
    });
    Ok(())
}
