use super::AppContext;
use crate::output::Output;
use crate::CollectionCommands;
use color_eyre::Result;
use comfy_table::{Cell, Table};
use media_sync_models::{CollectionDraft, CollectionPatch};
use owo_colors::OwoColorize;
use serde_json::json;

pub async fn run_collections(cmd: CollectionCommands, output: &Output) -> Result<()> {
    let ctx = AppContext::open(output).await?;

    match cmd {
        CollectionCommands::List => {
            let collections = ctx.coordinator.collections()?;
            output.emit(&collections, || {
                if collections.is_empty() {
                    println!("{}", "No collections yet".bright_black());
                    return;
                }
                let mut table = Table::new();
                table.set_header(vec!["Title", "Items", "Description", "Id"]);
                for collection in &collections {
                    table.add_row(vec![
                        Cell::new(&collection.title),
                        Cell::new(collection.media_ids.len()),
                        Cell::new(collection.description.clone().unwrap_or_default()),
                        Cell::new(&collection.id),
                    ]);
                }
                table.load_preset(comfy_table::presets::UTF8_FULL);
                table.apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);
                println!("{}", table);
            });
        }
        CollectionCommands::Add {
            title,
            description,
            media_ids,
        } => {
            let mut draft = CollectionDraft::new(title);
            draft.description = description;
            draft.media_ids = media_ids;
            let collection = ctx.coordinator.add_collection(draft)?;
            output.emit(&collection, || {
                println!("{} Created collection {}", "✓".green(), collection.title.bold());
                println!("  id: {}", collection.id.bright_black());
            });
        }
        CollectionCommands::Update {
            id,
            title,
            description,
            media_ids,
        } => {
            let patch = CollectionPatch {
                title,
                description: description.map(Some),
                media_ids,
                filter_criteria: None,
            };
            let collection = ctx.coordinator.update_collection(&id, patch)?;
            output.emit(&collection, || {
                println!("{} Updated collection {}", "✓".green(), collection.title.bold());
            });
        }
        CollectionCommands::Delete { id } => {
            ctx.coordinator.delete_collection(&id)?;
            output.emit(&json!({ "deleted": id }), || {
                println!("{} Deleted collection {}", "✓".green(), id);
            });
        }
    }

    ctx.finish().await;
    Ok(())
}
