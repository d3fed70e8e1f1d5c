use super::prompts;
use super::AppContext;
use crate::output::Output;
use chrono::Utc;
use color_eyre::Result;
use media_sync_core::transfer::{read_document, write_document};
use owo_colors::OwoColorize;
use serde_json::json;
use std::path::{Path, PathBuf};

pub async fn run_export(file: Option<PathBuf>, output: &Output) -> Result<()> {
    let ctx = AppContext::open(output).await?;
    let path = match file {
        Some(path) => path,
        None => {
            let dir = ctx.paths.export_dir();
            std::fs::create_dir_all(&dir)
                .map_err(|e| color_eyre::eyre::eyre!("Failed to create export directory {}: {}", dir.display(), e))?;
            dir.join(format!("mediashelf-{}.json", Utc::now().format("%Y%m%d-%H%M%S")))
        }
    };

    let document = ctx.coordinator.export()?;
    write_document(&document, &path)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to write export to {}: {}", path.display(), e))?;
    tracing::info!(
        operation = "export",
        media = document.media.len(),
        collections = document.collections.len(),
        path = %path.display(),
        "Exported library"
    );

    let summary = json!({
        "path": path.display().to_string(),
        "media": document.media.len(),
        "collections": document.collections.len(),
    });
    output.emit(&summary, || {
        println!(
            "{} Exported {} entries and {} collections to {}",
            "✓".green(),
            document.media.len(),
            document.collections.len(),
            path.display()
        );
    });
    Ok(())
}

pub async fn run_import(file: &Path, yes: bool, output: &Output) -> Result<()> {
    let document = read_document(file)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to read {}: {}", file.display(), e))?;
    let ctx = AppContext::open(output).await?;

    let current = ctx.coordinator.library().len();
    if !yes
        && current > 0
        && !prompts::prompt_yes_no(
            &format!(
                "Replace the {} local entries with the {} in {}?",
                current,
                document.media.len(),
                file.display()
            ),
            Some(false),
        )?
    {
        output.info("Cancelled");
        return Ok(());
    }

    let (media, collections) = ctx.coordinator.import(document)?;
    output.emit(&json!({ "media": media, "collections": collections }), || {
        println!("{} Imported {} entries and {} collections", "✓".green(), media, collections);
    });
    Ok(())
}
