use super::{load_paths, prompts, AppContext};
use crate::output::Output;
use color_eyre::Result;
use media_sync_config::PathManager;
use std::fs;

pub async fn run_clear(
    all: bool,
    data: bool,
    dead_letters: bool,
    credentials: bool,
    yes: bool,
    output: &Output,
) -> Result<()> {
    let (data, dead_letters, credentials) = (all || data, all || dead_letters, all || credentials);
    if !(data || dead_letters || credentials) {
        output.warn("No clear option specified. Use --data, --dead-letters, --credentials, or --all");
        output.println("\nExample: mediashelf clear --dead-letters");
        return Ok(());
    }

    if data
        && !yes
        && !prompts::prompt_yes_no(
            "Delete the local library, history and queued changes? Changes not yet synced are lost.",
            Some(false),
        )?
    {
        output.info("Cancelled");
        return Ok(());
    }

    if data || dead_letters {
        let ctx = AppContext::open(output).await?;
        if data {
            ctx.coordinator
                .wipe()
                .map_err(|e| color_eyre::eyre::eyre!("Failed to clear local data: {}", e))?;
            output.success(format!("Cleared local data: {}", ctx.paths.database_file().display()));
        } else {
            let removed = ctx
                .coordinator
                .clear_dead_letters()
                .map_err(|e| color_eyre::eyre::eyre!("Failed to clear dead letters: {}", e))?;
            output.success(format!("Cleared {} dead letter(s)", removed));
        }
    }

    if credentials {
        clear_credentials(&load_paths()?, output)?;
    }
    Ok(())
}

fn clear_credentials(paths: &PathManager, output: &Output) -> Result<()> {
    let credentials_file = paths.credentials_file();

    if credentials_file.exists() {
        fs::remove_file(&credentials_file).map_err(|e| {
            color_eyre::eyre::eyre!("Failed to remove credentials file at {}: {}", credentials_file.display(), e)
        })?;
        output.success(format!("Cleared credentials: {}", credentials_file.display()));
    } else {
        output.info("No credentials file found to clear");
    }
    Ok(())
}
