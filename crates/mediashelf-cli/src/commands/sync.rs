use super::sync_ui::SyncUI;
use super::AppContext;
use crate::output::Output;
use color_eyre::Result;
use media_sync_core::ReconcileReport;
use owo_colors::OwoColorize;

pub async fn run_sync(output: &Output) -> Result<()> {
    tracing::debug!("Sync command started");
    let ctx = AppContext::open(output).await?;

    if !ctx.config.is_remote_configured() {
        output.warn("No remote store configured. Run 'mediashelf config remote --url <URL>' first.");
        return Ok(());
    }

    let ui = SyncUI::new(output.is_human() && !output.is_quiet());
    ui.set_message("Reconciling with remote store...");
    let reconciled = ctx
        .coordinator
        .fetch()
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Sync failed: {}", e))?;
    ctx.finish().await;
    ui.finish();

    let report = &reconciled.report;
    output.emit(report, || print_report(report, reconciled.media.len(), output));
    Ok(())
}

pub fn print_report(report: &ReconcileReport, library_size: usize, output: &Output) {
    match &report.remote_error {
        Some(error) => output.warn(format!("Remote store unavailable ({}); showing local library", error)),
        None => output.success(format!(
            "Sync completed in {:.1}s: {} pushed, {} pulled, {} local-only",
            report.duration.as_secs_f64(),
            report.drained,
            report.pulled,
            report.local_only
        )),
    }

    if report.excluded_pending_deletes > 0 {
        output.info(format!("  {} pending delete(s) kept out of the merge", report.excluded_pending_deletes));
    }
    if report.backfilled > 0 {
        output.info(format!("  {} local item(s) queued for upload", report.backfilled));
    }
    if report.still_pending > 0 {
        output.info(format!("  {} change(s) still waiting to sync", report.still_pending).yellow().to_string());
    }
    if report.dead_lettered > 0 {
        output.warn(format!(
            "{} change(s) were refused by the remote store. See 'mediashelf queue dead'.",
            report.dead_lettered
        ));
    }
    output.info(format!("{}", format!("{} entries in library", library_size).bright_black()));
}
