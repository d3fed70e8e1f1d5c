use super::prompts;
use super::AppContext;
use crate::output::Output;
use chrono::{DateTime, Local, Utc};
use clap::{ArgAction, Args};
use color_eyre::Result;
use comfy_table::{Cell, Color, Table};
use media_sync_core::{LibraryFilter, SortField};
use media_sync_models::{HistoryEvent, MediaDraft, MediaItem, MediaPatch, MediaStatus, MediaType, Range};
use owo_colors::OwoColorize;
use serde_json::json;

#[derive(Args)]
pub struct AddArgs {
    /// Title
    title: String,

    /// movie, tv, anime, manga, game, book, ...
    #[arg(long = "type", short = 't', default_value = "movie")]
    media_type: MediaType,

    /// planned, watching, completed, on_hold, dropped, rewatching
    #[arg(long, short = 's', default_value = "planned")]
    status: MediaStatus,

    #[arg(long)]
    progress: Option<u32>,

    /// Total episodes, chapters, pages, ...
    #[arg(long)]
    total: Option<u32>,

    #[arg(long)]
    year: Option<i32>,

    #[arg(long = "genre", value_name = "GENRE")]
    genres: Vec<String>,

    #[arg(long = "tag", value_name = "TAG")]
    tags: Vec<String>,

    #[arg(long)]
    notes: Option<String>,

    #[arg(long, action = ArgAction::SetTrue)]
    favorite: bool,
}

#[derive(Args)]
pub struct UpdateArgs {
    /// Media id
    id: String,

    #[arg(long)]
    title: Option<String>,

    #[arg(long, short = 's')]
    status: Option<MediaStatus>,

    #[arg(long)]
    progress: Option<u32>,

    #[arg(long)]
    total: Option<u32>,

    #[arg(long)]
    favorite: Option<bool>,

    #[arg(long)]
    archived: Option<bool>,

    /// Your own rating
    #[arg(long)]
    rating: Option<f64>,

    #[arg(long)]
    notes: Option<String>,

    /// Remove the notes
    #[arg(long, action = ArgAction::SetTrue, conflicts_with = "notes")]
    clear_notes: bool,
}

#[derive(Args)]
pub struct ListArgs {
    /// Match title, description, genres and tags
    #[arg(long)]
    search: Option<String>,

    #[arg(long = "status", short = 's', value_name = "STATUS")]
    statuses: Vec<MediaStatus>,

    #[arg(long = "type", short = 't', value_name = "TYPE")]
    types: Vec<MediaType>,

    #[arg(long = "genre", value_name = "GENRE")]
    genres: Vec<String>,

    #[arg(long = "tag", value_name = "TAG")]
    tags: Vec<String>,

    #[arg(long)]
    min_year: Option<i32>,

    #[arg(long)]
    max_year: Option<i32>,

    #[arg(long)]
    min_rating: Option<f64>,

    #[arg(long)]
    favorite: Option<bool>,

    /// Show archived entries instead of active ones
    #[arg(long, action = ArgAction::SetTrue)]
    archived: bool,

    /// updated_at, created_at, title, year, rating, completion
    #[arg(long, default_value = "updated_at")]
    sort: SortField,

    #[arg(long, action = ArgAction::SetTrue)]
    asc: bool,

    #[arg(long)]
    limit: Option<usize>,
}

impl ListArgs {
    fn to_filter(&self) -> LibraryFilter {
        let release_year = (self.min_year.is_some() || self.max_year.is_some()).then(|| Range {
            min: self.min_year.map(f64::from),
            max: self.max_year.map(f64::from),
        });
        LibraryFilter {
            search: self.search.clone(),
            statuses: self.statuses.clone(),
            types: self.types.clone(),
            genres: self.genres.clone(),
            tags: self.tags.clone(),
            release_year,
            rating: self.min_rating.map(|min| Range { min: Some(min), max: None }),
            favorite: self.favorite,
            archived: self.archived,
            sort: self.sort,
            ascending: self.asc,
        }
    }
}

pub async fn run_add(args: AddArgs, output: &Output) -> Result<()> {
    let ctx = AppContext::open(output).await?;

    let mut draft = MediaDraft::new(args.title, args.media_type).with_status(args.status);
    draft.progress = args.progress.unwrap_or(0);
    draft.total_units = args.total.unwrap_or(0);
    draft.release_year = args.year;
    draft.genres = args.genres;
    draft.tags = args.tags;
    draft.notes = args.notes;
    draft.is_favorite = args.favorite;

    let item = ctx.coordinator.add(draft)?;
    ctx.finish().await;

    output.emit(&item, || {
        println!("{} Added {} ({})", "✓".green(), item.title.bold(), item.media_type);
        println!("  id: {}", item.id.bright_black());
    });
    report_pending(&ctx, output);
    Ok(())
}

pub async fn run_update(args: UpdateArgs, output: &Output) -> Result<()> {
    let ctx = AppContext::open(output).await?;

    let notes = if args.clear_notes {
        Some(None)
    } else {
        args.notes.map(Some)
    };
    let patch = MediaPatch {
        title: args.title,
        status: args.status,
        progress: args.progress,
        total_units: args.total,
        is_favorite: args.favorite,
        is_archived: args.archived,
        user_rating: args.rating.map(Some),
        notes,
        ..MediaPatch::default()
    };
    if patch.is_empty() {
        output.warn("Nothing to update. Pass at least one field, e.g. --status completed");
        return Ok(());
    }

    let item = ctx.coordinator.update(&args.id, patch)?;
    ctx.finish().await;

    output.emit(&item, || {
        println!(
            "{} Updated {} ({}, {:.0}%)",
            "✓".green(),
            item.title.bold(),
            item.status.label(),
            item.completion_percent
        );
    });
    report_pending(&ctx, output);
    Ok(())
}

pub async fn run_delete(id: &str, yes: bool, output: &Output) -> Result<()> {
    let ctx = AppContext::open(output).await?;
    let item = ctx
        .coordinator
        .get(id)?
        .ok_or_else(|| color_eyre::eyre::eyre!("No media item with id {}", id))?;

    if !yes && !prompts::prompt_yes_no(&format!("Delete \"{}\"?", item.title), Some(false))? {
        output.info("Cancelled");
        return Ok(());
    }

    ctx.coordinator.delete(id)?;
    ctx.finish().await;

    output.emit(&json!({ "deleted": id, "title": item.title }), || {
        println!("{} Deleted {}", "✓".green(), item.title.bold());
    });
    report_pending(&ctx, output);
    Ok(())
}

pub async fn run_list(args: ListArgs, output: &Output) -> Result<()> {
    let ctx = AppContext::open(output).await?;
    let mut items = args.to_filter().apply(&ctx.coordinator.library());
    if let Some(limit) = args.limit {
        items.truncate(limit);
    }

    output.emit(&items, || {
        if items.is_empty() {
            println!("{}", "No matching entries".bright_black());
            return;
        }
        println!("{}", media_table(&items));
        println!("{}", format!("{} entries", items.len()).bright_black());
    });
    Ok(())
}

pub async fn run_show(id: &str, output: &Output) -> Result<()> {
    let ctx = AppContext::open(output).await?;
    let item = ctx
        .coordinator
        .get(id)?
        .ok_or_else(|| color_eyre::eyre::eyre!("No media item with id {}", id))?;
    let history = ctx.coordinator.history_for(id)?;

    output.emit(&json!({ "media": item, "history": history }), || {
        println!("{}", item.title.bold().bright_cyan());
        println!("  {:<12} {}", "id", item.id);
        println!("  {:<12} {}", "type", item.media_type);
        println!("  {:<12} {}", "status", item.status.label());
        println!(
            "  {:<12} {}/{} {} ({:.0}%)",
            "progress",
            item.progress,
            item.total_units,
            item.media_type.unit_label(),
            item.completion_percent
        );
        if let Some(year) = item.release_year {
            println!("  {:<12} {}", "year", year);
        }
        if !item.genres.is_empty() {
            println!("  {:<12} {}", "genres", item.genres.join(", "));
        }
        if let Some(notes) = &item.notes {
            println!("  {:<12} {}", "notes", notes);
        }
        println!("  {:<12} {}", "updated", local_time(&item.updated_at));
        println!();
        println!("{}", history_table(&history));
    });
    Ok(())
}

pub async fn run_history(id: Option<&str>, limit: usize, output: &Output) -> Result<()> {
    let ctx = AppContext::open(output).await?;
    let mut events = match id {
        Some(id) => ctx.coordinator.history_for(id)?,
        None => ctx.coordinator.history(limit)?,
    };
    events.truncate(limit);

    output.emit(&events, || {
        if events.is_empty() {
            println!("{}", "No history yet".bright_black());
        } else {
            println!("{}", history_table(&events));
        }
    });
    Ok(())
}

fn report_pending(ctx: &AppContext, output: &Output) {
    let status = ctx.coordinator.status();
    if status.pending_changes > 0 && output.is_human() {
        output.info(format!(
            "{}",
            format!("{} change(s) waiting to sync", status.pending_changes).bright_black()
        ));
    }
}

fn local_time(at: &DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

fn status_cell(status: MediaStatus) -> Cell {
    let color = match status {
        MediaStatus::Completed => Color::Green,
        MediaStatus::InProgress | MediaStatus::Rewatching => Color::Cyan,
        MediaStatus::OnHold => Color::Yellow,
        MediaStatus::Dropped => Color::Red,
        MediaStatus::Planned | MediaStatus::Archived => Color::Grey,
    };
    Cell::new(status.label()).fg(color)
}

fn media_table(items: &[MediaItem]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Title", "Type", "Status", "Progress", "Year", "★", "Id"]);
    for item in items {
        let progress = if item.total_units > 0 {
            format!("{}/{} ({:.0}%)", item.progress, item.total_units, item.completion_percent)
        } else {
            format!("{:.0}%", item.completion_percent)
        };
        table.add_row(vec![
            Cell::new(&item.title),
            Cell::new(item.media_type.as_str()),
            status_cell(item.status),
            Cell::new(progress),
            Cell::new(item.release_year.map(|y| y.to_string()).unwrap_or_default()),
            Cell::new(if item.is_favorite { "★" } else { "" }),
            Cell::new(&item.id[..8.min(item.id.len())]),
        ]);
    }
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);
    table
}

fn history_table(events: &[HistoryEvent]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["When", "Action", "Media", "Details"]);
    for event in events {
        let details = event
            .value
            .as_ref()
            .map(|value| {
                value
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default();
        table.add_row(vec![
            Cell::new(local_time(&event.created_at)),
            Cell::new(event.action_type.as_str()),
            Cell::new(&event.media_id[..8.min(event.media_id.len())]),
            Cell::new(details),
        ]);
    }
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct ListCli {
        #[command(flatten)]
        args: ListArgs,
    }

    #[test]
    fn test_list_args_build_filter() {
        let cli = ListCli::parse_from([
            "list", "--status", "watching", "--status", "completed", "--type", "anime", "--min-year", "2020", "--sort",
            "rating", "--asc",
        ]);
        let filter = cli.args.to_filter();
        assert_eq!(filter.statuses, vec![MediaStatus::InProgress, MediaStatus::Completed]);
        assert_eq!(filter.types, vec![MediaType::Anime]);
        assert_eq!(filter.release_year, Some(Range { min: Some(2020.0), max: None }));
        assert_eq!(filter.sort, SortField::Rating);
        assert!(filter.ascending);
        assert!(!filter.archived);
    }
}
