use super::{load_config, load_credentials, load_paths, prompts};
use crate::output::Output;
use crate::ConfigCommands;
use chrono::{Duration as ChronoDuration, Local, Utc};
use color_eyre::Result;
use comfy_table::{Cell, Table};
use media_sync_config::{Config, CredentialStore, PathManager};
use owo_colors::OwoColorize;
use serde_json::json;

pub async fn run_config(cmd: ConfigCommands, output: &Output) -> Result<()> {
    match cmd {
        ConfigCommands::Show { full } => show_config(full, output),
        ConfigCommands::Remote {
            url,
            enabled,
            timeout,
            api_key,
        } => configure_remote(url, enabled, timeout, api_key, output),
        ConfigCommands::Login { token, expires_in } => login(token, expires_in, output),
        ConfigCommands::Logout => logout(output),
        ConfigCommands::Sync {
            interval,
            max_rejections,
            history_limit,
        } => configure_sync(interval, max_rejections, history_limit, output),
    }
}

fn show_config(full: bool, output: &Output) -> Result<()> {
    let paths = load_paths()?;
    let config_file = paths.config_file();
    let config = load_config(&paths)?;
    let credentials = load_credentials(&paths)?;

    let secret = |value: Option<&String>| match value {
        Some(v) if full => v.clone(),
        Some(v) => mask_string(v),
        None => "<not set>".to_string(),
    };
    let api_key = secret(credentials.get_remote_api_key());
    let access_token = secret(credentials.get_remote_access_token());
    let token_expires = credentials
        .get_remote_token_expires()
        .map(|at| at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string());

    let data = json!({
        "config_file": config_file.display().to_string(),
        "database": paths.database_file().display().to_string(),
        "remote": {
            "enabled": config.remote.enabled,
            "url": config.remote.url,
            "timeout_seconds": config.remote.timeout_seconds,
            "api_key": api_key,
            "access_token": access_token,
            "token_expires": token_expires,
        },
        "sync": config.sync,
        "daemon": config.daemon,
    });

    output.emit(&data, || {
        if !config_file.exists() {
            println!(
                "{} No configuration file at {}; showing defaults",
                "⚠".yellow(),
                config_file.display()
            );
        }

        let mut files = Table::new();
        files.set_header(vec![
            Cell::new("Config File").add_attribute(comfy_table::Attribute::Bold),
            Cell::new(config_file.display().to_string()),
        ]);
        files.add_row(vec![Cell::new("Database"), Cell::new(paths.database_file().display().to_string())]);
        files.load_preset(comfy_table::presets::UTF8_FULL);
        files.apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);
        println!("{}", files);
        println!();

        let mut remote = Table::new();
        remote.set_header(vec![Cell::new("Remote Store")
            .fg(comfy_table::Color::Cyan)
            .add_attribute(comfy_table::Attribute::Bold)]);
        remote.add_row(vec![
            Cell::new("Enabled"),
            Cell::new(if config.remote.enabled {
                "✓".green().to_string()
            } else {
                "✗".red().to_string()
            }),
        ]);
        remote.add_row(vec![
            Cell::new("URL"),
            Cell::new(if config.remote.url.is_empty() { "<not set>" } else { config.remote.url.as_str() }),
        ]);
        remote.add_row(vec![Cell::new("Timeout"), Cell::new(format!("{}s", config.remote.timeout_seconds))]);
        remote.add_row(vec![Cell::new("API key"), Cell::new(&api_key)]);
        remote.add_row(vec![Cell::new("Access token"), Cell::new(&access_token)]);
        if let Some(expires) = &token_expires {
            remote.add_row(vec![Cell::new("Token expires"), Cell::new(expires)]);
        }
        remote.load_preset(comfy_table::presets::UTF8_FULL);
        remote.apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);
        println!("{}", remote);
        println!();

        let mut sync = Table::new();
        sync.set_header(vec![Cell::new("Sync Options")
            .fg(comfy_table::Color::Cyan)
            .add_attribute(comfy_table::Attribute::Bold)]);
        sync.add_row(vec![Cell::new("Interval"), Cell::new(format!("{}s", config.sync.interval_seconds))]);
        sync.add_row(vec![Cell::new("Max rejections"), Cell::new(config.sync.max_rejections)]);
        sync.add_row(vec![Cell::new("History pull limit"), Cell::new(config.sync.history_pull_limit)]);
        sync.add_row(vec![
            Cell::new("Probe interval"),
            Cell::new(format!("{}s", config.daemon.probe_interval_seconds)),
        ]);
        sync.add_row(vec![Cell::new("Sync on daemon start"), Cell::new(config.daemon.run_on_startup)]);
        sync.load_preset(comfy_table::presets::UTF8_FULL);
        sync.apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);
        println!("{}", sync);
    });
    Ok(())
}

fn configure_remote(
    url_arg: Option<String>,
    enabled_arg: Option<bool>,
    timeout_arg: Option<u64>,
    api_key_arg: Option<String>,
    output: &Output,
) -> Result<()> {
    let paths = load_paths()?;
    let config_file = paths.config_file();
    let mut config = Config::load_or_default(&config_file)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to load config from {}: {}", config_file.display(), e))?;
    let mut credentials = load_credentials(&paths)?;

    print_section_header("Remote Store Setup", output);

    let url = match url_arg {
        Some(url) => url,
        None => loop {
            let current = (!config.remote.url.is_empty()).then_some(config.remote.url.as_str());
            let input = prompts::prompt_string("Project URL", current)?;
            match validate_url(&input) {
                Ok(()) => break input,
                Err(e) => output.error(format!("Validation error: {}", e)),
            }
        },
    };
    validate_url(&url).map_err(|e| color_eyre::eyre::eyre!("{}", e))?;
    config.remote.url = url.trim().trim_end_matches('/').to_string();
    config.remote.enabled = enabled_arg.unwrap_or(true);
    if let Some(timeout) = timeout_arg {
        config.remote.timeout_seconds = timeout;
    }

    let api_key = match api_key_arg {
        Some(key) => Some(key),
        None if credentials.get_remote_api_key().is_none() => Some(prompts::prompt_password("API key")?),
        None => None,
    };
    if let Some(key) = api_key {
        let key = key.trim().to_string();
        if key.is_empty() {
            return Err(color_eyre::eyre::eyre!("API key cannot be empty"));
        }
        credentials.set_remote_api_key(key);
    }

    config
        .validate()
        .map_err(|e| color_eyre::eyre::eyre!("Invalid configuration: {}", e))?;
    save(&config, &credentials, &paths)?;

    output.success("Remote store configuration saved!");
    output.println(format!("  URL: {}", config.remote.url));
    output.println(format!("  Enabled: {}", config.remote.enabled));
    Ok(())
}

fn login(token_arg: Option<String>, expires_in: Option<i64>, output: &Output) -> Result<()> {
    let paths = load_paths()?;
    let mut credentials = load_credentials(&paths)?;

    let token = match token_arg {
        Some(token) => token,
        None => prompts::prompt_password("Access token")?,
    };
    let token = token.trim().to_string();
    if token.is_empty() {
        return Err(color_eyre::eyre::eyre!("Access token cannot be empty"));
    }

    credentials.clear_session();
    credentials.set_remote_access_token(token);
    if let Some(seconds) = expires_in.filter(|s| *s > 0) {
        credentials.set_remote_token_expires(Utc::now() + ChronoDuration::seconds(seconds));
    }
    credentials
        .save()
        .map_err(|e| color_eyre::eyre::eyre!("Failed to save credentials: {}", e))?;

    output.success("Signed in; writes now use the stored access token");
    Ok(())
}

fn logout(output: &Output) -> Result<()> {
    let paths = load_paths()?;
    let mut credentials = load_credentials(&paths)?;
    if credentials.get_remote_access_token().is_none() {
        output.info("No access token stored");
        return Ok(());
    }
    credentials.clear_session();
    credentials
        .save()
        .map_err(|e| color_eyre::eyre::eyre!("Failed to save credentials: {}", e))?;
    output.success("Signed out. Run 'mediashelf clear --data' to also remove the local library.");
    Ok(())
}

fn configure_sync(
    interval: Option<u64>,
    max_rejections: Option<u32>,
    history_limit: Option<usize>,
    output: &Output,
) -> Result<()> {
    let paths = load_paths()?;
    let config_file = paths.config_file();
    let mut config = Config::load_or_default(&config_file)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to load config from {}: {}", config_file.display(), e))?;

    let interactive = interval.is_none() && max_rejections.is_none() && history_limit.is_none();
    if interactive {
        print_section_header("Sync Options Configuration", output);
        let seconds = prompts::prompt_number("Seconds between daemon reconciles", Some(clamp_u32(config.sync.interval_seconds)))?;
        config.sync.interval_seconds = u64::from(seconds);
        config.sync.max_rejections = prompts::prompt_number(
            "Rejections before a write is dead-lettered",
            Some(config.sync.max_rejections),
        )?;
        let limit = prompts::prompt_number(
            "History events pulled per reconcile (0 disables)",
            Some(clamp_u32(config.sync.history_pull_limit as u64)),
        )?;
        config.sync.history_pull_limit = limit as usize;
    } else {
        if let Some(interval) = interval {
            config.sync.interval_seconds = interval;
        }
        if let Some(max_rejections) = max_rejections {
            config.sync.max_rejections = max_rejections;
        }
        if let Some(history_limit) = history_limit {
            config.sync.history_pull_limit = history_limit;
        }
    }

    config
        .validate()
        .map_err(|e| color_eyre::eyre::eyre!("Invalid configuration: {}", e))?;
    config
        .save_to_file(&config_file)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to save config to {}: {}", config_file.display(), e))?;
    output.success("Sync options saved!");
    Ok(())
}

fn save(config: &Config, credentials: &CredentialStore, paths: &PathManager) -> Result<()> {
    let config_file = paths.config_file();
    config
        .save_to_file(&config_file)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to save config to {}: {}", config_file.display(), e))?;
    credentials
        .save()
        .map_err(|e| color_eyre::eyre::eyre!("Failed to save credentials to {}: {}", paths.credentials_file().display(), e))?;
    Ok(())
}

fn clamp_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

fn mask_string(s: &str) -> String {
    if s.is_empty() {
        return "<not set>".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}***{}", head, tail)
}

fn validate_url(input: &str) -> Result<(), &'static str> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err("URL cannot be empty");
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err("URL must start with http:// or https://");
    }
    Ok(())
}

/// Print a formatted section header
fn print_section_header(title: &str, output: &Output) {
    output.println("");
    output.println(format!("{}", title.bold().bright_cyan()));
    output.println(format!("{}", "─".repeat(title.len()).bright_cyan()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_string() {
        assert_eq!(mask_string(""), "<not set>");
        assert_eq!(mask_string("abc"), "***");
        assert_eq!(mask_string("sb_secret_key"), "sb***ey");
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://xyz.supabase.co").is_ok());
        assert!(validate_url("  ").is_err());
        assert!(validate_url("xyz.supabase.co").is_err());
    }
}
