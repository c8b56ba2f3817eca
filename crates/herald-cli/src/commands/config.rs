//! Config command - Show the effective queue configuration
//!
//! Usage:
//! ```bash
//! HERALD_QUEUE_MAX_ATTEMPTS=3 herald config
//! herald config --json
//! ```

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use herald_queue::QueueConfig;
use serde_json::json;

use super::format_duration;

/// Arguments for the config command
#[derive(Args)]
pub struct ConfigArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Run the config command
pub fn run(args: ConfigArgs) -> Result<()> {
    let config = QueueConfig::from_env().context("Invalid queue configuration")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&config_json(&config))?);
        return Ok(());
    }

    println!("{}", "Herald queue configuration".bold().cyan());
    println!();

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Setting").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
            Cell::new("Environment").fg(Color::Cyan),
        ]);

    for (setting, value, var) in rows(&config) {
        table.add_row(vec![
            Cell::new(setting),
            Cell::new(value).fg(Color::Green),
            Cell::new(var).fg(Color::DarkGrey),
        ]);
    }

    println!("{table}");
    Ok(())
}

fn rows(config: &QueueConfig) -> Vec<(&'static str, String, &'static str)> {
    vec![
        (
            "min_spacing",
            format_duration(config.min_spacing),
            "HERALD_QUEUE_MIN_SPACING_MS",
        ),
        (
            "max_spacing",
            format_duration(config.max_spacing),
            "HERALD_QUEUE_MAX_SPACING_MS",
        ),
        (
            "backoff_base",
            format_duration(config.backoff_base),
            "HERALD_QUEUE_BACKOFF_BASE_MS",
        ),
        (
            "max_backoff",
            format_duration(config.max_backoff),
            "HERALD_QUEUE_MAX_BACKOFF_MS",
        ),
        (
            "backoff_basis",
            config.backoff_basis.as_str().to_string(),
            "HERALD_QUEUE_BACKOFF_BASIS",
        ),
        (
            "max_attempts",
            config
                .max_attempts
                .map_or_else(|| "unlimited".to_string(), |n| n.to_string()),
            "HERALD_QUEUE_MAX_ATTEMPTS",
        ),
        (
            "operation_timeout",
            config
                .operation_timeout
                .map_or_else(|| "none".to_string(), format_duration),
            "HERALD_QUEUE_TIMEOUT_MS",
        ),
        (
            "dead_letter_capacity",
            config.dead_letter_capacity.to_string(),
            "HERALD_QUEUE_DEAD_LETTER_CAPACITY",
        ),
    ]
}

fn config_json(config: &QueueConfig) -> serde_json::Value {
    let millis = |d: std::time::Duration| u64::try_from(d.as_millis()).unwrap_or(u64::MAX);
    json!({
        "min_spacing_ms": millis(config.min_spacing),
        "max_spacing_ms": millis(config.max_spacing),
        "backoff_base_ms": millis(config.backoff_base),
        "max_backoff_ms": millis(config.max_backoff),
        "backoff_basis": config.backoff_basis,
        "max_attempts": config.max_attempts,
        "operation_timeout_ms": config.operation_timeout.map(millis),
        "dead_letter_capacity": config.dead_letter_capacity,
    })
}
