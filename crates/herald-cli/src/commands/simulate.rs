//! Simulate command - Push mock posts through a throttled client
//!
//! Usage:
//! ```bash
//! herald simulate --ops 5 --fail-first 2 --fast
//! herald simulate --platform farcaster --faithful
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use futures::future::join_all;
use herald_client::{ClientError, ClientHub, Credential, MockSession, Platform, PostId};
use herald_queue::{QueueConfig, QueueError, QueueStatsSnapshot};
use tracing::info;

use super::format_duration;
use crate::{print_error, print_success, print_warning};

/// Arguments for the simulate command
#[derive(Args)]
pub struct SimulateArgs {
    /// Number of posts to submit
    #[arg(long, default_value_t = 5)]
    pub ops: usize,

    /// Number of attempts that fail before the mock platform recovers
    #[arg(long, default_value_t = 0)]
    pub fail_first: u32,

    /// Use legacy pacing: queue-depth backoff, unlimited retries
    #[arg(long, conflicts_with = "fast")]
    pub faithful: bool,

    /// Use millisecond-scale delays instead of the configured ones
    #[arg(long)]
    pub fast: bool,

    /// Platform the mock session pretends to be
    #[arg(long, default_value = "twitter")]
    pub platform: Platform,

    /// Account name for the mock session
    #[arg(long, default_value = "herald")]
    pub account: String,

    /// Simulated latency of each platform call in milliseconds
    #[arg(long, default_value_t = 20)]
    pub latency_ms: u64,
}

/// Outcome of one submitted post
struct OpReport {
    index: usize,
    result: Result<PostId, QueueError<ClientError>>,
    elapsed: Duration,
}

/// Run the simulate command
pub async fn run(args: SimulateArgs) -> Result<()> {
    let config = if args.faithful {
        QueueConfig::faithful()
    } else if args.fast {
        QueueConfig::fast()
    } else {
        QueueConfig::from_env().context("Invalid queue configuration")?
    };

    let hub: ClientHub<MockSession> = ClientHub::new(config);
    let credential = Credential::new(args.platform, args.account.clone());
    let latency = Duration::from_millis(args.latency_ms);
    let client = hub
        .client(credential.clone(), || {
            let credential = credential.clone();
            async move { Ok(MockSession::new(credential).with_latency(latency)) }
        })
        .await
        .context("Failed to create mock session")?;
    client.session().fail_next(args.fail_first);

    println!(
        "{} Submitting {} posts as {}",
        "⚙".blue(),
        args.ops.to_string().green(),
        credential.to_string().green()
    );
    info!(ops = args.ops, fail_first = args.fail_first, "Starting simulation");

    let started = Instant::now();
    // join_all polls in order, so submissions keep their index order.
    let calls = (0..args.ops).map(|index| {
        let client = client.clone();
        let text = format!("simulated post #{}", index + 1);
        async move {
            let result = client
                .call("post", move |session: Arc<MockSession>| {
                    let text = text.clone();
                    async move { session.post(&text).await }
                })
                .await;
            OpReport {
                index,
                result,
                elapsed: started.elapsed(),
            }
        }
    });
    let reports = join_all(calls).await;

    println!();
    print_reports(&reports);
    println!();
    print_stats(&client.queue().stats());

    let dead_letters = client.queue().take_dead_letters();
    if !dead_letters.is_empty() {
        println!();
        print_warning(&format!("{} operation(s) abandoned", dead_letters.len()));
        for letter in &dead_letters {
            println!(
                "  {} {} after {} attempts: {}",
                "•".yellow(),
                letter.id.to_string().dimmed(),
                letter.attempts,
                letter.last_error
            );
        }
    }

    hub.shutdown_all();

    let succeeded = reports.iter().filter(|r| r.result.is_ok()).count();
    let summary = format!(
        "{}/{} posts delivered in {}",
        succeeded,
        reports.len(),
        format_duration(started.elapsed())
    );
    println!();
    if succeeded == reports.len() {
        print_success(&summary);
    } else {
        print_error(&summary);
    }
    Ok(())
}

fn print_reports(reports: &[OpReport]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("#").fg(Color::Cyan),
            Cell::new("Result").fg(Color::Cyan),
            Cell::new("Finished at").fg(Color::Cyan),
        ]);

    for report in reports {
        let result = match &report.result {
            Ok(id) => Cell::new(format!("post {}", id)).fg(Color::Green),
            Err(e) => Cell::new(e.to_string()).fg(Color::Red),
        };
        table.add_row(vec![
            Cell::new(report.index + 1),
            result,
            Cell::new(format_duration(report.elapsed)),
        ]);
    }

    println!("{table}");
}

fn print_stats(stats: &QueueStatsSnapshot) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Counter").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);

    let rows: [(&str, String); 9] = [
        ("submitted", stats.submitted.to_string()),
        ("succeeded", stats.succeeded.to_string()),
        ("failed attempts", stats.failed_attempts.to_string()),
        ("retries", stats.retries.to_string()),
        ("abandoned", stats.abandoned.to_string()),
        ("rejected", stats.rejected.to_string()),
        ("drain restarts", stats.drain_restarts.to_string()),
        ("outstanding", stats.outstanding().to_string()),
        ("failure rate", format!("{:.1}%", stats.failure_rate() * 100.0)),
    ];
    for (counter, value) in rows {
        table.add_row(vec![Cell::new(counter), Cell::new(value)]);
    }

    println!("{table}");
}
