//! Channel self configuration.
//!
//! Before starting an AP the firmware can run a CCA scan over the country's
//! channel plan and report the least busy channel. The scan is driven through
//! `cli_app show self_config` and takes roughly `dwell_time` per channel.

use anyhow::Result;
use std::time::Duration;

use crate::config::Config;
use crate::country::Country;
use crate::error::LauncherError;
use crate::runner::{Cmd, Runner};

/// Upper bound on the number of channels visited by one scan.
const SCAN_CHANNEL_BUDGET: u64 = 26;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelfConfig {
    Channel(u16),
    /// The firmware was built without self configuration.
    Unsupported,
}

/// Clamps the dwell time to 10..=1000 ms and returns it along with the time
/// allowed for the whole scan.
pub fn scan_timeout(dwell_time_ms: u32) -> (u32, Duration) {
    let dwell = dwell_time_ms.clamp(10, 1000);
    (
        dwell,
        Duration::from_millis(u64::from(dwell) * SCAN_CHANNEL_BUDGET),
    )
}

fn is_separator(c: char) -> bool {
    c == ':' || c == ',' || c.is_whitespace()
}

/// Extracts the best channel from the scan report.
///
/// An explicit `best_channel` field wins. Otherwise the report is split on
/// `:`, `,` and whitespace and the channel is the third token from the end,
/// counting the empty token after a trailing separator.
pub fn parse_best_channel(output: &str) -> Option<u16> {
    let mut tokens: Vec<&str> = output
        .split(is_separator)
        .filter(|t| !t.is_empty())
        .collect();

    if let Some(i) = tokens.iter().position(|t| t.eq_ignore_ascii_case("best_channel")) {
        if let Some(ch) = tokens.get(i + 1).and_then(|t| t.parse().ok()) {
            return Some(ch);
        }
    }

    if output.ends_with(is_separator) {
        tokens.push("");
    }
    tokens
        .len()
        .checked_sub(3)
        .and_then(|i| tokens[i].parse().ok())
}

/// Runs the CCA scan for `country`.
pub async fn run_scan(runner: &Runner, cfg: &Config, country: &Country) -> Result<SelfConfig> {
    let (dwell, limit) = scan_timeout(cfg.network.dwell_time);
    let country_dir = country.conf_dir_name();

    println!(
        "country: {}, prefer_bw: {}, dwell_time: {}",
        country_dir, cfg.network.prefer_bw, dwell
    );
    println!(
        "Start CCA scan.... It will take up to {} sec to complete",
        limit.as_secs_f64()
    );

    let cmd = Cmd::new(cfg.paths.cli_app().display().to_string()).args([
        "show".to_string(),
        "self_config".to_string(),
        country_dir.to_string(),
        cfg.network.prefer_bw.to_string(),
        dwell.to_string(),
    ]);

    let output = runner.capture_within(&cmd, Some(limit)).await?;

    if runner.dry_run() {
        println!("[dry-run] self_config: skipping scan and using placeholder channel 1");
        return Ok(SelfConfig::Channel(1));
    }

    let output = output.ok_or(LauncherError::SelfConfigTimeout(limit.as_secs_f64()))?;

    if output.contains("no_self_conf") {
        println!("Target FW does NOT support self configuration. Please check FW");
        tracing::warn!("firmware has no self configuration support");
        return Ok(SelfConfig::Unsupported);
    }

    println!("{}", output.trim_end());
    let channel = parse_best_channel(&output).ok_or_else(|| LauncherError::CommandFailed {
        command: cmd.to_string(),
        reason: "no best channel in scan report".to_string(),
    })?;
    tracing::info!(channel, "self configuration picked channel");

    Ok(SelfConfig::Channel(channel))
}
