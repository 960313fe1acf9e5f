// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Utility functions for tubegrab.
//!
//! Size, percentage and duration formatting shared by the progress reporter,
//! the download summary and the CLI.

use std::time::Duration;

const KB: f64 = 1024.0;
const MB: f64 = KB * 1024.0;
const GB: f64 = MB * 1024.0;

/// Abbreviate a byte count using binary (1024-based) units.
///
/// Values strictly above a unit threshold are shown with one decimal place;
/// anything up to and including 1024 is printed as a plain integer.
///
/// # Examples
///
/// ```
/// use tubegrab::utils::abbr;
///
/// assert_eq!(abbr(500), "500");
/// assert_eq!(abbr(2048), "2.0KB");
/// assert_eq!(abbr(5 * 1024 * 1024), "5.0MB");
/// ```
pub fn abbr(bytes: u64) -> String {
    let size = bytes as f64;
    if size > GB {
        format!("{:.1}GB", size / GB)
    } else if size > MB {
        format!("{:.1}MB", size / MB)
    } else if size > KB {
        format!("{:.1}KB", size / KB)
    } else {
        bytes.to_string()
    }
}

/// Integer percentage of `done` over `total`, truncated. Zero total reads as 0.
pub fn percent(done: u64, total: u64) -> u64 {
    if total == 0 {
        return 0;
    }
    ((done as u128 * 100) / total as u128) as u64
}

/// Format a duration the compact way: `0s`, `250ms`, `5s`, `1m5s`, `1h0m5s`.
pub fn format_duration(duration: Duration) -> String {
    if duration.is_zero() {
        return "0s".to_string();
    }

    if duration < Duration::from_millis(1) {
        return format!("{}µs", duration.as_micros());
    }

    if duration < Duration::from_secs(1) {
        let millis = duration.as_nanos() as f64 / 1_000_000.0;
        return format!("{}ms", trim_fraction(&format!("{:.6}", millis)));
    }

    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    let nanos = duration.subsec_nanos();

    let seconds = if nanos == 0 {
        secs.to_string()
    } else {
        trim_fraction(&format!("{}.{:09}", secs, nanos))
    };

    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

fn trim_fraction(s: &str) -> String {
    if !s.contains('.') {
        return s.to_string();
    }
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}
