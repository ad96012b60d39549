//! Human-readable report rendering for terminal output.
//!
//! Produces the colored end-of-run summary. Rendering returns a `String`
//! so the callers decide where it goes and the tests can snapshot it.
use colored::*;

use crate::stats::RunStatistics;
use crate::stream::Credential;

fn visible_len(s: &str) -> usize {
    // Strip ANSI escape sequences (\x1b[ ... m) to compute printable width
    let mut len = 0;
    let mut iter = s.chars().peekable();
    while let Some(ch) = iter.next() {
        if ch == '\u{1b}' {
            if let Some('[') = iter.peek().cloned() {
                let _ = iter.next();
            }
            for c in iter.by_ref() {
                if c == 'm' {
                    break;
                }
            }
        } else {
            len += 1;
        }
    }
    len
}

fn section_header(title: &str) -> String {
    let len = visible_len(title);
    let mut s = String::new();
    s.push('\n');
    s.push_str(title);
    s.push('\n');
    s.push_str(&"─".repeat(len));
    s.push_str("\n\n");
    s
}

/// Render the end-of-spray summary. `graph_enabled` controls whether the
/// "Marked as owned" line is shown.
pub fn render_attack_summary(
    stats: &RunStatistics,
    valid: &[Credential],
    graph_enabled: bool,
) -> String {
    let mut out = String::new();
    out.push_str(&section_header(&"Attack Results".bold().cyan().to_string()));

    let mut lines: Vec<String> = Vec::new();
    lines.push(format!(
        "  Valid credentials: {}",
        stats.valid_credentials.to_string().green()
    ));
    for cred in valid {
        lines.push(format!("    {}:{}", cred.username, cred.password.red()));
    }
    lines.push(format!(
        "  Expired passwords: {}",
        stats.expired_passwords.to_string().yellow()
    ));
    lines.push(format!(
        "  Locked accounts:   {}",
        stats.locked_accounts.to_string().red()
    ));
    lines.push(format!("  Wrong passwords:   {}", stats.wrong_passwords));
    lines.push(format!("  Other errors:      {}", stats.other_errors));
    if graph_enabled {
        lines.push(format!(
            "  Marked as owned:   {}",
            stats.marked_owned.to_string().green()
        ));
    }
    lines.push(format!(
        "  Total attempts:    {}",
        stats.total_attempts().to_string().blue()
    ));
    let rate = format!("{:.2}%", stats.success_rate() * 100.0);
    let rate = if stats.valid_credentials > 0 {
        rate.green()
    } else {
        rate.red()
    };
    lines.push(format!("  Success rate:      {}", rate));

    for line in lines {
        out.push_str(&line);
        out.push('\n');
    }
    out
}
