//! CLI entrypoint for `spearspray`.
//!
//! Parses command-line arguments, loads and validates the pattern file,
//! fetches users and the domain policy from a directory export, applies the
//! lockout-avoidance filters, and then either generates wordlists (the
//! default) or, when a probe command is configured, sprays the selected
//! pattern and prints the attack summary.
use std::fs;
use std::ops::RangeInclusive;
use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use log::{LevelFilter, error, info, warn};
use spearspray::{
    directory::{DirectoryClient, FileDirectory},
    export,
    lockout,
    pattern,
    probe::CommandProbe,
    report,
    spray::{self, SprayOptions},
    stats::OutcomeAggregator,
    stream::CredentialStream,
};

#[derive(Parser, Debug)]
#[command(
    name = "spearspray-rs",
    version,
    about = "Pattern-based password spraying toolkit (Rust)"
)]
struct Args {
    /// Path to the users export (one JSON object per line)
    #[arg(short = 'U', long = "users")]
    users: PathBuf,

    /// Path to the domain password policy JSON
    #[arg(long = "policy")]
    policy: Option<PathBuf>,

    /// File with password patterns
    #[arg(short = 'i', long = "input", default_value = "patterns.txt")]
    input: PathBuf,

    /// Folder where generated wordlists and results are stored
    #[arg(short = 'o', long = "output", default_value = "wordlists")]
    output: PathBuf,

    /// Comma-separated extra words for patterns that use {extra}
    #[arg(short = 'x', long = "extra")]
    extra: Option<String>,

    /// Characters inserted where a pattern uses {separator}
    #[arg(long = "separator")]
    separator: Option<String>,

    /// Characters appended where a pattern uses {suffix}
    #[arg(long = "suffix")]
    suffix: Option<String>,

    /// Authentication probe command; enables spray mode. The credential is
    /// passed via SPEARSPRAY_USERNAME/SPEARSPRAY_PASSWORD and the exit
    /// status classifies the attempt (0 valid, 10 expired, 11 locked,
    /// 12 wrong password, 13 unknown principal)
    #[arg(long = "probe-cmd")]
    probe_cmd: Option<PathBuf>,

    /// 1-based index of the pattern to spray
    #[arg(short = 'p', long = "pattern", default_value_t = 1)]
    pattern: usize,

    /// Number of spray workers
    #[arg(short = 't', long = "threads", default_value_t = 5)]
    threads: usize,

    /// Per-dispatch jitter in milliseconds: MAX or MIN-MAX
    #[arg(short = 'j', long = "jitter", default_value = "0")]
    jitter: String,

    /// Maximum authentication requests per second (0 = unlimited)
    #[arg(long = "max-rps", default_value_t = 0.0)]
    max_rps: f64,

    /// Failed attempts kept in reserve below the lockout threshold
    #[arg(long = "safety-margin", default_value_t = 1)]
    safety_margin: u32,

    /// Generate wordlists for all patterns in parallel
    #[arg(long = "parallel")]
    parallel: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,

    /// Control color output (auto, always, never)
    #[arg(long = "color", value_enum, default_value_t = ColorChoice::Auto)]
    color: ColorChoice,

    /// Suppress banner and summary output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorChoice {
    Auto,
    Always,
    Never,
}

const BANNER: &str = r#"
╔═╗┌─┐┌─┐┌─┐┬─┐╔═╗┌─┐┬─┐┌─┐┬ ┬
╚═╗├─┘├┤ ├─┤├┬┘╚═╗├─┘├┬┘├─┤└┬┘
╚═╝┴  └─┘┴ ┴┴└─╚═╝┴  ┴└─┴ ┴ ┴
"#;

fn init_logger(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let _ = env_logger::Builder::from_default_env()
        .filter_level(level)
        .try_init();
}

fn verify_inputs(args: &Args) -> Result<()> {
    if !args.users.exists() {
        bail!("users export not found: {}", args.users.display());
    }
    if !args.input.exists() {
        bail!("pattern file not found: {}", args.input.display());
    }
    Ok(())
}

/// `MAX` or `MIN-MAX`, in milliseconds.
fn parse_jitter(s: &str) -> Result<RangeInclusive<u64>> {
    let range = match s.split_once('-') {
        Some((min, max)) => {
            let min: u64 = min.trim().parse()?;
            let max: u64 = max.trim().parse()?;
            min..=max
        }
        None => 0..=s.trim().parse()?,
    };
    if range.start() > range.end() {
        bail!("jitter range is inverted: {}", s);
    }
    Ok(range)
}

fn split_extras(extra: Option<&str>) -> Vec<String> {
    extra
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|w| !w.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn main() {
    let args = Args::parse();
    init_logger(args.verbose);
    match args.color {
        ColorChoice::Always => {
            colored::control::set_override(true);
        }
        ColorChoice::Never => {
            colored::control::set_override(false);
        }
        ColorChoice::Auto => {}
    }
    if !args.quiet {
        println!("{}", BANNER.bold().cyan());
    }
    if let Err(e) = verify_inputs(&args) {
        error!("{}", e);
        std::process::exit(2);
    }
    let jitter = match parse_jitter(&args.jitter) {
        Ok(j) => j,
        Err(e) => {
            error!("invalid --jitter value: {}", e);
            std::process::exit(2);
        }
    };

    // Patterns first: a bad pattern file should fail before any fetch.
    let patterns = match pattern::load_patterns(&args.input) {
        Ok(p) => p,
        Err(e) => {
            error!("failed to load patterns: {}", e);
            std::process::exit(3);
        }
    };
    if patterns.is_empty() {
        error!("no patterns found in {}", args.input.display());
        std::process::exit(3);
    }
    if let Err(e) = pattern::validate_patterns(&patterns) {
        error!("{}", e);
        std::process::exit(4);
    }
    info!(
        "{} patterns found in {}",
        patterns.len(),
        args.input.display()
    );

    let policy_path = args.policy.clone().filter(|p| {
        let exists = p.exists();
        if !exists {
            warn!("policy file not found: {} (continuing)", p.display());
        }
        exists
    });
    let directory = FileDirectory::new(args.users.clone(), policy_path);
    let users = match directory.fetch_users() {
        Ok(u) => u,
        Err(e) => {
            error!("failed to load users: {:#}", e);
            std::process::exit(3);
        }
    };
    let policy = match directory.fetch_password_policy() {
        Ok(p) => p,
        Err(e) => {
            error!("failed to load domain policy: {:#}", e);
            std::process::exit(3);
        }
    };
    if policy.lockout_threshold == 0 {
        warn!("domain policy has no lockout threshold; all users are eligible");
    } else {
        info!(
            "domain lockout threshold {} (observation window {}s)",
            policy.lockout_threshold, policy.observation_window_secs
        );
    }

    let users = lockout::filter_by_pso(users, &policy, args.safety_margin);
    let users = lockout::filter_by_threshold(users, &policy, args.safety_margin);
    if users.is_empty() {
        error!("no users remaining after lockout filtering");
        std::process::exit(3);
    }

    let extras = split_extras(args.extra.as_deref());
    let separator = args.separator.clone().unwrap_or_default();
    let suffix = args.suffix.clone().unwrap_or_default();

    match &args.probe_cmd {
        Some(cmd) => {
            let Some(selected) = args.pattern.checked_sub(1).and_then(|i| patterns.get(i))
            else {
                error!(
                    "pattern index {} out of range (1..={})",
                    args.pattern,
                    patterns.len()
                );
                std::process::exit(2);
            };
            let groups: Vec<Option<&str>> = if selected.uses_extra() {
                if extras.is_empty() {
                    error!(
                        "pattern #{} uses {{extra}}, but no extra words were provided (-x)",
                        args.pattern
                    );
                    std::process::exit(2);
                }
                extras.iter().map(|e| Some(e.as_str())).collect()
            } else {
                vec![None]
            };

            warn!(
                "password spraying will be performed against {} users",
                users.len()
            );
            let probe = CommandProbe::new(cmd);
            let aggregator = OutcomeAggregator::new(None);
            let options = SprayOptions {
                workers: args.threads,
                max_rps: args.max_rps,
                jitter_ms: jitter,
            };
            let mut fatal = None;
            for extra in groups {
                let stream = CredentialStream::new(
                    &users,
                    selected,
                    extra.unwrap_or(""),
                    &separator,
                    &suffix,
                );
                if let Err(e) = spray::run(stream, &probe, &aggregator, &options) {
                    fatal = Some(e);
                    break;
                }
            }

            // The summary reflects whatever completed, fatal abort included.
            let stats = aggregator.summary();
            let valid = aggregator.valid_credentials();
            if !args.quiet {
                println!("{}", report::render_attack_summary(&stats, &valid, false));
            }
            if !valid.is_empty() {
                if let Err(e) = fs::create_dir_all(&args.output) {
                    error!(
                        "failed to create output directory {}: {}",
                        args.output.display(),
                        e
                    );
                    std::process::exit(5);
                }
                let ts = chrono::Local::now().format("%Y.%m.%d_%H.%M.%S");
                let path = args.output.join(format!("spearspray_valid_creds_{}.csv", ts));
                if let Err(e) = export::save_valid_creds_csv(&valid, &path) {
                    error!("failed to write {}: {}", path.display(), e);
                    std::process::exit(5);
                }
                info!("valid credentials written to {}", path.display());
            }
            if let Some(e) = fatal {
                error!("spray aborted: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            match export::generate_wordlists(
                &users,
                &patterns,
                &extras,
                &separator,
                &suffix,
                &args.output,
                args.parallel,
            ) {
                Ok(written) => {
                    info!(
                        "{} wordlist(s) saved to '{}'",
                        written,
                        args.output.display()
                    );
                }
                Err(e) => {
                    error!("failed to generate wordlists: {:#}", e);
                    std::process::exit(5);
                }
            }
        }
    }
}
