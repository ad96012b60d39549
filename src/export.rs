//! Output artifacts: wordlists, the user list, and the valid-credential CSV.
//!
//! Generation mode writes `users.txt` plus one wordlist per
//! (pattern, extra-value) combination into the output directory; a pattern
//! that needs `{extra}` is skipped (and logged) when no extra words were
//! configured. With `parallel` set, patterns are generated concurrently.
use std::fs;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};
use rayon::prelude::*;
use serde::Serialize;

use crate::directory::UserRecord;
use crate::pattern::Pattern;
use crate::stream::{Credential, CredentialStream};

pub fn save_users_txt<P: AsRef<Path>>(users: &[UserRecord], path: P) -> Result<()> {
    let mut f = File::create(&path)
        .with_context(|| format!("create {}", path.as_ref().display()))?;
    for user in users {
        writeln!(f, "{}", user.sam_account_name)?;
    }
    Ok(())
}

pub fn save_wordlist<P: AsRef<Path>>(passwords: &[String], path: P) -> Result<()> {
    let mut f = File::create(&path)
        .with_context(|| format!("create {}", path.as_ref().display()))?;
    for password in passwords {
        writeln!(f, "{}", password)?;
    }
    Ok(())
}

#[derive(Serialize)]
struct ValidCredentialRow<'a> {
    username: &'a str,
    password: &'a str,
}

/// CSV of credentials confirmed valid during a spray.
pub fn save_valid_creds_csv<P: AsRef<Path>>(creds: &[Credential], path: P) -> Result<()> {
    let mut wtr = csv::Writer::from_path(&path)
        .with_context(|| format!("create {}", path.as_ref().display()))?;
    for cred in creds {
        wtr.serialize(ValidCredentialRow {
            username: &cred.username,
            password: &cred.password,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

fn wordlists_for_pattern(
    index: usize,
    pattern: &Pattern,
    users: &[UserRecord],
    extras: &[String],
    separator: &str,
    suffix: &str,
    out_dir: &Path,
) -> Result<usize> {
    if pattern.uses_extra() && extras.is_empty() {
        warn!(
            "skipping pattern #{} (uses {{extra}}, but no extra words were provided)",
            index + 1
        );
        return Ok(0);
    }
    let groups: Vec<Option<&str>> = if pattern.uses_extra() {
        extras.iter().map(|e| Some(e.as_str())).collect()
    } else {
        vec![None]
    };

    let mut written = 0;
    for extra in groups {
        let passwords: Vec<String> =
            CredentialStream::new(users, pattern, extra.unwrap_or(""), separator, suffix)
                .map(|r| r.map(|c| c.password))
                .collect::<Result<_, _>>()?;
        if passwords.is_empty() {
            continue;
        }
        let filename = format!("{}.txt", pattern.output_name(extra));
        save_wordlist(&passwords, out_dir.join(&filename))?;
        info!("generated pattern #{}: {}", index + 1, filename);
        written += 1;
    }
    Ok(written)
}

/// Write `users.txt` and every wordlist; returns the number of wordlist
/// files written.
pub fn generate_wordlists(
    users: &[UserRecord],
    patterns: &[Pattern],
    extras: &[String],
    separator: &str,
    suffix: &str,
    out_dir: &Path,
    parallel: bool,
) -> Result<usize> {
    fs::create_dir_all(out_dir).with_context(|| format!("create {}", out_dir.display()))?;
    save_users_txt(users, out_dir.join("users.txt"))?;

    let counts: Vec<usize> = if parallel {
        patterns
            .par_iter()
            .enumerate()
            .map(|(i, p)| wordlists_for_pattern(i, p, users, extras, separator, suffix, out_dir))
            .collect::<Result<_>>()?
    } else {
        patterns
            .iter()
            .enumerate()
            .map(|(i, p)| wordlists_for_pattern(i, p, users, extras, separator, suffix, out_dir))
            .collect::<Result<_>>()?
    };
    Ok(counts.into_iter().sum())
}
