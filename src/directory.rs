//! User and policy data model plus the directory collaborator seam.
//!
//! The spray engine never speaks a directory wire protocol. It consumes
//! [`UserRecord`]s and a [`PasswordPolicy`] through the [`DirectoryClient`]
//! trait; [`FileDirectory`] is the shipped implementation, reading a JSON
//! Lines users export (one object per line, Active Directory attribute
//! names) and an optional policy document.
use std::fs;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use log::{debug, info, warn};
use serde::Deserialize;

/// Lockout-relevant slice of a domain (or per-user PSO) password policy.
/// A `lockout_threshold` of 0 means the policy never locks accounts out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PasswordPolicy {
    #[serde(rename = "lockoutThreshold")]
    pub lockout_threshold: u32,
    /// Window after which the directory resets `badPwdCount`, in seconds.
    /// Informational only; logged so operators know when counters clear.
    #[serde(rename = "observationWindowSecs", default)]
    pub observation_window_secs: u64,
}

impl PasswordPolicy {
    pub const NO_LOCKOUT: PasswordPolicy = PasswordPolicy {
        lockout_threshold: 0,
        observation_window_secs: 0,
    };
}

/// One enumerated account, immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub display_name: String,
    pub sam_account_name: String,
    pub pwd_last_set: Option<DateTime<Utc>>,
    pub when_created: Option<DateTime<Utc>>,
    pub bad_pwd_count: u32,
    /// Resultant PSO, when one applies to this user and is readable.
    pub pso: Option<PasswordPolicy>,
}

/// Contract the engine consumes; implementations own query execution and
/// must tolerate (and report, but not crash on) missing optional attributes.
pub trait DirectoryClient {
    fn fetch_users(&self) -> Result<Vec<UserRecord>>;
    fn fetch_password_policy(&self) -> Result<PasswordPolicy>;
}

/// Wire shape of one users-export line. Field names match the attribute
/// list the tool asks an enumeration step to export.
#[derive(Debug, Deserialize)]
struct UserExportRecord {
    name: Option<String>,
    #[serde(rename = "sAMAccountName")]
    sam_account_name: String,
    #[serde(rename = "pwdLastSet")]
    pwd_last_set: Option<i64>,
    #[serde(rename = "whenCreated")]
    when_created: Option<i64>,
    #[serde(rename = "badPwdCount", default)]
    bad_pwd_count: u32,
    #[serde(rename = "msDS-ResultantPSO")]
    pso: Option<PasswordPolicy>,
}

impl UserExportRecord {
    fn into_user(self) -> UserRecord {
        UserRecord {
            display_name: self
                .name
                .unwrap_or_else(|| self.sam_account_name.clone()),
            sam_account_name: self.sam_account_name,
            pwd_last_set: epoch_opt(self.pwd_last_set),
            when_created: epoch_opt(self.when_created),
            bad_pwd_count: self.bad_pwd_count,
            pso: self.pso,
        }
    }
}

/// Directories export `pwdLastSet` as epoch seconds; 0 (or a negative
/// sentinel) means the attribute was never set.
fn epoch_opt(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.filter(|s| *s > 0)
        .and_then(|s| Utc.timestamp_opt(s, 0).single())
}

/// File-backed [`DirectoryClient`] over a JSON Lines users export and an
/// optional policy JSON document.
#[derive(Debug)]
pub struct FileDirectory {
    users_path: PathBuf,
    policy_path: Option<PathBuf>,
}

impl FileDirectory {
    pub fn new<P: AsRef<Path>>(users_path: P, policy_path: Option<P>) -> Self {
        Self {
            users_path: users_path.as_ref().to_path_buf(),
            policy_path: policy_path.map(|p| p.as_ref().to_path_buf()),
        }
    }
}

impl DirectoryClient for FileDirectory {
    fn fetch_users(&self) -> Result<Vec<UserRecord>> {
        let file = File::open(&self.users_path)
            .with_context(|| format!("open {}", self.users_path.display()))?;
        let mut users = Vec::new();
        let mut malformed = 0usize;
        for line in BufReader::new(file).lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<UserExportRecord>(line) {
                Ok(record) => users.push(record.into_user()),
                Err(e) => {
                    malformed += 1;
                    debug!("skipping malformed user record: {}", e);
                }
            }
        }
        if malformed > 0 {
            warn!("skipped {} malformed user record(s)", malformed);
        }
        info!("retrieved {} users", users.len());
        Ok(users)
    }

    fn fetch_password_policy(&self) -> Result<PasswordPolicy> {
        let Some(path) = &self.policy_path else {
            warn!("no domain policy provided; assuming no lockout threshold");
            return Ok(PasswordPolicy::NO_LOCKOUT);
        };
        let text =
            fs::read_to_string(path).with_context(|| format!("open {}", path.display()))?;
        let policy: PasswordPolicy = serde_json::from_str(&text)
            .with_context(|| format!("parse policy {}", path.display()))?;
        Ok(policy)
    }
}
