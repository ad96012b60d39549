//! Outcome classification and run statistics.
//!
//! Every authentication probe resolves to one [`AttemptOutcome`]; the
//! [`OutcomeAggregator`] folds them into monotone counters that survive a
//! fatal abort, keeps the confirmed-valid credentials for export, and
//! optionally forwards them to a [`GraphStore`].
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, info, warn};

use crate::stream::Credential;

/// The five expected classifications of one authentication probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    ValidCredential,
    ExpiredPassword,
    AccountLocked,
    /// The principal exists; the password is wrong.
    WrongPassword,
    /// Any other recognized failure, e.g. an unknown principal.
    Other,
}

/// The tagged result of one probe, carrying the originating credential.
#[derive(Debug, Clone)]
pub struct AttemptOutcome {
    pub credential: Credential,
    pub kind: OutcomeKind,
    pub detail: Option<String>,
}

impl AttemptOutcome {
    pub fn new(credential: Credential, kind: OutcomeKind) -> Self {
        Self {
            credential,
            kind,
            detail: None,
        }
    }

    pub fn with_detail(
        credential: Credential,
        kind: OutcomeKind,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            credential,
            kind,
            detail: Some(detail.into()),
        }
    }
}

/// Graph-store collaborator: marks a principal as owned. `mark_owned`
/// returns true only when the call changed state (the principal existed and
/// was not already marked).
pub trait GraphStore: Sync {
    fn mark_owned(&self, sam_account_name: &str) -> bool;
    fn close(&self) {}
}

/// Point-in-time counter snapshot for one run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStatistics {
    pub valid_credentials: u64,
    pub expired_passwords: u64,
    pub locked_accounts: u64,
    pub wrong_passwords: u64,
    pub other_errors: u64,
    pub marked_owned: u64,
}

impl RunStatistics {
    pub fn total_attempts(&self) -> u64 {
        self.valid_credentials
            + self.expired_passwords
            + self.locked_accounts
            + self.wrong_passwords
            + self.other_errors
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.total_attempts();
        if total == 0 {
            0.0
        } else {
            self.valid_credentials as f64 / total as f64
        }
    }
}

/// Thread-safe accumulator, shared by reference across all spray workers.
pub struct OutcomeAggregator<'a> {
    valid_credentials: AtomicU64,
    expired_passwords: AtomicU64,
    locked_accounts: AtomicU64,
    wrong_passwords: AtomicU64,
    other_errors: AtomicU64,
    marked_owned: AtomicU64,
    valid: Mutex<Vec<Credential>>,
    graph: Option<&'a dyn GraphStore>,
}

impl<'a> OutcomeAggregator<'a> {
    pub fn new(graph: Option<&'a dyn GraphStore>) -> Self {
        Self {
            valid_credentials: AtomicU64::new(0),
            expired_passwords: AtomicU64::new(0),
            locked_accounts: AtomicU64::new(0),
            wrong_passwords: AtomicU64::new(0),
            other_errors: AtomicU64::new(0),
            marked_owned: AtomicU64::new(0),
            valid: Mutex::new(Vec::new()),
            graph,
        }
    }

    pub fn record(&self, outcome: AttemptOutcome) {
        let AttemptOutcome {
            credential,
            kind,
            detail,
        } = outcome;
        match kind {
            OutcomeKind::ValidCredential => {
                self.valid_credentials.fetch_add(1, Ordering::Relaxed);
                info!(
                    "valid credential found: {}:{}",
                    credential.username, credential.password
                );
                if let Some(graph) = self.graph {
                    if graph.mark_owned(&credential.username) {
                        self.marked_owned.fetch_add(1, Ordering::Relaxed);
                        info!("marked {} as owned", credential.username);
                    }
                }
                self.valid.lock().unwrap().push(credential);
            }
            OutcomeKind::ExpiredPassword => {
                self.expired_passwords.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "expired password for {} (credential is valid)",
                    credential.username
                );
            }
            OutcomeKind::AccountLocked => {
                self.locked_accounts.fetch_add(1, Ordering::Relaxed);
                warn!("account locked: {}", credential.username);
            }
            OutcomeKind::WrongPassword => {
                self.wrong_passwords.fetch_add(1, Ordering::Relaxed);
                debug!("wrong password for {}", credential.username);
            }
            OutcomeKind::Other => {
                self.other_errors.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "probe failure for {}: {}",
                    credential.username,
                    detail.as_deref().unwrap_or("no detail")
                );
            }
        }
    }

    /// Confirmed-valid credentials recorded so far.
    pub fn valid_credentials(&self) -> Vec<Credential> {
        self.valid.lock().unwrap().clone()
    }

    /// Consistent point-in-time snapshot of the counters.
    pub fn summary(&self) -> RunStatistics {
        RunStatistics {
            valid_credentials: self.valid_credentials.load(Ordering::Relaxed),
            expired_passwords: self.expired_passwords.load(Ordering::Relaxed),
            locked_accounts: self.locked_accounts.load(Ordering::Relaxed),
            wrong_passwords: self.wrong_passwords.load(Ordering::Relaxed),
            other_errors: self.other_errors.load(Ordering::Relaxed),
            marked_owned: self.marked_owned.load(Ordering::Relaxed),
        }
    }
}
