//! Authentication probe collaborator seam.
//!
//! The scheduler is protocol-agnostic: anything implementing [`AuthProbe`]
//! can sit on the other side of a spray. The probe is responsible for
//! mapping protocol-level responses onto the five [`OutcomeKind`]s; a
//! response it cannot classify is a [`ProbeError`] and aborts the run.
//!
//! [`CommandProbe`] is the shipped implementation: it delegates each
//! attempt to an operator-supplied program. The credential is passed
//! through the environment (`SPEARSPRAY_USERNAME` / `SPEARSPRAY_PASSWORD`),
//! never through a command line, and the exit status carries the verdict:
//!
//! | exit status | outcome              |
//! |-------------|----------------------|
//! | 0           | valid credential     |
//! | 10          | expired password     |
//! | 11          | account locked       |
//! | 12          | wrong password       |
//! | 13          | unknown principal    |
//!
//! Any other status is unclassified and fatal. The generic shell failure
//! status 1 is deliberately not in the table: a probe script that dies
//! must stop the run, not be miscounted as an authentication outcome.
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::stats::{AttemptOutcome, OutcomeKind};
use crate::stream::Credential;

pub const USERNAME_ENV: &str = "SPEARSPRAY_USERNAME";
pub const PASSWORD_ENV: &str = "SPEARSPRAY_PASSWORD";

pub const EXIT_VALID: i32 = 0;
pub const EXIT_EXPIRED: i32 = 10;
pub const EXIT_LOCKED: i32 = 11;
pub const EXIT_WRONG_PASSWORD: i32 = 12;
pub const EXIT_UNKNOWN_PRINCIPAL: i32 = 13;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("failed to run probe command: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("unclassified probe result: {0}")]
    Unclassified(String),
}

/// One authentication attempt against the target. Implementations must be
/// callable from multiple workers at once.
pub trait AuthProbe: Sync {
    fn authenticate(&self, credential: &Credential) -> Result<AttemptOutcome, ProbeError>;
}

/// Probe adapter spawning an external command per attempt.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    program: PathBuf,
}

impl CommandProbe {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl AuthProbe for CommandProbe {
    fn authenticate(&self, credential: &Credential) -> Result<AttemptOutcome, ProbeError> {
        let status = Command::new(&self.program)
            .env(USERNAME_ENV, &credential.username)
            .env(PASSWORD_ENV, &credential.password)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        match status.code() {
            Some(EXIT_VALID) => Ok(AttemptOutcome::new(
                credential.clone(),
                OutcomeKind::ValidCredential,
            )),
            Some(EXIT_EXPIRED) => Ok(AttemptOutcome::new(
                credential.clone(),
                OutcomeKind::ExpiredPassword,
            )),
            Some(EXIT_LOCKED) => Ok(AttemptOutcome::new(
                credential.clone(),
                OutcomeKind::AccountLocked,
            )),
            Some(EXIT_WRONG_PASSWORD) => Ok(AttemptOutcome::new(
                credential.clone(),
                OutcomeKind::WrongPassword,
            )),
            Some(EXIT_UNKNOWN_PRINCIPAL) => Ok(AttemptOutcome::with_detail(
                credential.clone(),
                OutcomeKind::Other,
                "unknown principal",
            )),
            other => Err(ProbeError::Unclassified(format!(
                "probe for {} exited with {}",
                credential.username,
                other.map_or_else(|| "signal".to_string(), |c| c.to_string())
            ))),
        }
    }
}
