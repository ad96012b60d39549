//! Bounded, rate-limited concurrent spray scheduler.
//!
//! A fixed pool of scoped worker threads drains a single-pass credential
//! stream. The stream cursor is the only shared mutable state of the feed:
//! workers pull from it under a mutex, so every credential is attempted
//! exactly once. Admission control is threefold and all bounds hold
//! simultaneously: the pool size caps in-flight probes, a global [`Pacer`]
//! caps dispatch density, and each dispatch adds a uniformly-random jitter
//! so requests never land on a fixed interval.
//!
//! An unclassified probe failure (or a template error escaping the stream)
//! is fatal: no new credentials are pulled, in-flight probes drain, and the
//! first error is returned. Statistics live in the caller-owned aggregator
//! and therefore survive the abort.
use std::ops::RangeInclusive;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::debug;
use rand::Rng;

use crate::probe::{AuthProbe, ProbeError};
use crate::stats::OutcomeAggregator;
use crate::stream::Credential;
use crate::vars::VarsError;

#[derive(Debug, thiserror::Error)]
pub enum SprayError {
    #[error(transparent)]
    Probe(#[from] ProbeError),
    #[error(transparent)]
    Template(#[from] VarsError),
}

#[derive(Debug, Clone)]
pub struct SprayOptions {
    /// Number of concurrent workers (in-flight probe bound).
    pub workers: usize,
    /// Global dispatch-rate ceiling; 0 disables pacing.
    pub max_rps: f64,
    /// Additional per-dispatch delay, drawn uniformly, in milliseconds.
    pub jitter_ms: RangeInclusive<u64>,
}

impl Default for SprayOptions {
    fn default() -> Self {
        Self {
            workers: 5,
            max_rps: 0.0,
            jitter_ms: 0..=0,
        }
    }
}

/// Global minimum-interval gate. Every worker reserves the next dispatch
/// slot under the mutex, then sleeps outside it until the slot arrives, so
/// the aggregate rate never exceeds the configured ceiling.
pub(crate) struct Pacer {
    interval: Duration,
    next_slot: Mutex<Instant>,
}

impl Pacer {
    pub(crate) fn new(max_rps: f64) -> Self {
        let interval = if max_rps > 0.0 {
            Duration::from_secs_f64(1.0 / max_rps)
        } else {
            Duration::ZERO
        };
        Self {
            interval,
            next_slot: Mutex::new(Instant::now()),
        }
    }

    pub(crate) fn wait(&self) {
        if self.interval.is_zero() {
            return;
        }
        let slot = {
            let mut next = self.next_slot.lock().unwrap();
            let slot = (*next).max(Instant::now());
            *next = slot + self.interval;
            slot
        };
        let now = Instant::now();
        if slot > now {
            thread::sleep(slot - now);
        }
    }
}

fn jitter(rng: &mut impl Rng, range: &RangeInclusive<u64>) -> Duration {
    if *range.end() == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rng.gen_range(range.clone()))
}

fn abort(flag: &AtomicBool, slot: &Mutex<Option<SprayError>>, error: SprayError) {
    flag.store(true, Ordering::SeqCst);
    let mut first = slot.lock().unwrap();
    if first.is_none() {
        *first = Some(error);
    } else {
        debug!("additional fatal error after abort: {}", error);
    }
}

/// Drain `stream` through `probe` with at most `options.workers` probes in
/// flight, recording every outcome into `aggregator`. Returns the final
/// statistics snapshot, or the first fatal error after in-flight work has
/// drained; the caller still owns whatever the aggregator recorded.
pub fn run<I>(
    stream: I,
    probe: &dyn AuthProbe,
    aggregator: &OutcomeAggregator,
    options: &SprayOptions,
) -> Result<crate::stats::RunStatistics, SprayError>
where
    I: Iterator<Item = Result<Credential, VarsError>> + Send,
{
    let workers = options.workers.max(1);
    let cursor = Mutex::new(stream);
    let pacer = Pacer::new(options.max_rps);
    let aborted = AtomicBool::new(false);
    let failure: Mutex<Option<SprayError>> = Mutex::new(None);

    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| {
                let mut rng = rand::thread_rng();
                loop {
                    if aborted.load(Ordering::SeqCst) {
                        break;
                    }
                    // The cursor mutex is the exactly-once guarantee: one
                    // worker pulls, the lock drops before any waiting.
                    let pulled = cursor.lock().unwrap().next();
                    let credential = match pulled {
                        None => break,
                        Some(Ok(credential)) => credential,
                        Some(Err(e)) => {
                            abort(&aborted, &failure, SprayError::Template(e));
                            break;
                        }
                    };
                    pacer.wait();
                    let delay = jitter(&mut rng, &options.jitter_ms);
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    match probe.authenticate(&credential) {
                        Ok(outcome) => aggregator.record(outcome),
                        Err(e) => {
                            abort(&aborted, &failure, SprayError::Probe(e));
                            break;
                        }
                    }
                }
            });
        }
    });

    match failure.into_inner().unwrap() {
        Some(error) => Err(error),
        None => Ok(aggregator.summary()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{AttemptOutcome, OutcomeKind};
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;

    fn creds(n: usize) -> Vec<Result<Credential, VarsError>> {
        (0..n)
            .map(|i| {
                Ok(Credential {
                    username: format!("user{i}"),
                    password: "pw".to_string(),
                })
            })
            .collect()
    }

    /// Scripted probe recording every username it sees.
    struct ScriptedProbe<F: Fn(&Credential) -> Result<OutcomeKind, ProbeError> + Sync> {
        seen: Mutex<Vec<String>>,
        verdict: F,
    }

    impl<F: Fn(&Credential) -> Result<OutcomeKind, ProbeError> + Sync> ScriptedProbe<F> {
        fn new(verdict: F) -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
                verdict,
            }
        }
    }

    impl<F: Fn(&Credential) -> Result<OutcomeKind, ProbeError> + Sync> AuthProbe
        for ScriptedProbe<F>
    {
        fn authenticate(&self, credential: &Credential) -> Result<AttemptOutcome, ProbeError> {
            self.seen.lock().unwrap().push(credential.username.clone());
            (self.verdict)(credential).map(|kind| AttemptOutcome::new(credential.clone(), kind))
        }
    }

    #[test]
    fn every_credential_is_attempted_exactly_once() {
        let probe = ScriptedProbe::new(|c: &Credential| {
            Ok(if c.username == "user3" {
                OutcomeKind::ValidCredential
            } else {
                OutcomeKind::WrongPassword
            })
        });
        let aggregator = OutcomeAggregator::new(None);
        let options = SprayOptions {
            workers: 3,
            ..SprayOptions::default()
        };
        let stats = run(creds(10).into_iter(), &probe, &aggregator, &options).unwrap();

        assert_eq!(stats.total_attempts(), 10);
        assert_eq!(stats.valid_credentials, 1);
        assert_eq!(stats.wrong_passwords, 9);

        let seen = probe.seen.lock().unwrap();
        let unique: HashSet<&String> = seen.iter().collect();
        assert_eq!(seen.len(), 10);
        assert_eq!(unique.len(), 10);
    }

    #[test]
    fn more_workers_than_credentials_terminates() {
        let probe = ScriptedProbe::new(|_: &Credential| Ok(OutcomeKind::WrongPassword));
        let aggregator = OutcomeAggregator::new(None);
        let options = SprayOptions {
            workers: 16,
            ..SprayOptions::default()
        };
        let stats = run(creds(2).into_iter(), &probe, &aggregator, &options).unwrap();
        assert_eq!(stats.total_attempts(), 2);
    }

    #[test]
    fn unclassified_probe_failure_aborts_and_surfaces() {
        let dispatched = AtomicUsize::new(0);
        let probe = ScriptedProbe::new(|c: &Credential| {
            dispatched.fetch_add(1, Ordering::SeqCst);
            if c.username == "user0" {
                Err(ProbeError::Unclassified("kdc said something new".into()))
            } else {
                Ok(OutcomeKind::WrongPassword)
            }
        });
        let aggregator = OutcomeAggregator::new(None);
        let options = SprayOptions {
            workers: 1,
            ..SprayOptions::default()
        };
        let err = run(creds(5).into_iter(), &probe, &aggregator, &options).unwrap_err();
        assert!(matches!(err, SprayError::Probe(_)));
        // single worker: the failing first dispatch stops everything after it
        assert_eq!(dispatched.load(Ordering::SeqCst), 1);
        assert_eq!(aggregator.summary().total_attempts(), 0);
    }

    #[test]
    fn template_error_in_the_stream_is_fatal() {
        let probe = ScriptedProbe::new(|_: &Credential| Ok(OutcomeKind::WrongPassword));
        let aggregator = OutcomeAggregator::new(None);
        let stream = vec![
            Ok(Credential {
                username: "a".into(),
                password: "pw".into(),
            }),
            Err(VarsError::UnresolvedVariable {
                name: "bogus".into(),
            }),
        ];
        let err = run(
            stream.into_iter(),
            &probe,
            &aggregator,
            &SprayOptions {
                workers: 1,
                ..SprayOptions::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, SprayError::Template(_)));
        // the credential pulled before the error still resolved
        assert_eq!(aggregator.summary().total_attempts(), 1);
    }

    #[test]
    fn pacer_enforces_a_minimum_dispatch_interval() {
        let pacer = Pacer::new(100.0); // 10ms between dispatches
        let start = Instant::now();
        pacer.wait();
        pacer.wait();
        pacer.wait();
        // first slot is immediate, the next two are spaced 10ms apart
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn unpaced_pacer_does_not_sleep() {
        let pacer = Pacer::new(0.0);
        let start = Instant::now();
        for _ in 0..100 {
            pacer.wait();
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn jitter_stays_in_range() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let d = jitter(&mut rng, &(5..=20));
            assert!(d >= Duration::from_millis(5) && d <= Duration::from_millis(20));
        }
        assert_eq!(jitter(&mut rng, &(0..=0)), Duration::ZERO);
    }
}
