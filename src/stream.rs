//! Lazy credential generation for one (pattern, extra-value) combination.
//!
//! A [`CredentialStream`] walks the filtered user set once, binding each
//! user's variables and rendering the pattern into a password. It is
//! finite, single-pass, and cancelled by dropping it. Users whose binding
//! fails on a missing attribute are skipped; a render failure is yielded to
//! the consumer, which must treat it as fatal.
use log::debug;

use crate::directory::UserRecord;
use crate::pattern::Pattern;
use crate::vars::{self, VarsError};

/// An immutable (username, password) pair, the unit of one spray attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

pub struct CredentialStream<'a> {
    users: std::slice::Iter<'a, UserRecord>,
    pattern: &'a Pattern,
    extra: &'a str,
    separator: &'a str,
    suffix: &'a str,
}

impl<'a> CredentialStream<'a> {
    pub fn new(
        users: &'a [UserRecord],
        pattern: &'a Pattern,
        extra: &'a str,
        separator: &'a str,
        suffix: &'a str,
    ) -> Self {
        Self {
            users: users.iter(),
            pattern,
            extra,
            separator,
            suffix,
        }
    }
}

impl Iterator for CredentialStream<'_> {
    type Item = Result<Credential, VarsError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let user = self.users.next()?;
            let binding = match vars::bind(user, self.extra, self.separator, self.suffix) {
                Ok(binding) => binding,
                Err(e @ VarsError::MissingAttribute { .. }) => {
                    debug!("skipping {}: {}", user.sam_account_name, e);
                    continue;
                }
                Err(e) => return Some(Err(e)),
            };
            return Some(match vars::render(self.pattern, &binding) {
                Ok(password) => Ok(Credential {
                    username: user.sam_account_name.clone(),
                    password,
                }),
                Err(e) => Err(e),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn user(display_name: &str, sam: &str, pwd_last_set: Option<i64>) -> UserRecord {
        UserRecord {
            display_name: display_name.to_string(),
            sam_account_name: sam.to_string(),
            pwd_last_set: pwd_last_set.map(|s| Utc.timestamp_opt(s, 0).unwrap()),
            when_created: None,
            bad_pwd_count: 0,
            pso: None,
        }
    }

    // 2023-07-15T12:00:00Z
    const JULY_2023: i64 = 1689422400;

    #[test]
    fn skips_users_missing_pwd_last_set() {
        let users = vec![
            user("José García", "jgarcia", Some(JULY_2023)),
            user("No Stamp", "nostamp", None),
            user("Ana López", "alopez", Some(JULY_2023)),
        ];
        let pattern = Pattern::new("{name}{year}");
        let creds: Vec<Credential> = CredentialStream::new(&users, &pattern, "", "", "")
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            creds,
            vec![
                Credential {
                    username: "jgarcia".into(),
                    password: "Jose2023".into()
                },
                Credential {
                    username: "alopez".into(),
                    password: "Ana2023".into()
                },
            ]
        );
    }

    #[test]
    fn one_stream_per_extra_value_yields_one_credential_per_user() {
        let users = vec![
            user("Ana", "ana", Some(JULY_2023)),
            user("Bob", "bob", Some(JULY_2023)),
        ];
        let pattern = Pattern::new("{extra}{year}");
        for extra in ["Acme", "Acme2"] {
            let creds: Vec<Credential> = CredentialStream::new(&users, &pattern, extra, "", "")
                .collect::<Result<_, _>>()
                .unwrap();
            assert_eq!(creds.len(), users.len());
            assert!(creds.iter().all(|c| c.password == format!("{extra}2023")));
        }
    }

    #[test]
    fn render_failure_is_surfaced_not_skipped() {
        let users = vec![user("Ana", "ana", Some(JULY_2023))];
        let pattern = Pattern::new("{name}{bogus}");
        let mut stream = CredentialStream::new(&users, &pattern, "", "", "");
        assert!(matches!(
            stream.next(),
            Some(Err(VarsError::UnresolvedVariable { .. }))
        ));
    }

    #[test]
    fn stream_is_finite_and_single_pass() {
        let users = vec![user("Ana", "ana", Some(JULY_2023))];
        let pattern = Pattern::new("{name}");
        let mut stream = CredentialStream::new(&users, &pattern, "", "", "");
        assert!(stream.next().is_some());
        assert!(stream.next().is_none());
        assert!(stream.next().is_none());
    }
}
