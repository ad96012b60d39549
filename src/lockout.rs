//! Lockout-avoidance filters.
//!
//! The safety guarantee of the whole tool: a single spray attempt must never
//! push any user's bad-password counter to or past the threshold that locks
//! the account. Users who cannot absorb one more failed attempt (keeping
//! `safety_margin` attempts in reserve) are removed before any credential is
//! generated.
use log::info;

use crate::directory::{PasswordPolicy, UserRecord};

/// Whether a user with `bad_pwd_count` failures can absorb one more attempt
/// under `lockout_threshold`, keeping `safety_margin` attempts in reserve.
/// A threshold of 0 means the policy never locks out. Equality is safe:
/// with threshold 5 and margin 1, a user at 3 failures is still eligible.
fn remaining_allows(bad_pwd_count: u32, lockout_threshold: u32, safety_margin: u32) -> bool {
    lockout_threshold == 0
        || i64::from(bad_pwd_count) + 1
            <= i64::from(lockout_threshold) - i64::from(safety_margin)
}

/// Retain only users safe to test under their effective policy (the PSO
/// override when present, the domain policy otherwise).
pub fn filter_by_threshold(
    users: Vec<UserRecord>,
    policy: &PasswordPolicy,
    safety_margin: u32,
) -> Vec<UserRecord> {
    let before = users.len();
    let kept: Vec<UserRecord> = users
        .into_iter()
        .filter(|u| {
            let threshold = u
                .pso
                .as_ref()
                .map(|p| p.lockout_threshold)
                .unwrap_or(policy.lockout_threshold);
            remaining_allows(u.bad_pwd_count, threshold, safety_margin)
        })
        .collect();
    let removed = before - kept.len();
    if removed > 0 {
        info!(
            "excluded {} user(s) too close to the lockout threshold",
            removed
        );
    }
    kept
}

/// Exclude users whose PSO declares a stricter lockout threshold than the
/// domain default without enough remaining attempts under that override.
pub fn filter_by_pso(
    users: Vec<UserRecord>,
    policy: &PasswordPolicy,
    safety_margin: u32,
) -> Vec<UserRecord> {
    let before = users.len();
    let kept: Vec<UserRecord> = users
        .into_iter()
        .filter(|u| match &u.pso {
            Some(pso) if stricter_than(pso, policy) => {
                remaining_allows(u.bad_pwd_count, pso.lockout_threshold, safety_margin)
            }
            _ => true,
        })
        .collect();
    let removed = before - kept.len();
    if removed > 0 {
        info!("excluded {} user(s) with a stricter PSO", removed);
    }
    kept
}

fn stricter_than(pso: &PasswordPolicy, domain: &PasswordPolicy) -> bool {
    pso.lockout_threshold != 0
        && (domain.lockout_threshold == 0 || pso.lockout_threshold < domain.lockout_threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(sam: &str, bad_pwd_count: u32, pso: Option<PasswordPolicy>) -> UserRecord {
        UserRecord {
            display_name: sam.to_string(),
            sam_account_name: sam.to_string(),
            pwd_last_set: None,
            when_created: None,
            bad_pwd_count,
            pso,
        }
    }

    fn domain(threshold: u32) -> PasswordPolicy {
        PasswordPolicy {
            lockout_threshold: threshold,
            observation_window_secs: 1800,
        }
    }

    #[test]
    fn threshold_boundary_is_inclusive_on_the_safe_side() {
        // threshold 5, margin 1: 3+1 = 4 <= 4 retained, 4+1 = 5 > 4 excluded
        let users = vec![user("safe", 3, None), user("unsafe", 4, None)];
        let kept = filter_by_threshold(users, &domain(5), 1);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].sam_account_name, "safe");
    }

    #[test]
    fn zero_threshold_means_no_lockout() {
        let users = vec![user("a", 99, None)];
        assert_eq!(filter_by_threshold(users, &domain(0), 1).len(), 1);
    }

    #[test]
    fn margin_at_or_above_threshold_excludes_everyone() {
        let users = vec![user("a", 0, None), user("b", 0, None)];
        assert!(filter_by_threshold(users, &domain(2), 2).is_empty());
    }

    #[test]
    fn threshold_filter_uses_the_pso_override_when_present() {
        // domain allows it, but the override (3) with margin 1 does not: 2+1 > 2
        let users = vec![user("a", 2, Some(domain(3)))];
        assert!(filter_by_threshold(users, &domain(10), 1).is_empty());
    }

    #[test]
    fn pso_filter_excludes_only_stricter_overrides_without_headroom() {
        let strict = Some(domain(3));
        let lax = Some(domain(20));
        let users = vec![
            user("strict-full", 2, strict),        // 2+1 > 3-1, excluded
            user("strict-fresh", 0, Some(domain(3))), // 0+1 <= 2, retained
            user("lax", 2, lax),                   // not stricter than domain
            user("plain", 2, None),
        ];
        let kept = filter_by_pso(users, &domain(5), 1);
        let names: Vec<&str> = kept.iter().map(|u| u.sam_account_name.as_str()).collect();
        assert_eq!(names, vec!["strict-fresh", "lax", "plain"]);
    }

    #[test]
    fn filters_commute() {
        let users = vec![
            user("a", 0, None),
            user("b", 4, None),
            user("c", 0, Some(domain(2))),
        ];
        let one = filter_by_pso(
            filter_by_threshold(users.clone(), &domain(5), 1),
            &domain(5),
            1,
        );
        let other = filter_by_threshold(
            filter_by_pso(users, &domain(5), 1),
            &domain(5),
            1,
        );
        assert_eq!(one, other);
    }
}
