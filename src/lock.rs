use super::cond::{Condition, ConditionFactor, ConditionTerm, Precondition};
use super::types::{ActiveLock, LockType};

/// The write lock on `resource_uri` that `principal` both holds and has
/// proven by presenting its token in `precondition`. Holding a lock is
/// not enough: a caller who did not present the token is treated as not
/// holding it at all, so a request with no If header yields `None`
/// rather than an error.
///
/// Servers may list several qualifying locks; the last one wins.
pub fn held_lock<'a>(
    locks: &'a [ActiveLock],
    resource_uri: &str,
    principal: &str,
    precondition: Option<&Precondition>,
) -> Option<&'a ActiveLock> {
    let precondition = precondition?;

    let mut held = None;
    for lock in locks {
        let Some(token) = lock.lock_token() else {
            continue;
        };
        let mut candidate = Condition::scoped(resource_uri);
        if candidate
            .add_term(ConditionTerm::of(ConditionFactor::state_token(token)))
            .is_err()
        {
            continue;
        }
        if precondition.matches(&candidate)
            && lock.principal() == Some(principal)
            && *lock.lock_type() == LockType::Write
        {
            held = Some(lock);
        }
    }
    held
}

/// Does `principal` hold a write lock on `resource_uri` it has proven
/// ownership of?
pub fn is_locked_by(
    locks: &[ActiveLock],
    resource_uri: &str,
    principal: &str,
    precondition: Option<&Precondition>,
) -> bool {
    held_lock(locks, resource_uri, principal, precondition).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Timeout;
    use std::str::FromStr;

    fn lock(token: &str, principal: &str) -> ActiveLock {
        let mut l = ActiveLock::new();
        l.set_lock_token(token);
        l.set_principal(principal);
        l.set_timeout(Timeout::Seconds(600));
        l
    }

    #[test]
    fn token_and_principal_must_both_check_out() {
        let locks = vec![lock("urn:lock:abc", "alice")];
        let pre = Precondition::from_str("(<urn:lock:abc>)").unwrap();

        assert!(is_locked_by(&locks, "/doc", "alice", Some(&pre)));
        // right token, wrong principal
        assert!(!is_locked_by(&locks, "/doc", "bob", Some(&pre)));

        // right principal, wrong token
        let wrong = Precondition::from_str("(<urn:lock:zzz>)").unwrap();
        assert!(!is_locked_by(&locks, "/doc", "alice", Some(&wrong)));
    }

    #[test]
    fn no_header_means_not_held() {
        // the lock exists, but the caller presented nothing
        let locks = vec![lock("urn:lock:abc", "alice")];
        assert!(!is_locked_by(&locks, "/doc", "alice", None));
        assert_eq!(held_lock(&locks, "/doc", "alice", None), None);
    }

    #[test]
    fn scoped_header_must_name_the_resource() {
        let locks = vec![lock("urn:lock:abc", "alice")];
        let pre = Precondition::from_str("<http://x/doc> (<urn:lock:abc>)").unwrap();

        assert!(is_locked_by(&locks, "http://x/doc", "alice", Some(&pre)));
        assert!(!is_locked_by(&locks, "http://x/other", "alice", Some(&pre)));
    }

    #[test]
    fn last_qualifying_lock_wins() {
        let locks = vec![
            lock("urn:lock:1", "alice"),
            lock("urn:lock:2", "bob"),
            lock("urn:lock:3", "alice"),
        ];
        let pre = Precondition::from_str("(<urn:lock:1>) (<urn:lock:3>)").unwrap();

        let held = held_lock(&locks, "/doc", "alice", Some(&pre)).unwrap();
        assert_eq!(held.lock_token(), Some("urn:lock:3"));
    }

    #[test]
    fn tokenless_locks_are_skipped() {
        let mut anonymous = ActiveLock::new();
        anonymous.set_principal("alice");
        let locks = vec![anonymous, lock("urn:lock:abc", "alice")];
        let pre = Precondition::from_str("(<urn:lock:abc>)").unwrap();

        let held = held_lock(&locks, "/doc", "alice", Some(&pre)).unwrap();
        assert_eq!(held.lock_token(), Some("urn:lock:abc"));
    }
}
