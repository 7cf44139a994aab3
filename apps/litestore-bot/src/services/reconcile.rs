//! Pure reconciliation steps.
//!
//! A pass is planned from a snapshot of the open deposits and one read of the
//! gateway's recent transactions; the engines then apply the returned effects.
//! Nothing here touches the network, the store or the clock.

use chrono::{DateTime, Duration, Utc};
use litestore_db::models::PendingDeposit;
use std::collections::{HashMap, HashSet};

use super::payment::GatewayTransaction;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassEffect {
    /// Past the payment window: drop the QR, tell the user, forget the deposit.
    Expire { unique_code: String },
    /// A transfer of exactly the target amount arrived.
    Settle {
        unique_code: String,
        transaction: GatewayTransaction,
    },
}

/// Composite `reference_id + amount` keys of transactions already settled.
///
/// Each key carries the last time its transaction was seen on the mutation
/// feed (or its settle time). A key may only be pruned once its transaction
/// has dropped off the feed for the whole retention window.
#[derive(Debug, Default)]
pub struct SettledTransactions {
    keys: HashMap<String, DateTime<Utc>>,
}

impl SettledTransactions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains_key(key)
    }

    /// Returns false when the key was already present.
    pub fn insert(&mut self, key: String, at: DateTime<Utc>) -> bool {
        if self.keys.contains_key(&key) {
            return false;
        }
        self.keys.insert(key, at);
        true
    }

    pub fn forget(&mut self, key: &str) {
        self.keys.remove(key);
    }

    /// Refreshes the keys still listed by a successful feed read.
    pub fn mark_seen(&mut self, transactions: &[GatewayTransaction], now: DateTime<Utc>) {
        for tx in transactions {
            if let Some(last_seen) = self.keys.get_mut(&tx.idempotency_key()) {
                *last_seen = now;
            }
        }
    }

    /// Drops keys not seen since `cutoff`. Only call this right after
    /// `mark_seen` with a complete feed, otherwise a transaction still on
    /// the feed could be forgotten and matched again.
    pub fn prune(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.keys.len();
        self.keys.retain(|_, last_seen| *last_seen >= cutoff);
        before - self.keys.len()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Plans one pass over the primary gateway's open deposits.
///
/// Expiry is decided before matching, so an expired deposit is never settled
/// even if its transfer shows up late. `transactions` is `None` when the
/// gateway could not be read; matching is then skipped and the open deposits
/// wait for the next pass. Each transaction settles at most one deposit, and
/// the oldest deposit wins if two ever share a target amount.
pub fn plan_pass(
    deposits: &[PendingDeposit],
    transactions: Option<&[GatewayTransaction]>,
    settled: &SettledTransactions,
    now: DateTime<Utc>,
    expiry: Duration,
) -> Vec<PassEffect> {
    let mut ordered: Vec<&PendingDeposit> = deposits.iter().collect();
    ordered.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.unique_code.cmp(&b.unique_code))
    });

    let mut effects = Vec::new();
    let mut claimed: HashSet<String> = HashSet::new();

    for deposit in ordered {
        // QR still being delivered.
        if deposit.qr_message.is_none() {
            continue;
        }

        if deposit.is_expired(now, expiry) {
            effects.push(PassEffect::Expire {
                unique_code: deposit.unique_code.clone(),
            });
            continue;
        }

        let Some(transactions) = transactions else {
            continue;
        };

        let matched = transactions.iter().find(|tx| {
            let key = tx.idempotency_key();
            tx.amount == deposit.target_amount && !settled.contains(&key) && !claimed.contains(&key)
        });

        if let Some(tx) = matched {
            claimed.insert(tx.idempotency_key());
            effects.push(PassEffect::Settle {
                unique_code: deposit.unique_code.clone(),
                transaction: tx.clone(),
            });
        }
    }

    effects
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaweriaStep {
    /// Already claimed by a settlement in progress.
    Skip,
    Expire,
    Check,
}

pub fn saweria_step(checked: bool, created_at: DateTime<Utc>, now: DateTime<Utc>, expiry: Duration) -> SaweriaStep {
    if checked {
        SaweriaStep::Skip
    } else if now - created_at > expiry {
        SaweriaStep::Expire
    } else {
        SaweriaStep::Check
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use litestore_db::models::{DepositStatus, MessageRef};

    fn deposit(code: &str, target: i64, age_secs: i64, now: DateTime<Utc>) -> PendingDeposit {
        PendingDeposit {
            unique_code: code.to_string(),
            user_id: 7,
            username: None,
            target_amount: target,
            requested_amount: target - 1,
            created_at: now - Duration::seconds(age_secs),
            status: DepositStatus::Pending,
            qr_message: Some(MessageRef {
                chat_id: 7,
                message_id: 1,
            }),
        }
    }

    fn tx(reference: &str, amount: i64) -> GatewayTransaction {
        GatewayTransaction {
            reference_id: reference.to_string(),
            amount,
        }
    }

    const WINDOW: i64 = 300;

    #[test]
    fn expired_deposit_is_not_matched() {
        let now = Utc::now();
        let deposits = vec![deposit("old", 5042, WINDOW + 1, now)];
        let txs = vec![tx("R1", 5042)];
        let effects = plan_pass(&deposits, Some(txs.as_slice()), &SettledTransactions::new(), now, Duration::seconds(WINDOW));
        assert_eq!(effects, vec![PassEffect::Expire { unique_code: "old".into() }]);
    }

    #[test]
    fn matches_exact_amount_only() {
        let now = Utc::now();
        let deposits = vec![deposit("a", 5042, 10, now), deposit("b", 7013, 10, now)];
        let txs = vec![tx("R1", 5041), tx("R2", 7013)];
        let effects = plan_pass(&deposits, Some(txs.as_slice()), &SettledTransactions::new(), now, Duration::seconds(WINDOW));
        assert_eq!(
            effects,
            vec![PassEffect::Settle {
                unique_code: "b".into(),
                transaction: tx("R2", 7013),
            }]
        );
    }

    #[test]
    fn settled_transaction_is_not_reused() {
        let now = Utc::now();
        let mut settled = SettledTransactions::new();
        settled.insert("R1_5042".into(), now);
        let deposits = vec![deposit("again", 5042, 10, now)];
        let effects = plan_pass(&deposits, Some(&[tx("R1", 5042)][..]), &settled, now, Duration::seconds(WINDOW));
        assert!(effects.is_empty());
    }

    #[test]
    fn one_transaction_settles_one_deposit() {
        let now = Utc::now();
        let deposits = vec![deposit("newer", 5042, 5, now), deposit("older", 5042, 60, now)];
        let effects = plan_pass(&deposits, Some(&[tx("R1", 5042)][..]), &SettledTransactions::new(), now, Duration::seconds(WINDOW));
        assert_eq!(effects.len(), 1);
        assert!(matches!(&effects[0], PassEffect::Settle { unique_code, .. } if unique_code == "older"));
    }

    #[test]
    fn gateway_outage_still_expires() {
        let now = Utc::now();
        let deposits = vec![deposit("fresh", 5042, 10, now), deposit("stale", 6001, WINDOW * 2, now)];
        let effects = plan_pass(&deposits, None, &SettledTransactions::new(), now, Duration::seconds(WINDOW));
        assert_eq!(effects, vec![PassEffect::Expire { unique_code: "stale".into() }]);
    }

    #[test]
    fn deposits_without_qr_are_left_alone() {
        let now = Utc::now();
        let mut reserving = deposit("reserving", 5042, WINDOW * 2, now);
        reserving.qr_message = None;
        let effects = plan_pass(&[reserving], Some(&[tx("R1", 5042)][..]), &SettledTransactions::new(), now, Duration::seconds(WINDOW));
        assert!(effects.is_empty());
    }

    #[test]
    fn prune_drops_only_old_keys() {
        let now = Utc::now();
        let mut settled = SettledTransactions::new();
        assert!(settled.insert("old_1".into(), now - Duration::hours(1)));
        assert!(settled.insert("new_1".into(), now));
        assert!(!settled.insert("new_1".into(), now));
        assert_eq!(settled.prune(now - Duration::minutes(15)), 1);
        assert!(settled.contains("new_1"));
        assert!(!settled.contains("old_1"));
    }

    #[test]
    fn keys_still_on_the_feed_survive_pruning() {
        let settled_at = Utc::now();
        let mut settled = SettledTransactions::new();
        settled.insert("R1_5042".into(), settled_at);
        settled.insert("R2_7013".into(), settled_at);

        let later = settled_at + Duration::hours(2);
        settled.mark_seen(&[tx("R1", 5042), tx("R9", 100)], later);
        assert_eq!(settled.prune(later - Duration::minutes(15)), 1);
        assert!(settled.contains("R1_5042"));
        assert!(!settled.contains("R2_7013"));
        assert!(!settled.contains("R9_100"));
    }

    #[test]
    fn saweria_step_checks_flag_before_expiry() {
        let now = Utc::now();
        let window = Duration::seconds(WINDOW);
        let old = now - Duration::seconds(WINDOW + 1);
        assert_eq!(saweria_step(true, old, now, window), SaweriaStep::Skip);
        assert_eq!(saweria_step(false, old, now, window), SaweriaStep::Expire);
        assert_eq!(saweria_step(false, now, now, window), SaweriaStep::Check);
    }
}
