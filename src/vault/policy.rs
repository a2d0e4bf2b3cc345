//! Rebalance Policy
//!
//! Pure decision function over a snapshot of pool rates and balances.
//! Deliberately a hysteresis comparator, not an optimizer: capital moves
//! only when the best/worst rate gap STRICTLY exceeds the threshold, so
//! two pools with close, noisy rates never cause flapping, and repeated
//! evaluation of an unchanged snapshot is a natural no-op.

use serde::Serialize;

/// Default minimum rate gap required to move capital: 100 bps = 1%.
pub const DEFAULT_YIELD_THRESHOLD_BPS: u64 = 100;

/// One pool as seen at evaluation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolSnapshot {
    pub index: usize,
    pub rate_bps: u64,
    pub balance: u128,
}

/// A decided move. Ephemeral: produced and consumed within one
/// evaluation cycle, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebalanceIntent {
    pub from_index: usize,
    pub to_index: usize,
    pub amount: u128,
    pub rate_gap_bps: u64,
}

/// Why an evaluation chose not to move anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoActionReason {
    /// Fewer than two pools registered.
    TooFewPools,
    /// Best and worst rate coincide.
    RatesFlat,
    /// Gap present but not strictly above the threshold.
    GapBelowThreshold { gap_bps: u64 },
    /// Funds already sit in the best pool.
    AlreadyOptimal,
    /// No capital eligible to relocate.
    NothingToMove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    NoAction(NoActionReason),
    Rebalance(RebalanceIntent),
}

/// Decide whether, where, and how much to move.
///
/// `amount_to_move` is the capital the caller considers eligible for
/// relocation (typically the vault's total assets); the intent clamps it
/// to what the source pool actually holds.
pub fn evaluate(
    pools: &[PoolSnapshot],
    threshold_bps: u64,
    amount_to_move: u128,
) -> PolicyDecision {
    if pools.len() < 2 {
        return PolicyDecision::NoAction(NoActionReason::TooFewPools);
    }

    // Ties break toward the lowest index on both sides.
    let mut i_max = 0usize;
    let mut i_min = 0usize;
    for (i, p) in pools.iter().enumerate() {
        if p.rate_bps > pools[i_max].rate_bps {
            i_max = i;
        }
        if p.rate_bps < pools[i_min].rate_bps {
            i_min = i;
        }
    }

    if i_max == i_min || pools[i_max].rate_bps == pools[i_min].rate_bps {
        return PolicyDecision::NoAction(NoActionReason::RatesFlat);
    }

    let gap_bps = pools[i_max].rate_bps - pools[i_min].rate_bps;
    if gap_bps <= threshold_bps {
        return PolicyDecision::NoAction(NoActionReason::GapBelowThreshold { gap_bps });
    }

    // The pool currently holding the capital under consideration: the
    // largest balance, lowest index on ties.
    let mut i_from = 0usize;
    for (i, p) in pools.iter().enumerate() {
        if p.balance > pools[i_from].balance {
            i_from = i;
        }
    }

    if pools[i_from].balance == 0 || amount_to_move == 0 {
        return PolicyDecision::NoAction(NoActionReason::NothingToMove);
    }
    if i_from == i_max {
        return PolicyDecision::NoAction(NoActionReason::AlreadyOptimal);
    }

    PolicyDecision::Rebalance(RebalanceIntent {
        from_index: i_from,
        to_index: i_max,
        amount: amount_to_move.min(pools[i_from].balance),
        rate_gap_bps: gap_bps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(index: usize, rate_bps: u64, balance: u128) -> PoolSnapshot {
        PoolSnapshot {
            index,
            rate_bps,
            balance,
        }
    }

    #[test]
    fn test_single_pool_is_no_action() {
        let pools = [pool(0, 500, 1000)];
        assert_eq!(
            evaluate(&pools, 100, 1000),
            PolicyDecision::NoAction(NoActionReason::TooFewPools)
        );
    }

    #[test]
    fn test_gap_at_threshold_does_not_move() {
        // 5.0% vs 6.0% with a 100 bps threshold: gap == threshold, no move.
        let pools = [pool(0, 500, 1000), pool(1, 600, 0)];
        assert_eq!(
            evaluate(&pools, 100, 1000),
            PolicyDecision::NoAction(NoActionReason::GapBelowThreshold { gap_bps: 100 })
        );
    }

    #[test]
    fn test_gap_above_threshold_moves_to_best() {
        let pools = [pool(0, 500, 1000), pool(1, 1000, 0)];
        let decision = evaluate(&pools, 100, 1000);
        assert_eq!(
            decision,
            PolicyDecision::Rebalance(RebalanceIntent {
                from_index: 0,
                to_index: 1,
                amount: 1000,
                rate_gap_bps: 500,
            })
        );
    }

    #[test]
    fn test_reverse_direction_when_rates_flip() {
        // Funds parked in pool 1, pool 0 now pays more.
        let pools = [pool(0, 1500, 0), pool(1, 1000, 1000)];
        let decision = evaluate(&pools, 100, 1000);
        assert_eq!(
            decision,
            PolicyDecision::Rebalance(RebalanceIntent {
                from_index: 1,
                to_index: 0,
                amount: 1000,
                rate_gap_bps: 500,
            })
        );
    }

    #[test]
    fn test_idempotent_once_optimal() {
        // After a move the holder IS the best pool: re-evaluation no-ops.
        let pools = [pool(0, 500, 0), pool(1, 1000, 1000)];
        assert_eq!(
            evaluate(&pools, 100, 1000),
            PolicyDecision::NoAction(NoActionReason::AlreadyOptimal)
        );
    }

    #[test]
    fn test_empty_pools_nothing_to_move() {
        let pools = [pool(0, 500, 0), pool(1, 1000, 0)];
        assert_eq!(
            evaluate(&pools, 100, 1000),
            PolicyDecision::NoAction(NoActionReason::NothingToMove)
        );
    }

    #[test]
    fn test_amount_clamped_to_source_balance() {
        let pools = [pool(0, 500, 300), pool(1, 1000, 0)];
        match evaluate(&pools, 100, 1000) {
            PolicyDecision::Rebalance(intent) => assert_eq!(intent.amount, 300),
            other => panic!("expected rebalance, got {:?}", other),
        }
    }

    #[test]
    fn test_ties_break_to_lowest_index() {
        // Two best pools at the same top rate: index 1 wins over index 2.
        let pools = [pool(0, 500, 1000), pool(1, 900, 0), pool(2, 900, 0)];
        match evaluate(&pools, 100, 1000) {
            PolicyDecision::Rebalance(intent) => {
                assert_eq!(intent.to_index, 1);
                assert_eq!(intent.from_index, 0);
            }
            other => panic!("expected rebalance, got {:?}", other),
        }
    }

    #[test]
    fn test_flat_rates_no_action() {
        let pools = [pool(0, 700, 1000), pool(1, 700, 0)];
        assert_eq!(
            evaluate(&pools, 100, 1000),
            PolicyDecision::NoAction(NoActionReason::RatesFlat)
        );
    }

    #[test]
    fn test_middle_holder_moves_to_best() {
        // Holder is neither best nor worst; gap is still max minus min.
        let pools = [pool(0, 300, 0), pool(1, 700, 1000), pool(2, 900, 0)];
        match evaluate(&pools, 100, 1000) {
            PolicyDecision::Rebalance(intent) => {
                assert_eq!(intent.from_index, 1);
                assert_eq!(intent.to_index, 2);
                assert_eq!(intent.rate_gap_bps, 600);
            }
            other => panic!("expected rebalance, got {:?}", other),
        }
    }

    #[test]
    fn test_hysteresis_sweep_never_moves_within_threshold() {
        // For every gap in [0, threshold], evaluation must not move funds.
        let threshold = 100;
        for gap in 0..=threshold {
            let pools = [pool(0, 500, 1000), pool(1, 500 + gap, 0)];
            match evaluate(&pools, threshold, 1000) {
                PolicyDecision::NoAction(_) => {}
                PolicyDecision::Rebalance(intent) => {
                    panic!("gap {} moved {:?}", gap, intent)
                }
            }
        }
    }
}
