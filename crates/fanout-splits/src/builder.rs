//! Two-level splits plan construction.
//!
//! Layout algorithm (receivers are taken in input order):
//!
//! 1. Everything fits in one list? Emit it with no sub-lists.
//! 2. Otherwise reserve `k = ceil((total - 200) / 199)` of the 200 root
//!    slots for sub-list references; the rest of the root slots hold
//!    direct receivers, and the remaining accounts are chunked into
//!    sub-lists of up to 200.
//!
//! Normalization runs once at the root level across direct receivers and
//! sub-list aggregate weights together, and once more inside each
//! sub-list, so every level independently sums to [`TOTAL_WEIGHT`].

use serde::{Deserialize, Serialize};

use crate::normalize::largest_remainder;
use crate::{SplitsError, SplitsResult, MAX_NODES, MAX_RECEIVERS, SUB_LISTS_PER_BATCH, TOTAL_WEIGHT};

/// An account with its propagated (floating-point) absolute weight.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeightedAccount {
    pub account_id: String,
    pub weight: f64,
}

/// A receiver with its normalized integer weight.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Receiver {
    pub account_id: String,
    pub weight: u32,
}

/// A second-level receiver group and the root-level weight allotted to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubList {
    pub receivers: Vec<Receiver>,
    pub weight: u32,
}

/// The full two-level structure ready for on-chain creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SplitsPlan {
    pub direct: Vec<Receiver>,
    pub sub_lists: Vec<SubList>,
}

impl SplitsPlan {
    /// Root-level slot usage: direct receivers plus sub-list references.
    pub fn root_slot_count(&self) -> usize {
        self.direct.len() + self.sub_lists.len()
    }
}

/// Build a normalized two-level splits plan from a flat weighted list.
///
/// `accounts` must already exclude the root node and zero-weight entries;
/// a zero or negative weight here is rejected.
pub fn build(accounts: &[WeightedAccount]) -> SplitsResult<SplitsPlan> {
    if accounts.len() > MAX_NODES {
        return Err(SplitsError::TooManyAccounts(accounts.len()));
    }
    if accounts.is_empty() || accounts.iter().all(|a| a.weight <= 0.0) {
        return Err(SplitsError::NoPositiveWeights);
    }

    let total = accounts.len();

    if total <= MAX_RECEIVERS {
        let weights: Vec<f64> = accounts.iter().map(|a| a.weight).collect();
        let shares = largest_remainder(&weights, TOTAL_WEIGHT)?;
        return Ok(SplitsPlan {
            direct: to_receivers(accounts, &shares),
            sub_lists: vec![],
        });
    }

    // Each sub-list reference frees up 199 net slots (it occupies one
    // root slot itself but addresses up to 200 accounts).
    let sub_lists_needed = (total - MAX_RECEIVERS).div_ceil(MAX_RECEIVERS - 1);
    if sub_lists_needed > MAX_RECEIVERS {
        return Err(SplitsError::TooManySubLists(sub_lists_needed));
    }

    let direct_count = MAX_RECEIVERS - sub_lists_needed;
    let (direct_accounts, overflow) = accounts.split_at(direct_count);

    let chunks: Vec<&[WeightedAccount]> = overflow.chunks(MAX_RECEIVERS).collect();

    // Root-level normalization spans direct receivers and sub-list
    // aggregates together so the level sums to exactly TOTAL_WEIGHT.
    let mut root_weights: Vec<f64> = direct_accounts.iter().map(|a| a.weight).collect();
    root_weights.extend(
        chunks
            .iter()
            .map(|chunk| chunk.iter().map(|a| a.weight).sum::<f64>()),
    );
    let root_shares = largest_remainder(&root_weights, TOTAL_WEIGHT)?;

    let direct = to_receivers(direct_accounts, &root_shares[..direct_count]);

    let mut sub_lists = Vec::with_capacity(chunks.len());
    for (chunk, &weight) in chunks.iter().zip(&root_shares[direct_count..]) {
        let weights: Vec<f64> = chunk.iter().map(|a| a.weight).collect();
        let shares = largest_remainder(&weights, TOTAL_WEIGHT)?;
        sub_lists.push(SubList {
            receivers: to_receivers(chunk, &shares),
            weight,
        });
    }

    Ok(SplitsPlan { direct, sub_lists })
}

/// Chunk a plan's sub-lists into groups of [`SUB_LISTS_PER_BATCH`], one
/// group per on-chain transaction job.
pub fn batch_sub_lists(plan: &SplitsPlan) -> Vec<Vec<SubList>> {
    plan.sub_lists
        .chunks(SUB_LISTS_PER_BATCH)
        .map(<[SubList]>::to_vec)
        .collect()
}

fn to_receivers(accounts: &[WeightedAccount], shares: &[u32]) -> Vec<Receiver> {
    accounts
        .iter()
        .zip(shares)
        .map(|(account, &weight)| Receiver {
            account_id: account.account_id.clone(),
            weight,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accounts(n: usize) -> Vec<WeightedAccount> {
        (0..n)
            .map(|i| WeightedAccount {
                account_id: format!("acct-{i}"),
                weight: 1.0 + (i % 7) as f64 * 0.1,
            })
            .collect()
    }

    fn assert_level_sums(plan: &SplitsPlan) {
        let root_sum: u32 = plan.direct.iter().map(|r| r.weight).sum::<u32>()
            + plan.sub_lists.iter().map(|s| s.weight).sum::<u32>();
        assert_eq!(root_sum, TOTAL_WEIGHT);

        for sub in &plan.sub_lists {
            let sum: u32 = sub.receivers.iter().map(|r| r.weight).sum();
            assert_eq!(sum, TOTAL_WEIGHT);
        }
    }

    #[test]
    fn small_list_is_single_level() {
        let plan = build(&accounts(42)).unwrap();
        assert_eq!(plan.direct.len(), 42);
        assert!(plan.sub_lists.is_empty());
        assert_level_sums(&plan);
    }

    #[test]
    fn exactly_max_receivers_is_single_level() {
        let plan = build(&accounts(MAX_RECEIVERS)).unwrap();
        assert_eq!(plan.direct.len(), MAX_RECEIVERS);
        assert!(plan.sub_lists.is_empty());
    }

    #[test]
    fn one_over_max_splits_into_sub_list() {
        let plan = build(&accounts(MAX_RECEIVERS + 1)).unwrap();
        // k = ceil(1 / 199) = 1 sub-list, 199 direct receivers.
        assert_eq!(plan.sub_lists.len(), 1);
        assert_eq!(plan.direct.len(), MAX_RECEIVERS - 1);
        assert!(plan.root_slot_count() <= MAX_RECEIVERS);
        assert_level_sums(&plan);
    }

    #[test]
    fn large_list_respects_caps_everywhere() {
        let plan = build(&accounts(5_000)).unwrap();
        assert!(plan.root_slot_count() <= MAX_RECEIVERS);
        assert!(plan
            .sub_lists
            .iter()
            .all(|s| s.receivers.len() <= MAX_RECEIVERS));

        let placed: usize = plan.direct.len()
            + plan
                .sub_lists
                .iter()
                .map(|s| s.receivers.len())
                .sum::<usize>();
        assert_eq!(placed, 5_000);
        assert_level_sums(&plan);
    }

    #[test]
    fn max_nodes_fits() {
        let plan = build(&accounts(MAX_NODES)).unwrap();
        assert!(plan.root_slot_count() <= MAX_RECEIVERS);
        assert_level_sums(&plan);
    }

    #[test]
    fn every_positive_entry_gets_at_least_one_unit() {
        let mut list = accounts(300);
        for (i, account) in list.iter_mut().enumerate() {
            if i % 3 == 0 {
                account.weight = 1e-9;
            }
        }
        let plan = build(&list).unwrap();
        assert!(plan.direct.iter().all(|r| r.weight >= 1));
        for sub in &plan.sub_lists {
            assert!(sub.receivers.iter().all(|r| r.weight >= 1));
        }
    }

    #[test]
    fn rejects_oversized_input() {
        let result = build(&accounts(MAX_NODES + 1));
        assert_eq!(result, Err(SplitsError::TooManyAccounts(MAX_NODES + 1)));
    }

    #[test]
    fn rejects_empty_and_zero_weight_input() {
        assert_eq!(build(&[]), Err(SplitsError::NoPositiveWeights));

        let zeroed = vec![WeightedAccount {
            account_id: "acct-0".to_string(),
            weight: 0.0,
        }];
        assert_eq!(build(&zeroed), Err(SplitsError::NoPositiveWeights));
    }

    #[test]
    fn batches_sub_lists_in_twenties() {
        let plan = build(&accounts(10_000)).unwrap();
        let batches = batch_sub_lists(&plan);

        assert!(!batches.is_empty());
        let total: usize = batches.iter().map(Vec::len).sum();
        assert_eq!(total, plan.sub_lists.len());
        assert!(batches.iter().all(|b| b.len() <= SUB_LISTS_PER_BATCH));
        // All but the last batch are full.
        for batch in &batches[..batches.len() - 1] {
            assert_eq!(batch.len(), SUB_LISTS_PER_BATCH);
        }
    }
}
