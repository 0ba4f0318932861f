//! Classifies confirmed leader transactions into buy / sell / irrelevant.

use crate::models::{ActionKind, LeaderAction, TransactionView, NATIVE_MINT};

/// Decide what, if anything, the leader did in this transaction.
///
/// Returns `None` for everything that must not be mirrored: failed
/// transactions, transactions the leader did not sign (airdrops, incoming
/// transfers), and balance movements with no non-reserve asset change.
///
/// A buy outranks a sell when both patterns appear: an asset-to-asset swap
/// that spends reserve is treated as entering the gained asset.
pub fn classify(view: &TransactionView, leader: &str, mirror_sell: bool) -> Option<LeaderAction> {
    if !view.succeeded {
        return None;
    }
    if !view.is_signer(leader) {
        return None;
    }

    let spent = view.spent_amount(leader);
    let mut deltas = view.asset_deltas(leader);
    deltas.remove(NATIVE_MINT);

    if deltas.is_empty() {
        return None;
    }

    // Largest positive delta wins; strict comparison keeps the first mint
    // in map order on ties.
    let mut gained: Option<(&String, i128)> = None;
    let mut dumped: Option<(&String, i128)> = None;
    for (mint, delta) in &deltas {
        if *delta > 0 && gained.map_or(true, |(_, best)| *delta > best) {
            gained = Some((mint, *delta));
        }
        if *delta < 0 && dumped.map_or(true, |(_, worst)| *delta < worst) {
            dumped = Some((mint, *delta));
        }
    }

    if let Some((mint, delta)) = gained {
        if spent < 0 {
            return Some(LeaderAction {
                kind: ActionKind::Buy,
                asset: mint.clone(),
                magnitude: magnitude(delta),
            });
        }
    }

    if mirror_sell {
        if let Some((mint, delta)) = dumped {
            return Some(LeaderAction {
                kind: ActionKind::Sell,
                asset: mint.clone(),
                magnitude: magnitude(delta),
            });
        }
    }

    None
}

fn magnitude(delta: i128) -> u64 {
    u64::try_from(delta.unsigned_abs()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountKey, TokenBalance};

    const LEADER: &str = "LeaderWallet11111111111111111111111111111111";

    fn view(native_spent: i64, pre: &[(&str, u64)], post: &[(&str, u64)]) -> TransactionView {
        let token = |entries: &[(&str, u64)]| {
            entries
                .iter()
                .map(|(mint, amount)| TokenBalance {
                    mint: mint.to_string(),
                    owner: LEADER.to_string(),
                    amount: *amount,
                })
                .collect::<Vec<_>>()
        };
        let pre_native = 5_000_000_000u64;
        let post_native = (pre_native as i64 + native_spent) as u64;
        TransactionView {
            signature: "sig".to_string(),
            succeeded: true,
            accounts: vec![AccountKey {
                pubkey: LEADER.to_string(),
                signer: true,
            }],
            pre_native: vec![pre_native],
            post_native: vec![post_native],
            pre_tokens: token(pre),
            post_tokens: token(post),
        }
    }

    #[test]
    fn test_buy_from_native_spend() {
        let view = view(-1_000_000_000, &[("MintX", 0)], &[("MintX", 500)]);
        let action = classify(&view, LEADER, true).unwrap();
        assert_eq!(action.kind, ActionKind::Buy);
        assert_eq!(action.asset, "MintX");
        assert_eq!(action.magnitude, 500);
    }

    #[test]
    fn test_failed_transaction_ignored() {
        let mut view = view(-1_000_000_000, &[("MintX", 0)], &[("MintX", 500)]);
        view.succeeded = false;
        assert!(classify(&view, LEADER, true).is_none());
    }

    #[test]
    fn test_non_signer_ignored() {
        let mut view = view(-1_000_000_000, &[("MintX", 0)], &[("MintX", 500)]);
        view.accounts[0].signer = false;
        assert!(classify(&view, LEADER, true).is_none());

        // An airdrop mentions the wallet without its signature.
        let other = view.clone();
        assert!(classify(&other, "SomeoneElse", true).is_none());
    }

    #[test]
    fn test_gain_without_spend_is_not_a_buy() {
        // Token arrived but no reserve left the wallet.
        let view = view(0, &[("MintX", 0)], &[("MintX", 500)]);
        assert!(classify(&view, LEADER, true).is_none());
    }

    #[test]
    fn test_wrapped_native_is_not_a_candidate() {
        let view = view(
            -1_000_000_000,
            &[(NATIVE_MINT, 2_000_000_000)],
            &[(NATIVE_MINT, 3_000_000_000)],
        );
        assert!(classify(&view, LEADER, true).is_none());
    }

    #[test]
    fn test_largest_gain_wins() {
        let view = view(
            -1_000_000_000,
            &[("MintA", 0), ("MintB", 0)],
            &[("MintA", 100), ("MintB", 900)],
        );
        let action = classify(&view, LEADER, true).unwrap();
        assert_eq!(action.asset, "MintB");
        assert_eq!(action.magnitude, 900);
    }

    #[test]
    fn test_equal_gains_pick_first_in_order() {
        let view = view(
            -1_000_000_000,
            &[("MintB", 0), ("MintA", 0)],
            &[("MintB", 500), ("MintA", 500)],
        );
        let action = classify(&view, LEADER, true).unwrap();
        // Deltas iterate in mint order, so MintA is encountered first.
        assert_eq!(action.asset, "MintA");
    }

    #[test]
    fn test_sell_detected() {
        let view = view(0, &[("MintX", 800)], &[("MintX", 300)]);
        let action = classify(&view, LEADER, true).unwrap();
        assert_eq!(action.kind, ActionKind::Sell);
        assert_eq!(action.asset, "MintX");
        assert_eq!(action.magnitude, 500);
    }

    #[test]
    fn test_sell_disabled() {
        let view = view(0, &[("MintX", 800)], &[("MintX", 300)]);
        assert!(classify(&view, LEADER, false).is_none());
    }

    #[test]
    fn test_most_negative_sell_wins() {
        let view = view(
            0,
            &[("MintA", 1_000), ("MintB", 1_000)],
            &[("MintA", 900), ("MintB", 0)],
        );
        let action = classify(&view, LEADER, true).unwrap();
        assert_eq!(action.asset, "MintB");
        assert_eq!(action.magnitude, 1_000);
    }

    #[test]
    fn test_asset_swap_counts_as_buy() {
        // Leader swapped MintA for MintB while reserve paid the fees/route.
        let view = view(
            -5_000_000,
            &[("MintA", 1_000), ("MintB", 0)],
            &[("MintA", 0), ("MintB", 2_000)],
        );
        let action = classify(&view, LEADER, true).unwrap();
        assert_eq!(action.kind, ActionKind::Buy);
        assert_eq!(action.asset, "MintB");
    }

    #[test]
    fn test_no_token_movement_ignored() {
        // Plain transfer: native moved, no token deltas.
        let view = view(-1_000_000_000, &[], &[]);
        assert!(classify(&view, LEADER, true).is_none());
    }
}
