//! Merge pass: same-tier overlapping tokens evolve into the next tier.
//!
//! Candidate pairs are taken nearest first; each token joins at most one merge
//! per pass. The older (lower-indexed) token survives and grows, the other is
//! compacted out by id once the scan is done.

use crate::game::{Token, TokenId};
use std::collections::HashSet;

/// One applied merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Merge {
    pub survivor: TokenId,
    pub consumed: TokenId,
    /// Tier the survivor advanced to.
    pub tier: usize,
    pub points: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub merges: Vec<Merge>,
    pub points: u32,
}

/// Points for a merge producing a token of `new_radius`.
pub fn merge_points(new_radius: f32) -> u32 {
    (new_radius * 10.0).round().max(0.0) as u32
}

/// Apply one merge pass over `tokens`.
pub fn resolve(
    tokens: &mut Vec<Token>,
    max_tier: usize,
    radius_for: impl Fn(usize) -> f32,
) -> MergeReport {
    let mut candidates = Vec::new();
    for i in 0..tokens.len() {
        let a = &tokens[i];
        if a.tier >= max_tier {
            continue;
        }
        for (j, b) in tokens.iter().enumerate().skip(i + 1) {
            if a.tier == b.tier && a.overlaps(b) {
                candidates.push((a.distance(b), i, j));
            }
        }
    }
    if candidates.is_empty() {
        return MergeReport::default();
    }
    candidates.sort_by(|x, y| x.0.total_cmp(&y.0).then(x.1.cmp(&y.1)).then(x.2.cmp(&y.2)));

    let mut taken = vec![false; tokens.len()];
    let mut consumed = HashSet::new();
    let mut report = MergeReport::default();
    for (_, i, j) in candidates {
        if taken[i] || taken[j] {
            continue;
        }
        taken[i] = true;
        taken[j] = true;

        let tier = tokens[i].tier + 1;
        let radius = radius_for(tier);
        tokens[i].tier = tier;
        tokens[i].radius = radius;

        let points = merge_points(radius);
        report.points = report.points.saturating_add(points);
        report.merges.push(Merge {
            survivor: tokens[i].id,
            consumed: tokens[j].id,
            tier,
            points,
        });
        consumed.insert(tokens[j].id);
    }
    tokens.retain(|t| !consumed.contains(&t.id));
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn radius(tier: usize) -> f32 {
        30.0 + tier as f32 * 5.0
    }

    fn token(id: u64, x: f32, y: f32, tier: usize) -> Token {
        Token {
            id: TokenId(id),
            x,
            y,
            vx: 0.0,
            vy: 0.0,
            radius: radius(tier),
            tier,
        }
    }

    #[test]
    fn overlapping_pair_merges_into_next_tier() {
        let mut tokens = vec![token(0, 100.0, 100.0, 0), token(1, 110.0, 100.0, 0)];
        let report = resolve(&mut tokens, 12, radius);
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].id, TokenId(0));
        assert_eq!(tokens[0].tier, 1);
        assert_eq!(tokens[0].radius, 35.0);
        assert_eq!(report.points, 350);
        assert_eq!(
            report.merges,
            vec![Merge {
                survivor: TokenId(0),
                consumed: TokenId(1),
                tier: 1,
                points: 350,
            }]
        );
    }

    #[test]
    fn touching_is_not_overlapping() {
        let mut tokens = vec![token(0, 100.0, 100.0, 0), token(1, 160.0, 100.0, 0)];
        let report = resolve(&mut tokens, 12, radius);
        assert!(report.merges.is_empty());
        assert_eq!(tokens.len(), 2);
    }

    #[test]
    fn different_tiers_do_not_merge() {
        let mut tokens = vec![token(0, 100.0, 100.0, 0), token(1, 105.0, 100.0, 1)];
        assert!(resolve(&mut tokens, 12, radius).merges.is_empty());
        assert_eq!(tokens.len(), 2);
    }

    #[test]
    fn max_tier_never_merges() {
        let mut tokens = vec![token(0, 100.0, 100.0, 12), token(1, 101.0, 100.0, 12)];
        assert!(resolve(&mut tokens, 12, radius).merges.is_empty());
        assert_eq!(tokens.iter().map(|t| t.tier).collect::<Vec<_>>(), vec![12, 12]);
    }

    #[test]
    fn nearest_neighbour_wins_in_a_cluster() {
        // Token 1 overlaps both 0 and 2; it is closer to 2.
        let mut tokens = vec![
            token(0, 100.0, 100.0, 0),
            token(1, 140.0, 100.0, 0),
            token(2, 150.0, 100.0, 0),
        ];
        let report = resolve(&mut tokens, 12, radius);
        assert_eq!(report.merges.len(), 1);
        assert_eq!(report.merges[0].survivor, TokenId(1));
        assert_eq!(report.merges[0].consumed, TokenId(2));
        let ids: Vec<_> = tokens.iter().map(|t| (t.id, t.tier)).collect();
        assert_eq!(ids, vec![(TokenId(0), 0), (TokenId(1), 1)]);
    }

    #[test]
    fn disjoint_pairs_all_merge_in_one_pass() {
        let mut tokens = vec![
            token(0, 100.0, 100.0, 0),
            token(1, 500.0, 100.0, 2),
            token(2, 105.0, 100.0, 0),
            token(3, 505.0, 100.0, 2),
        ];
        let report = resolve(&mut tokens, 12, radius);
        assert_eq!(report.merges.len(), 2);
        assert_eq!(report.points, merge_points(35.0) + merge_points(45.0));
        let ids: Vec<_> = tokens.iter().map(|t| (t.id, t.tier)).collect();
        assert_eq!(ids, vec![(TokenId(0), 1), (TokenId(1), 3)]);
    }

    #[test]
    fn survivor_does_not_chain_in_the_same_pass() {
        // 0+1 make a tier 1 next to an existing tier 1; that waits for the next pass.
        let mut tokens = vec![
            token(0, 100.0, 100.0, 0),
            token(1, 101.0, 100.0, 0),
            token(2, 120.0, 100.0, 1),
        ];
        let first = resolve(&mut tokens, 12, radius);
        assert_eq!(first.merges.len(), 1);
        assert_eq!(tokens.len(), 2);
        let second = resolve(&mut tokens, 12, radius);
        assert_eq!(second.merges.len(), 1);
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].tier, 2);
    }

    #[test]
    fn points_follow_new_radius() {
        assert_eq!(merge_points(35.0), 350);
        assert_eq!(merge_points(4.25), 43);
    }

    proptest! {
        #[test]
        fn each_token_merges_at_most_once_per_pass(
            xs in proptest::collection::vec(0.0f32..300.0, 0..16),
            tiers in proptest::collection::vec(0usize..4, 16),
        ) {
            let mut tokens: Vec<Token> = xs
                .iter()
                .enumerate()
                .map(|(i, &x)| token(i as u64, x, 100.0, tiers[i]))
                .collect();
            let before = tokens.clone();
            let report = resolve(&mut tokens, 3, radius);

            prop_assert_eq!(tokens.len() + report.merges.len(), before.len());
            let mut seen = HashSet::new();
            for m in &report.merges {
                prop_assert!(seen.insert(m.survivor));
                prop_assert!(seen.insert(m.consumed));
                let old = before.iter().find(|t| t.id == m.survivor).unwrap();
                prop_assert_eq!(m.tier, old.tier + 1);
                prop_assert!(old.tier < 3);
                prop_assert_eq!(m.points, merge_points(radius(m.tier)));
            }
            let total: u32 = report.merges.iter().map(|m| m.points).sum();
            prop_assert_eq!(report.points, total);
            for t in tokens.iter().filter(|t| t.tier == 3) {
                let was = before.iter().find(|b| b.id == t.id).unwrap();
                prop_assert!(was.tier == 3 || report.merges.iter().any(|m| m.survivor == t.id));
            }
        }
    }
}
