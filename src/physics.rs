//! Per-frame physics: gravity, walls, floor response and the resting-atop stacking rule.

use crate::FloorPolicy;
use crate::game::{Field, Token};

#[derive(Debug, Clone, Copy)]
pub struct PhysicsParams {
    pub gravity: f32,
    pub floor: FloorPolicy,
    /// Fraction of vertical speed kept on a bounce.
    pub damping: f32,
    /// Same-tier pairs below this tier are left overlapping for the merge pass.
    pub max_tier: usize,
}

/// Advance every token one frame, in list order.
pub fn step(tokens: &mut [Token], field: Field, params: &PhysicsParams) {
    for i in 0..tokens.len() {
        let t = &mut tokens[i];
        integrate(t, params.gravity);
        resolve_walls(t, field);
        resolve_floor(t, field, params.floor, params.damping);

        for j in 0..tokens.len() {
            if i == j {
                continue;
            }
            let other = tokens[j];
            let t = &mut tokens[i];
            if will_merge(t, &other, params.max_tier) || !t.overlaps(&other) {
                continue;
            }
            if rests_on(t, i, &other, j) {
                t.y = other.y - (t.radius + other.radius);
                t.vy = 0.0;
            }
        }
    }
}

/// `vy += g; y += vy; x += vx`.
#[inline]
pub fn integrate(t: &mut Token, gravity: f32) {
    t.vy += gravity;
    t.y += t.vy;
    t.x += t.vx;
}

/// Keep the token between the side walls, reflecting vx on contact.
pub fn resolve_walls(t: &mut Token, field: Field) {
    if t.x - t.radius < 0.0 {
        t.x = t.radius;
        t.vx = t.vx.abs();
    } else if t.x + t.radius > field.width {
        t.x = field.width - t.radius;
        t.vx = -t.vx.abs();
    }
    t.x = field.clamp_x(t.x, t.radius);
}

pub fn resolve_floor(t: &mut Token, field: Field, policy: FloorPolicy, damping: f32) {
    if t.bottom() <= field.height {
        return;
    }
    t.y = field.height - t.radius;
    t.vy = match policy {
        FloorPolicy::Settle => 0.0,
        FloorPolicy::Bounce => -t.vy * damping,
    };
}

/// Clamp position into the field without touching velocity.
pub fn contain(t: &mut Token, field: Field) {
    t.x = field.clamp_x(t.x, t.radius);
    if t.bottom() > field.height {
        t.y = field.height - t.radius;
    }
}

#[inline]
fn will_merge(a: &Token, b: &Token, max_tier: usize) -> bool {
    a.tier == b.tier && a.tier < max_tier
}

/// `a` is falling and the upper of the pair; equal heights go to the later-listed token.
/// Tokens already stopped by the floor, or moving up, are left where they are.
#[inline]
fn rests_on(a: &Token, ai: usize, b: &Token, bi: usize) -> bool {
    a.vy > 0.0 && (a.y < b.y || (a.y == b.y && ai > bi))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::TokenId;
    use proptest::prelude::*;

    const FIELD: Field = Field {
        width: 100.0,
        height: 200.0,
    };

    fn token(id: u64, x: f32, y: f32, tier: usize) -> Token {
        Token {
            id: TokenId(id),
            x,
            y,
            vx: 0.0,
            vy: 0.0,
            radius: 10.0,
            tier,
        }
    }

    fn params(floor: FloorPolicy) -> PhysicsParams {
        PhysicsParams {
            gravity: 0.5,
            floor,
            damping: 0.7,
            max_tier: 12,
        }
    }

    #[test]
    fn free_fall_integrates_velocity_then_position() {
        let mut tokens = [token(0, 50.0, 50.0, 0)];
        tokens[0].vy = 1.0;
        step(&mut tokens, FIELD, &params(FloorPolicy::Settle));
        assert_eq!(tokens[0].vy, 1.5);
        assert_eq!(tokens[0].y, 51.5);
    }

    #[test]
    fn settle_clamps_and_stops() {
        let mut tokens = [token(0, 50.0, 189.0, 0)];
        tokens[0].vy = 4.0;
        step(&mut tokens, FIELD, &params(FloorPolicy::Settle));
        assert_eq!(tokens[0].y, 190.0);
        assert_eq!(tokens[0].vy, 0.0);
    }

    #[test]
    fn bounce_reflects_with_damping() {
        let mut tokens = [token(0, 50.0, 189.0, 0)];
        tokens[0].vy = 4.5;
        step(&mut tokens, FIELD, &params(FloorPolicy::Bounce));
        assert_eq!(tokens[0].y, 190.0);
        assert!((tokens[0].vy - (-5.0 * 0.7)).abs() < 1e-6);
    }

    #[test]
    fn walls_reflect_horizontal_velocity() {
        let mut tokens = [token(0, 11.0, 50.0, 0), token(1, 89.0, 100.0, 1)];
        tokens[0].vx = -3.0;
        tokens[1].vx = 3.0;
        step(&mut tokens, FIELD, &params(FloorPolicy::Settle));
        assert_eq!(tokens[0].x, 10.0);
        assert_eq!(tokens[0].vx, 3.0);
        assert_eq!(tokens[1].x, 90.0);
        assert_eq!(tokens[1].vx, -3.0);
    }

    #[test]
    fn different_tiers_stack_atop() {
        let mut tokens = [token(0, 50.0, 190.0, 0), token(1, 55.0, 175.0, 1)];
        step(&mut tokens, FIELD, &params(FloorPolicy::Settle));
        assert_eq!(tokens[0].y, 190.0);
        assert_eq!(tokens[1].y, 170.0);
        assert_eq!(tokens[1].vy, 0.0);
    }

    #[test]
    fn same_tier_pairs_are_left_overlapping() {
        let mut tokens = [token(0, 50.0, 190.0, 3), token(1, 55.0, 175.0, 3)];
        step(&mut tokens, FIELD, &params(FloorPolicy::Settle));
        assert!(tokens[0].overlaps(&tokens[1]));
    }

    #[test]
    fn max_tier_pairs_stack_instead_of_overlapping() {
        let mut tokens = [token(0, 50.0, 190.0, 12), token(1, 55.0, 175.0, 12)];
        step(&mut tokens, FIELD, &params(FloorPolicy::Settle));
        assert_eq!(tokens[1].y, 170.0);
    }

    #[test]
    fn floor_neighbours_do_not_climb_each_other() {
        let mut big = token(0, 50.0, 190.0, 1);
        let mut small = token(1, 62.0, 195.0, 0);
        small.radius = 5.0;
        big.radius = 10.0;
        let mut tokens = [big, small];
        assert!(tokens[0].overlaps(&tokens[1]));
        step(&mut tokens, FIELD, &params(FloorPolicy::Settle));
        assert_eq!(tokens[0].y, 190.0);
        assert_eq!(tokens[1].y, 195.0);
    }

    #[test]
    fn contain_pulls_grown_token_back_inside() {
        let mut t = token(0, 95.0, 195.0, 0);
        t.vy = 2.0;
        contain(&mut t, FIELD);
        assert_eq!((t.x, t.y, t.vy), (90.0, 190.0, 2.0));
    }

    proptest! {
        #[test]
        fn bottom_never_passes_floor(
            ys in proptest::collection::vec(0.0f32..200.0, 1..12),
            vys in proptest::collection::vec(-5.0f32..20.0, 12),
            bounce in any::<bool>(),
        ) {
            let mut tokens: Vec<Token> = ys
                .iter()
                .enumerate()
                .map(|(i, &y)| {
                    let mut t = token(i as u64, 10.0 + (i as f32 * 7.0) % 80.0, y, i % 4);
                    t.vy = vys[i];
                    t
                })
                .collect();
            let floor = if bounce { FloorPolicy::Bounce } else { FloorPolicy::Settle };
            for _ in 0..20 {
                step(&mut tokens, FIELD, &params(floor));
                for t in &tokens {
                    prop_assert!(t.bottom() <= FIELD.height);
                    prop_assert!(t.x - t.radius >= 0.0 && t.x + t.radius <= FIELD.width);
                }
            }
        }
    }
}
