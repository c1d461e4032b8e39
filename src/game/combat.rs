//! Combat pairing and battle resolution
//!
//! Pairing shuffles the active seats and walks them in adjacent pairs; an odd
//! seat out fights a ghost, which can neither win nor deal damage. The battle
//! itself sits behind a trait so a real simulation service can replace the
//! built-in strength comparison.

use rand::seq::SliceRandom;

use crate::room::Seat;
use crate::types::{BattleOutcome, SeatId};

/// Base damage dealt to the losing seat
pub const BASE_BATTLE_DAMAGE: u32 = 5;

/// A single matchup; `None` is the ghost
pub type Matchup = (SeatId, Option<SeatId>);

/// Shuffle active seat ids into adjacent pairs, ghosting the odd one out
pub fn pair_seats(active_seat_ids: &[SeatId]) -> Vec<Matchup> {
    let mut shuffled = active_seat_ids.to_vec();
    let mut rng = rand::rng();
    shuffled.shuffle(&mut rng);

    let mut pairs = Vec::with_capacity(shuffled.len().div_ceil(2));
    let mut iter = shuffled.into_iter();
    while let Some(first) = iter.next() {
        pairs.push((first, iter.next()));
    }
    pairs
}

/// Resolves a single matchup into an outcome
pub trait BattleSimulator: Send + Sync {
    /// Simulate a battle. `defender` is `None` when the seat fights the
    /// ghost, which always loses and deals no damage.
    fn simulate(&self, attacker: &Seat, defender: Option<&Seat>) -> BattleOutcome;
}

/// Default simulator: the stronger board wins, ties go to the attacker.
/// Damage scales with the tiers on the winning board.
#[derive(Debug, Default)]
pub struct StrengthSimulator;

impl StrengthSimulator {
    pub fn new() -> Self {
        Self
    }

    fn board_power(seat: &Seat) -> u32 {
        seat.board.iter().map(|m| m.attack + m.health).sum()
    }

    fn damage_from(winner: &Seat) -> u32 {
        BASE_BATTLE_DAMAGE + winner.board.iter().map(|m| u32::from(m.tier)).sum::<u32>()
    }
}

impl BattleSimulator for StrengthSimulator {
    fn simulate(&self, attacker: &Seat, defender: Option<&Seat>) -> BattleOutcome {
        let Some(defender) = defender else {
            // Ghost matchup: free win, nobody takes damage
            return BattleOutcome {
                winner: attacker.id().to_string(),
                loser: None,
                damage: 0,
            };
        };

        let (winner, loser) = if Self::board_power(defender) > Self::board_power(attacker) {
            (defender, attacker)
        } else {
            (attacker, defender)
        };

        BattleOutcome {
            winner: winner.id().to_string(),
            loser: Some(loser.id().to_string()),
            damage: Self::damage_from(winner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Minion;
    use crate::config::GameRules;

    fn seat(id: &str) -> Seat {
        Seat::human(id.to_string(), id.to_string(), &GameRules::default())
    }

    fn minion(tier: u8, attack: u32, health: u32) -> Minion {
        Minion {
            id: format!("m{}", tier),
            name: "Test Minion".to_string(),
            tier,
            attack,
            health,
        }
    }

    #[test]
    fn test_pairing_covers_everyone_once() {
        let ids: Vec<SeatId> = (0..8).map(|i| format!("p{}", i)).collect();
        let pairs = pair_seats(&ids);
        assert_eq!(pairs.len(), 4);

        let mut seen: Vec<&str> = Vec::new();
        for (a, b) in &pairs {
            seen.push(a);
            seen.push(b.as_deref().expect("even count has no ghost"));
        }
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 8);
    }

    #[test]
    fn test_odd_count_gets_one_ghost() {
        let ids: Vec<SeatId> = (0..5).map(|i| format!("p{}", i)).collect();
        let pairs = pair_seats(&ids);
        assert_eq!(pairs.len(), 3);

        let ghosts = pairs.iter().filter(|(_, b)| b.is_none()).count();
        assert_eq!(ghosts, 1);
    }

    #[test]
    fn test_empty_and_single() {
        assert!(pair_seats(&[]).is_empty());

        let pairs = pair_seats(&["solo".to_string()]);
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0].1.is_none());
    }

    #[test]
    fn test_ghost_battle_deals_no_damage() {
        let outcome = StrengthSimulator::new().simulate(&seat("alice"), None);
        assert_eq!(outcome.winner, "alice");
        assert_eq!(outcome.loser, None);
        assert_eq!(outcome.damage, 0);
    }

    #[test]
    fn test_stronger_board_wins() {
        let mut strong = seat("strong");
        strong.board.push(minion(3, 4, 4));
        let weak = seat("weak");

        let outcome = StrengthSimulator::new().simulate(&weak, Some(&strong));
        assert_eq!(outcome.winner, "strong");
        assert_eq!(outcome.loser.as_deref(), Some("weak"));
        assert_eq!(outcome.damage, BASE_BATTLE_DAMAGE + 3);
    }

    #[test]
    fn test_tie_goes_to_attacker_with_base_damage() {
        let outcome = StrengthSimulator::new().simulate(&seat("a"), Some(&seat("b")));
        assert_eq!(outcome.winner, "a");
        assert_eq!(outcome.loser.as_deref(), Some("b"));
        assert_eq!(outcome.damage, BASE_BATTLE_DAMAGE);
    }
}
