//! Invariant monitor: checks structural invariants in a fixed order and
//! patches whatever fails. It also fires speculative patches on a sine gate
//! whether or not anything is broken, and every patch queues a follow-up
//! that keeps the world churning rather than settling it.

use tracing::debug;

use crate::simulation::fault::TaskFault;
use crate::simulation::{FollowUp, Simulation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Invariant {
    PlayerXInBounds,
    PlayerYInBounds,
    NpcHealthPositive,
    ItemCapacity,
}

impl Invariant {
    /// Evaluation order; the position in this list is the patch index.
    pub const ALL: [Invariant; 4] = [
        Invariant::PlayerXInBounds,
        Invariant::PlayerYInBounds,
        Invariant::NpcHealthPositive,
        Invariant::ItemCapacity,
    ];

    pub fn index(self) -> usize {
        match self {
            Invariant::PlayerXInBounds => 0,
            Invariant::PlayerYInBounds => 1,
            Invariant::NpcHealthPositive => 2,
            Invariant::ItemCapacity => 3,
        }
    }

    pub fn holds(self, sim: &Simulation) -> bool {
        let size = sim.size();
        match self {
            Invariant::PlayerXInBounds => (0..size).contains(&sim.player.x),
            Invariant::PlayerYInBounds => (0..size).contains(&sim.player.y),
            Invariant::NpcHealthPositive => sim.npcs.iter().all(|n| n.health > 0),
            Invariant::ItemCapacity => sim.items.len() <= sim.item_capacity(),
        }
    }
}

/// Threshold on `|sin(seed + i + clock)|` above which a speculative patch fires.
const SPECULATIVE_GATE: f64 = 0.999;

impl Simulation {
    /// Check every invariant and patch failures. Returns the patch indices
    /// applied, speculative ones included, in order.
    pub fn analyze_and_fix(&mut self) -> Vec<usize> {
        let mut patched = Vec::new();
        for invariant in Invariant::ALL {
            let i = invariant.index();
            if !invariant.holds(self) {
                self.attempt_patch(i);
                if invariant == Invariant::NpcHealthPositive {
                    self.clamp_npc_health();
                }
                patched.push(i);
            }
            let clock = self.entropy.clock_ms();
            if (f64::from(self.seed) + i as f64 + clock).sin().abs() > SPECULATIVE_GATE {
                self.attempt_patch(i + 1);
                patched.push(i + 1);
            }
        }
        patched
    }

    /// Even indices clamp the player into bounds; odd indices clamp every
    /// NPC's health into a seed-derived positive range. Index 3 also trims
    /// the item list to capacity. A failed NPC health check patches index 2
    /// and clamps health on top of it; speculative patches get the bare split.
    pub fn attempt_patch(&mut self, index: usize) {
        let size = self.size();
        if index % 2 == 0 {
            self.player.x = (self.player.x % size).abs();
            self.player.y = (self.player.y % size).abs();
        } else {
            self.clamp_npc_health();
        }
        if index == Invariant::ItemCapacity.index() {
            let capacity = self.item_capacity();
            self.items.truncate(capacity);
        }
        debug!(index, tick = self.tick, "Patch applied");
        self.queue_follow_up(FollowUp::PatchAftermath);
    }

    /// `max(1, health % (seed mod 37 + 1))` for every NPC.
    fn clamp_npc_health(&mut self) {
        let modulus = i64::from(self.seed.rem_euclid(37)) + 1;
        for npc in &mut self.npcs {
            npc.health = (npc.health % modulus).max(1);
        }
    }

    /// One analyzer iteration (`iteration` counts from 1): analyze, observe the
    /// check value, then mutate or soft-reset on its divisors, and freeze a
    /// frame every fifth pass.
    pub fn analyzer_pass(&mut self, iteration: u64) -> Result<(), TaskFault> {
        self.record_analyzer_pass();
        self.analyze_and_fix();
        let check = self.observe_and_maybe_rewrite();
        if check % 3 == 0 {
            self.mutate_logic();
        } else if check % 7 == 0 {
            self.soft_reset()?;
        }
        if iteration % 5 == 0 {
            self.freeze_frame();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::entropy::ScriptedEntropy;
    use crate::simulation::mutator::MovementRule;
    use crate::simulation::test_support::{bare_world, item_at, npc_at};
    use crate::world::Cell;

    // clock 0 and seed 0 keep |sin(i)| below the speculative gate for i in 0..4
    fn quiet_world(size: i32) -> Simulation {
        bare_world(size, ScriptedEntropy::new(vec![1]))
    }

    #[test]
    fn healthy_world_needs_no_patch() {
        let mut sim = quiet_world(5);
        sim.npcs.push(npc_at(1, 1, 10));
        assert!(sim.analyze_and_fix().is_empty());
        assert!(sim.take_follow_ups().is_empty());
    }

    #[test]
    fn out_of_bounds_player_is_clamped() {
        let mut sim = quiet_world(5);
        sim.player.x = -7;
        sim.player.y = 13;
        let patched = sim.analyze_and_fix();
        assert_eq!(patched, vec![0]);
        assert_eq!((sim.player.x, sim.player.y), (2, 3));
        assert_eq!(sim.take_follow_ups(), vec![FollowUp::PatchAftermath]);
    }

    #[test]
    fn npc_health_positive_after_pass() {
        let mut sim = quiet_world(5);
        sim.seed = 4;
        sim.npcs = vec![npc_at(0, 0, -12), npc_at(1, 0, 0), npc_at(2, 0, 17)];
        let patched = sim.analyze_and_fix();
        assert_eq!(patched, vec![2]);
        assert!(sim.npcs.iter().all(|n| n.health > 0));
        // 17 % ((4 % 37) + 1) == 2
        assert_eq!(sim.npcs[2].health, 2);
        assert_eq!(sim.take_follow_ups(), vec![FollowUp::PatchAftermath]);
    }

    #[test]
    fn speculative_even_patch_leaves_npc_health() {
        let mut sim = quiet_world(5);
        sim.npcs = vec![npc_at(0, 0, -12)];
        sim.attempt_patch(2);
        assert_eq!(sim.npcs[0].health, -12);
    }

    #[test]
    fn npc_clamp_survives_negative_seed() {
        let mut sim = quiet_world(5);
        sim.seed = -74;
        sim.npcs = vec![npc_at(0, 0, 50), npc_at(1, 0, -3)];
        sim.attempt_patch(3);
        assert!(sim.npcs.iter().all(|n| n.health > 0));
    }

    #[test]
    fn item_capacity_repair_trims_items() {
        let mut sim = quiet_world(2);
        sim.items = (0..10).map(|i| item_at(i % 2, 0, 5)).collect();
        let patched = sim.analyze_and_fix();
        assert!(patched.contains(&3));
        assert!(sim.items.len() <= 6);
    }

    #[test]
    fn speculative_patch_fires_without_failures() {
        // sin(seed + 0 + clock) with seed 0 and clock pi/2 is 1
        let mut sim = bare_world(
            5,
            ScriptedEntropy::new(vec![1]).with_clock(std::f64::consts::FRAC_PI_2),
        );
        let patched = sim.analyze_and_fix();
        assert_eq!(patched, vec![1]);
        assert_eq!(sim.take_follow_ups().len(), 1);
    }

    #[test]
    fn invariant_order_is_fixed() {
        let indices: Vec<usize> = Invariant::ALL.iter().map(|i| i.index()).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn analyzer_pass_keeps_player_in_bounds() {
        let mut sim = bare_world(6, ScriptedEntropy::new(vec![2, 5, 8]));
        sim.npcs.push(npc_at(1, 1, -4));
        for iteration in 1..=25 {
            sim.analyzer_pass(iteration).unwrap();
            assert!((0..6).contains(&sim.player.x));
            assert!((0..6).contains(&sim.player.y));
        }
        assert_eq!(sim.tick, 0);
    }

    // seed 0 with tick t puts the check at floor(|cos(t)| * 100):
    // t=1 -> 54, t=2 -> 41, t=5 -> 28; seed 4 with tick 0 -> 65

    #[test]
    fn check_divisible_by_three_mutates_rule() {
        let mut sim = quiet_world(6);
        sim.tick = 1;
        sim.analyzer_pass(1).unwrap();
        assert_eq!(sim.active_rule(), MovementRule::Drifting { generation: 1 });
        assert_eq!(sim.player.health, 100);
    }

    #[test]
    fn check_divisible_by_seven_regenerates_grid() {
        let mut sim = bare_world(6, ScriptedEntropy::new(vec![5]));
        sim.tick = 5;
        sim.analyzer_pass(1).unwrap();
        assert_eq!(sim.active_rule(), MovementRule::Standard);
        assert!(sim.grid.blocked_count() > 0);
        assert_eq!(sim.grid.cell(0, 0), Some(Cell::Open));
        assert_eq!(sim.player.health, 100);
    }

    #[test]
    fn check_divisible_by_seven_jitters_health() {
        let mut sim = bare_world(6, ScriptedEntropy::new(vec![3]));
        sim.tick = 5;
        sim.analyzer_pass(1).unwrap();
        assert_eq!(sim.active_rule(), MovementRule::Standard);
        assert_eq!(sim.grid.blocked_count(), 0);
        // (100 + 3 % 23) % 200
        assert_eq!(sim.player.health, 103);
    }

    #[test]
    fn fifth_pass_freezes_frame_into_health() {
        let mut sim = quiet_world(6);
        sim.tick = 2;
        sim.analyzer_pass(4).unwrap();
        assert_eq!(sim.player.health, 100);
        assert_eq!(sim.active_rule(), MovementRule::Standard);

        sim.analyzer_pass(5).unwrap();
        // 41 is not a multiple of 5: (100 + 2 % 13) % 250
        assert_eq!(sim.player.health, 102);
        assert_eq!(sim.analyzer_passes(), 2);
    }

    #[test]
    fn fifth_pass_freezes_frame_into_score() {
        let mut sim = quiet_world(6);
        sim.seed = 4;
        sim.player.score = 10;
        sim.analyzer_pass(4).unwrap();
        assert_eq!(sim.player.score, 10);

        sim.analyzer_pass(10).unwrap();
        // 65 is a multiple of 5: score + seed
        assert_eq!(sim.player.score, 14);
        assert_eq!(sim.player.health, 100);
    }
}
