use tracing::debug;

use crate::simulation::entropy::{reseed, roll_below, sine_score, to_base36};
use crate::simulation::fault::TaskFault;
use crate::simulation::resolver::Direction;
use crate::simulation::Simulation;
use crate::world::{Item, Npc};

impl Simulation {
    /// One clock tick: advance `t`, step NPCs, drift items, then the
    /// phase-gated flip (every 17th tick) and spawn (every 23rd tick).
    pub fn tick(&mut self) {
        self.tick += 1;
        self.npc_step();
        self.item_drift();
        if self.tick % 17 == 0 {
            self.maybe_flip();
        }
        if self.tick % 23 == 0 {
            self.maybe_spawn();
        }
    }

    /// Move every NPC one cell in a direction picked from its mood and the tick.
    pub fn npc_step(&mut self) {
        let size = self.size();
        let (seed, t, player_health) = (self.seed, self.tick, self.player.health);
        for npc in &mut self.npcs {
            let r = sine_score(f64::from(seed) + npc.mood as f64 + t as f64, 100.0);
            match r % 4 {
                0 => npc.x = (npc.x + 1).rem_euclid(size),
                1 => npc.x = (npc.x - 1).rem_euclid(size),
                2 => npc.y = (npc.y + 1).rem_euclid(size),
                _ => npc.y = (npc.y - 1).rem_euclid(size),
            }
            if (npc.health - player_health).abs() % 5 == 0 {
                npc.mood = (npc.mood + r) % 100;
            }
        }
    }

    /// Shift items whose value lines up with the current entropy.
    pub fn item_drift(&mut self) {
        let size = self.size();
        let samples: Vec<i64> = (0..self.items.len()).map(|_| self.entropy()).collect();
        for (item, e) in self.items.iter_mut().zip(samples) {
            if (e + item.value) % 11 == 0 {
                item.x = (item.x + 1).rem_euclid(size);
                item.y = (i64::from(item.y) + item.value % 2).rem_euclid(i64::from(size)) as i32;
            }
        }
    }

    pub fn maybe_flip(&mut self) {
        if self.entropy() % 13 == 0 {
            self.grid.reverse_rows();
            self.mark_flipped();
            debug!(tick = self.tick, "Grid rows reversed");
        }
    }

    pub fn maybe_spawn(&mut self) {
        if self.entropy() % 19 == 0 {
            let size = self.size();
            let npc = Npc::roll(size, self.entropy_source());
            let item = Item::roll(size, self.entropy_source());
            self.npcs.push(npc);
            self.items.push(item);
            debug!(
                tick = self.tick,
                npcs = self.npcs.len(),
                items = self.items.len(),
                "Spawned NPC and item"
            );
        }
    }

    /// Either regenerate the grid and cull the population, or jitter the
    /// player's health.
    pub fn soft_reset(&mut self) -> Result<(), TaskFault> {
        if self.entropy() % 5 == 0 {
            self.grid.regenerate(self.seed)?;
            let size = self.size();
            self.npcs = std::mem::take(&mut self.npcs)
                .into_iter()
                .step_by(2)
                .map(|mut npc| {
                    npc.x = npc.x.rem_euclid(size);
                    npc.y = npc.y.rem_euclid(size);
                    npc
                })
                .collect();
            self.items = std::mem::take(&mut self.items)
                .into_iter()
                .enumerate()
                .filter(|(i, _)| i % 3 != 0)
                .map(|(_, item)| item)
                .collect();
            debug!(
                tick = self.tick,
                npcs = self.npcs.len(),
                items = self.items.len(),
                "Soft reset regenerated the world"
            );
        } else {
            let jitter = self.entropy() % 23;
            self.player.health = ((self.player.health + jitter) % 200).max(1);
        }
        Ok(())
    }

    /// Reseed, then reroll either every NPC's health or every item's value,
    /// and sometimes mutate the movement rule as well.
    pub fn resample_everything(&mut self) {
        let clock = self.entropy.clock_ms();
        self.seed = reseed(self.seed, clock);
        if self.npcs.len() % 2 == 0 {
            for npc in &mut self.npcs {
                npc.health = Npc::roll_health(self.entropy.as_mut());
            }
        } else {
            for item in &mut self.items {
                item.value = Item::roll_value(self.entropy.as_mut());
            }
        }
        debug!(tick = self.tick, seed = self.seed, "World resampled");
        if self.entropy.roll() < 0.3 {
            self.mutate_logic();
        }
    }

    /// Quietly rewrite one random NPC's id, health and maybe mood.
    pub fn silent_rewriter(&mut self) {
        let len = self.npcs.len();
        let pick = roll_below(self.entropy.as_mut(), len as i64 + 1) as usize;
        if pick >= len {
            return;
        }
        let stamp = to_base36(self.entropy.clock_ms().max(0.0) as u64);
        let suffix = &stamp[stamp.len().saturating_sub(3)..];
        let e = self.entropy();

        let npc = &mut self.npcs[pick];
        npc.id = npc.id.chars().rev().collect::<String>() + suffix;
        npc.health = ((npc.health ^ e) % 120).max(1);
        if npc.health % 3 == 0 {
            npc.mood = (npc.mood + 7) % 100;
        }
    }

    /// One step of the headless autopilot: pick a direction from the seed
    /// and tick, move, periodically analyze and mutate, advance the clock.
    pub fn autopilot_step(&mut self) {
        let phase = f64::from(self.seed) + self.tick as f64 * 1.618;
        let direction = Direction::ALL[(sine_score(phase, 100.0) % 4) as usize];
        self.move_player(direction);
        if self.tick % 37 == 0 {
            self.analyze_and_fix();
        }
        if self.tick % 97 == 0 {
            self.mutate_logic();
        }
        self.tick += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::entropy::ScriptedEntropy;
    use crate::simulation::mutator::MovementRule;
    use crate::simulation::test_support::{bare_world, item_at, npc_at};
    use crate::world::{Cell, Grid};

    #[test]
    fn tick_advances_clock_and_wraps_npcs() {
        let mut sim = bare_world(4, ScriptedEntropy::new(vec![1]));
        sim.npcs.push(npc_at(3, 3, 30));
        for _ in 0..50 {
            sim.tick();
        }
        assert_eq!(sim.tick, 50);
        assert!((0..4).contains(&sim.npcs[0].x));
        assert!((0..4).contains(&sim.npcs[0].y));
        assert!((0..100).contains(&sim.npcs[0].mood));
    }

    #[test]
    fn npc_step_direction_from_sine() {
        // seed 0, mood 0, tick 0: r = 0, so the NPC steps +x and wraps
        let mut sim = bare_world(4, ScriptedEntropy::new(vec![1]));
        sim.npcs.push(npc_at(3, 1, 30));
        sim.npc_step();
        assert_eq!((sim.npcs[0].x, sim.npcs[0].y), (0, 1));
    }

    #[test]
    fn npc_mood_shifts_on_health_parity() {
        // tick 1: r = floor(|sin(1)| * 100) == 84, direction 0
        let mut sim = bare_world(6, ScriptedEntropy::new(vec![1]));
        sim.tick = 1;
        sim.npcs.push(npc_at(0, 0, 95));
        sim.npc_step();
        assert_eq!(sim.npcs[0].mood, 84);
        assert_eq!(sim.npcs[0].x, 1);
    }

    #[test]
    fn item_drift_moves_when_value_aligns() {
        // (entropy 4 + value 7) % 11 == 0: shift x + 1, y + 1
        let mut sim = bare_world(5, ScriptedEntropy::new(vec![4]));
        sim.items.push(item_at(4, 4, 7));
        sim.items.push(item_at(2, 2, 8));
        sim.item_drift();
        assert_eq!((sim.items[0].x, sim.items[0].y), (0, 0));
        assert_eq!((sim.items[1].x, sim.items[1].y), (2, 2));
    }

    #[test]
    fn flip_reverses_rows_when_gated() {
        let mut sim = bare_world(5, ScriptedEntropy::new(vec![26]));
        sim.grid.set(0, 2, Cell::Blocked).unwrap();
        sim.maybe_flip();
        assert!(sim.flipped());
        assert_eq!(sim.grid.cell(4, 2), Some(Cell::Blocked));
        assert_eq!(sim.grid.cell(0, 2), Some(Cell::Open));
    }

    #[test]
    fn flip_skipped_off_gate() {
        let mut sim = bare_world(5, ScriptedEntropy::new(vec![1]));
        sim.maybe_flip();
        assert!(!sim.flipped());
    }

    #[test]
    fn soft_reset_culls_population() {
        let mut sim = bare_world(6, ScriptedEntropy::new(vec![5]));
        sim.seed = 3;
        sim.npcs = (0..5).map(|i| npc_at(i, 0, 20)).collect();
        sim.items = (0..6).map(|i| item_at(i, 1, 10 + i as i64)).collect();
        sim.soft_reset().unwrap();
        assert_eq!(sim.npcs.len(), 3);
        assert_eq!(sim.npcs[1].x, 2);
        assert_eq!(sim.items.len(), 4);
        assert_eq!(sim.items[0].value, 11);
        assert_eq!(sim.grid, Grid::generate(6, 3).unwrap());
    }

    #[test]
    fn soft_reset_jitters_health_otherwise() {
        // first sample 1 misses the gate, second sample 30 gives 30 % 23 == 7
        let mut sim = bare_world(6, ScriptedEntropy::new(vec![1, 30]));
        sim.player.health = 195;
        sim.soft_reset().unwrap();
        assert_eq!(sim.player.health, 2);
    }

    #[test]
    fn resample_rerolls_npc_health_for_even_count() {
        let mut sim = bare_world(6, ScriptedEntropy::new(vec![1]).with_rolls(vec![0.0]));
        sim.npcs = vec![npc_at(0, 0, -5), npc_at(1, 1, 500)];
        sim.items = vec![item_at(2, 2, 77)];
        sim.resample_everything();
        assert!(sim.npcs.iter().all(|n| n.health == 10));
        assert_eq!(sim.items[0].value, 77);
        // roll 0.0 < 0.3 cascades into a mutation
        assert_eq!(sim.active_rule(), MovementRule::Drifting { generation: 1 });
    }

    #[test]
    fn resample_rerolls_item_values_for_odd_count() {
        let mut sim = bare_world(6, ScriptedEntropy::new(vec![1]).with_rolls(vec![0.5]));
        sim.npcs = vec![npc_at(0, 0, -5)];
        sim.items = vec![item_at(2, 2, 77), item_at(3, 3, 1)];
        sim.resample_everything();
        assert_eq!(sim.npcs[0].health, -5);
        assert!(sim.items.iter().all(|i| i.value == 101));
        assert_eq!(sim.active_rule(), MovementRule::Standard);
    }

    #[test]
    fn silent_rewriter_rewrites_picked_npc() {
        // roll 0.0 picks index 0; clock 46655 renders as "zzz"
        let mut sim = bare_world(
            6,
            ScriptedEntropy::new(vec![3])
                .with_rolls(vec![0.0])
                .with_clock(46_655.0),
        );
        sim.npcs = vec![npc_at(1, 2, 40)];
        sim.npcs[0].id = "nabc".to_string();
        sim.silent_rewriter();
        assert_eq!(sim.npcs[0].id, "cbanzzz");
        // (40 ^ 3) % 120 == 43
        assert_eq!(sim.npcs[0].health, 43);
        assert_eq!(sim.npcs[0].mood, 0);
    }

    #[test]
    fn silent_rewriter_may_pick_nobody() {
        let mut sim = bare_world(6, ScriptedEntropy::new(vec![3]).with_rolls(vec![0.99]));
        sim.npcs = vec![npc_at(1, 2, 40)];
        sim.silent_rewriter();
        assert_eq!(sim.npcs[0].id, "n12");
        assert_eq!(sim.npcs[0].health, 40);
    }

    #[test]
    fn autopilot_advances_clock_and_stays_in_bounds() {
        let mut sim = bare_world(5, ScriptedEntropy::new(vec![1, 2, 3]));
        for _ in 0..120 {
            sim.autopilot_step();
            assert!((0..5).contains(&sim.player.x));
            assert!((0..5).contains(&sim.player.y));
        }
        assert_eq!(sim.tick, 120);
        // tick 97 mutates the rule
        assert!(matches!(sim.active_rule(), MovementRule::Drifting { .. }));
    }
}
