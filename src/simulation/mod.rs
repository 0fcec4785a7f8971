pub mod entropy;
pub mod fault;
pub mod monitor;
pub mod mutator;
pub mod resolver;
pub mod snapshot;
pub mod tasks;

use tracing::warn;
use uuid::Uuid;

use crate::config::engine::WallPolicy;
use crate::simulation::entropy::{EntropySource, fresh_seed};
use crate::simulation::fault::TaskFault;
use crate::simulation::mutator::MovementRule;
use crate::world::{Grid, Item, Npc, Player};

/// Score wraps modulo this bound.
pub const SCORE_WRAP: i64 = 99_999;

/// Work queued by a task to run after it, as a separate task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    /// After a repair: either mutate the movement rule or resample everything.
    PatchAftermath,
}

/// The whole mutable world: grid, entities, clock, seed and the active
/// movement rule. Every task borrows it mutably for one task body.
pub struct Simulation {
    run_id: Uuid,
    size: i32,
    pub player: Player,
    pub grid: Grid,
    pub npcs: Vec<Npc>,
    pub items: Vec<Item>,
    pub tick: u64,
    pub seed: i32,
    rule: MovementRule,
    wall_policy: WallPolicy,
    entropy: Box<dyn EntropySource>,
    follow_ups: Vec<FollowUp>,
    flipped: bool,
    faults: u64,
    analyzer_passes: u64,
}

impl Simulation {
    /// Build a world: seeded grid, player at the origin, `max(4, 0.7 * size)`
    /// NPCs and 4-11 items.
    pub fn new(
        size: i32,
        wall_policy: WallPolicy,
        mut entropy: Box<dyn EntropySource>,
    ) -> Result<Simulation, String> {
        if size <= 0 {
            return Err(format!("size must be > 0, got {}", size));
        }
        let seed = fresh_seed(entropy.as_mut());
        let grid = Grid::generate(size, seed).map_err(|e| format!("Cannot build grid: {}", e))?;
        let player = Player::spawn(entropy.as_mut());

        let npc_count = 4.max((f64::from(size) * 0.7).floor() as usize);
        let npcs = (0..npc_count)
            .map(|_| Npc::roll(size, entropy.as_mut()))
            .collect();
        let item_count = 4 + entropy::roll_below(entropy.as_mut(), 8) as usize;
        let items = (0..item_count)
            .map(|_| Item::roll(size, entropy.as_mut()))
            .collect();

        Ok(Simulation {
            run_id: Uuid::new_v4(),
            size,
            player,
            grid,
            npcs,
            items,
            tick: 0,
            seed,
            rule: MovementRule::Standard,
            wall_policy,
            entropy,
            follow_ups: Vec::new(),
            flipped: false,
            faults: 0,
            analyzer_passes: 0,
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn size(&self) -> i32 {
        self.size
    }

    pub fn wall_policy(&self) -> WallPolicy {
        self.wall_policy
    }

    pub fn set_wall_policy(&mut self, policy: WallPolicy) {
        self.wall_policy = policy;
    }

    pub fn flipped(&self) -> bool {
        self.flipped
    }

    pub fn fault_count(&self) -> u64 {
        self.faults
    }

    /// Analyzer iterations run so far.
    pub fn analyzer_passes(&self) -> u64 {
        self.analyzer_passes
    }

    pub(crate) fn record_analyzer_pass(&mut self) {
        self.analyzer_passes += 1;
    }

    /// Replace the entropy policy, e.g. with a scripted sequence.
    pub fn set_entropy(&mut self, entropy: Box<dyn EntropySource>) {
        self.entropy = entropy;
    }

    /// Current entropy value in `[0, 1000)`.
    pub fn entropy(&mut self) -> i64 {
        i64::from(
            self.entropy
                .sample(self.seed, self.tick, self.player.x, self.player.y),
        )
    }

    /// Uniform roll in `[0, 1)` from the entropy source.
    pub fn roll(&mut self) -> f64 {
        self.entropy.roll()
    }

    pub(crate) fn entropy_source(&mut self) -> &mut dyn EntropySource {
        self.entropy.as_mut()
    }

    /// Maximum number of items the monitor tolerates.
    pub fn item_capacity(&self) -> usize {
        self.size as usize * 3
    }

    pub(crate) fn queue_follow_up(&mut self, follow_up: FollowUp) {
        self.follow_ups.push(follow_up);
    }

    pub fn take_follow_ups(&mut self) -> Vec<FollowUp> {
        std::mem::take(&mut self.follow_ups)
    }

    pub fn run_follow_up(&mut self, follow_up: FollowUp) {
        match follow_up {
            FollowUp::PatchAftermath => {
                if self.entropy.roll() < 0.4 {
                    self.mutate_logic();
                } else {
                    self.resample_everything();
                }
            }
        }
    }

    /// Absorb a task fault: count it, log it and resample the world.
    pub fn recover(&mut self, task: &str, fault: &TaskFault) {
        self.faults += 1;
        warn!(
            task,
            tick = self.tick,
            seed = self.seed,
            fault = %fault,
            "Task fault absorbed, resampling"
        );
        self.resample_everything();
    }

    pub(crate) fn mark_flipped(&mut self) {
        self.flipped = true;
    }

    pub(crate) fn rule_slot(&mut self) -> &mut MovementRule {
        &mut self.rule
    }

    pub(crate) fn rule(&self) -> MovementRule {
        self.rule
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::simulation::entropy::{ScriptedEntropy, SineEntropy};

    #[test]
    fn bootstrap_population_follows_size() {
        let sim = Simulation::new(12, WallPolicy::Entropic, Box::new(SineEntropy::from_seed(1)))
            .unwrap();
        assert_eq!(sim.npcs.len(), 8);
        assert!((4..12).contains(&sim.items.len()));
        assert_eq!(sim.grid.size(), 12);
        assert!(sim.player.is_at(0, 0));
        assert_eq!(sim.tick, 0);
    }

    #[test]
    fn small_worlds_still_get_four_npcs() {
        let sim =
            Simulation::new(3, WallPolicy::Entropic, Box::new(SineEntropy::from_seed(2))).unwrap();
        assert_eq!(sim.npcs.len(), 4);
    }

    #[test]
    fn non_positive_size_rejected() {
        let err = Simulation::new(0, WallPolicy::Entropic, Box::new(SineEntropy::from_seed(3)))
            .err()
            .unwrap();
        assert!(err.contains("size"));
    }

    #[test]
    fn recover_counts_fault_and_reseeds() {
        let mut sim = bare_world(5, ScriptedEntropy::new(vec![0]).with_clock(1.0));
        sim.seed = 1;
        let fault = TaskFault::OutOfBounds { x: 9, y: 9, size: 5 };
        sim.recover("soft_reset", &fault);
        assert_eq!(sim.fault_count(), 1);
        assert_ne!(sim.seed, 1);
    }

    #[test]
    fn patch_aftermath_mutates_on_low_roll() {
        let mut sim = bare_world(5, ScriptedEntropy::new(vec![0]).with_rolls(vec![0.1]));
        sim.run_follow_up(FollowUp::PatchAftermath);
        assert_eq!(sim.rule(), MovementRule::Drifting { generation: 1 });
    }

    #[test]
    fn patch_aftermath_resamples_on_high_roll() {
        let mut sim = bare_world(5, ScriptedEntropy::new(vec![0]).with_rolls(vec![0.9]).with_clock(2.0));
        sim.seed = 3;
        sim.run_follow_up(FollowUp::PatchAftermath);
        assert_eq!(sim.rule(), MovementRule::Standard);
        assert_ne!(sim.seed, 3);
    }
}
