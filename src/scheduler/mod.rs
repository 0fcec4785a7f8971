//! Scheduling layer and composition root.
//!
//! An [`Engine`] owns the single [`Simulation`] behind one mutex and drives it
//! with independent tokio tasks: three one-shot delayed tasks, a fixed-interval
//! tick, and (after [`Engine::start`]) two self-rescheduling chains for the
//! autopilot and the analyzer. Task bodies never hold the lock across an
//! `.await`, so every mutation is serialized exactly as on one logical thread.
//! Ordering between independent timers is not guaranteed.
//!
//! Every task body runs behind a fault boundary: faults and panics are logged,
//! counted and answered with a resample, and the task carries on.

use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::engine::EngineConfig;
use crate::simulation::entropy::{EntropySource, SineEntropy};
use crate::simulation::fault::TaskFault;
use crate::simulation::mutator::MovementRule;
use crate::simulation::resolver::Direction;
use crate::simulation::snapshot::Snapshot;
use crate::simulation::{FollowUp, Simulation};

type TaskBody = fn(&mut Simulation) -> Result<(), TaskFault>;

/// Outstanding task handles. Once closed, nothing new is spawned.
#[derive(Default)]
struct TaskSet {
    closed: bool,
    started: bool,
    handles: Vec<JoinHandle<()>>,
}

struct Core {
    sim: Mutex<Simulation>,
    config: EngineConfig,
    stop: watch::Sender<bool>,
    tasks: Mutex<TaskSet>,
}

/// A live, concurrently advancing simulation.
pub struct Engine {
    core: Arc<Core>,
}

impl Engine {
    /// Build the world and arm the background tasks. Must be called from
    /// inside a tokio runtime.
    pub fn create(config: EngineConfig) -> Result<Engine, String> {
        Self::create_with_entropy(config, Box::new(SineEntropy::new()))
    }

    pub fn create_with_entropy(
        config: EngineConfig,
        entropy: Box<dyn EntropySource>,
    ) -> Result<Engine, String> {
        config.validate()?;
        tokio::runtime::Handle::try_current()
            .map_err(|e| format!("Engine must be created inside a tokio runtime: {}", e))?;

        let sim = Simulation::new(config.size, config.wall_policy, entropy)?;
        info!(
            run_id = %sim.run_id(),
            size = sim.size(),
            seed = sim.seed,
            npcs = sim.npcs.len(),
            items = sim.items.len(),
            "Simulation created"
        );

        let (stop, _) = watch::channel(false);
        let core = Arc::new(Core {
            sim: Mutex::new(sim),
            config,
            stop,
            tasks: Mutex::new(TaskSet::default()),
        });
        core.install_background_tasks();
        Ok(Engine { core })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.core.config
    }

    pub fn move_player(&self, direction: Direction) {
        self.core.run("move_player", |sim| {
            sim.move_player(direction);
            Ok(())
        });
    }

    /// Run the invariant monitor now. Returns the patch indices applied.
    pub fn analyze_and_fix(&self) -> Vec<usize> {
        self.core
            .with_simulation("analyze_and_fix", |sim| sim.analyze_and_fix())
    }

    /// Pure read of the current state.
    pub fn snapshot(&self) -> Snapshot {
        self.core.with_simulation("snapshot", |sim| sim.snapshot())
    }

    /// Read the check value; an even value rewrites a random NPC.
    pub fn observe_and_maybe_rewrite(&self) -> u32 {
        self.core
            .with_simulation("observe", |sim| sim.observe_and_maybe_rewrite())
    }

    pub fn active_rule(&self) -> MovementRule {
        self.core.with_simulation("active_rule", |sim| sim.active_rule())
    }

    pub fn set_active_rule(&self, rule: MovementRule) {
        self.core
            .with_simulation("set_active_rule", |sim| sim.set_active_rule(rule));
    }

    /// Direct access for harnesses: runs `f` as one serialized task.
    ///
    /// `f` runs with the simulation lock held, which is not reentrant: calling
    /// any other `Engine` method from inside `f` deadlocks.
    pub fn with_simulation<T>(&self, f: impl FnOnce(&mut Simulation) -> T) -> T {
        self.core.with_simulation("harness", f)
    }

    /// Start the autopilot and analyzer chains. Idempotent; a no-op once stopped.
    pub fn start(&self) {
        {
            let mut tasks = self.core.lock_tasks();
            if tasks.started || tasks.closed {
                return;
            }
            tasks.started = true;
        }
        let config = &self.core.config;
        info!(
            autopilot_pause_ms = config.autopilot_pause_ms,
            analyzer_pause_ms = config.analyzer_pause_ms,
            "Starting autopilot and analyzer loops"
        );
        self.core.spawn_analyzer_chain();
        self.core.spawn_autopilot_chain();
    }

    /// Cancel every outstanding task and wait for them to wind down. No
    /// scheduled mutation happens after this returns.
    pub async fn stop(&self) {
        let handles = self.core.shutdown();
        for handle in handles {
            let _ = handle.await;
        }
        info!("Simulation stopped");
    }

    pub fn is_stopped(&self) -> bool {
        *self.core.stop.borrow()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.core.shutdown();
    }
}

/// Resolves once the stop flag is raised or the engine is gone.
async fn stopped(stop: &mut watch::Receiver<bool>) {
    loop {
        if *stop.borrow_and_update() {
            return;
        }
        if stop.changed().await.is_err() {
            return;
        }
    }
}

impl Core {
    fn lock_tasks(&self) -> MutexGuard<'_, TaskSet> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_stopping(&self) -> bool {
        *self.stop.borrow()
    }

    /// Signal stop, close the task set and abort everything in it.
    fn shutdown(&self) -> Vec<JoinHandle<()>> {
        self.stop.send_replace(true);
        let handles = {
            let mut tasks = self.lock_tasks();
            tasks.closed = true;
            std::mem::take(&mut tasks.handles)
        };
        for handle in &handles {
            handle.abort();
        }
        handles
    }

    /// Run `f` with exclusive access to the simulation, then dispatch any
    /// follow-ups it queued as separate tasks.
    fn with_simulation<T>(
        self: &Arc<Self>,
        task: &'static str,
        f: impl FnOnce(&mut Simulation) -> T,
    ) -> T {
        let (out, follow_ups) = {
            let mut sim = match self.sim.lock() {
                Ok(guard) => guard,
                Err(poisoned) => {
                    self.sim.clear_poison();
                    let mut guard = poisoned.into_inner();
                    guard.recover(task, &TaskFault::Poisoned { task });
                    guard
                }
            };
            let out = f(&mut *sim);
            (out, sim.take_follow_ups())
        };
        for follow_up in follow_ups {
            self.spawn_follow_up(follow_up);
        }
        out
    }

    /// Run one task body behind the fault boundary.
    fn run(
        self: &Arc<Self>,
        task: &'static str,
        body: impl FnOnce(&mut Simulation) -> Result<(), TaskFault>,
    ) {
        self.with_simulation(task, |sim| {
            let fault = match catch_unwind(AssertUnwindSafe(|| body(&mut *sim))) {
                Ok(Ok(())) => return,
                Ok(Err(fault)) => fault,
                Err(_) => TaskFault::Panicked { task },
            };
            sim.recover(task, &fault);
        });
    }

    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.lock_tasks();
        if tasks.closed {
            return;
        }
        tasks.handles.retain(|handle| !handle.is_finished());
        tasks.handles.push(tokio::spawn(future));
    }

    async fn pause(&self, millis: u64) {
        if millis == 0 {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }

    fn install_background_tasks(self: &Arc<Self>) {
        let seed = self.with_simulation("install", |sim| sim.seed);
        let config = &self.config;

        self.spawn_once("mutate_logic", config.mutate_delay(seed), |sim| {
            sim.mutate_logic();
            Ok(())
        });
        self.spawn_once("soft_reset", config.soft_reset_delay(seed), |sim| {
            sim.soft_reset()
        });
        self.spawn_once("silent_rewriter", config.rewriter_delay(seed), |sim| {
            sim.silent_rewriter();
            Ok(())
        });
        self.spawn_tick(config.tick_interval(seed));

        debug!(
            seed,
            tick_ms = config.tick_interval(seed).as_millis() as u64,
            "Background tasks armed"
        );
    }

    fn spawn_once(self: &Arc<Self>, task: &'static str, delay: Duration, body: TaskBody) {
        let core = Arc::clone(self);
        let mut stop = self.stop.subscribe();
        self.spawn(async move {
            tokio::select! {
                _ = stopped(&mut stop) => {}
                _ = tokio::time::sleep(delay) => {
                    debug!(task, "One-shot task firing");
                    core.run(task, body);
                }
            }
        });
    }

    fn spawn_tick(self: &Arc<Self>, period: Duration) {
        let core = Arc::clone(self);
        let mut stop = self.stop.subscribe();
        let chance = self.config.resample_chance;
        self.spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stopped(&mut stop) => break,
                    _ = interval.tick() => {
                        core.run("tick", |sim| {
                            sim.tick();
                            if sim.roll() < chance {
                                sim.resample_everything();
                            }
                            Ok(())
                        });
                    }
                }
            }
        });
    }

    fn spawn_follow_up(self: &Arc<Self>, follow_up: FollowUp) {
        let core = Arc::clone(self);
        self.spawn(async move {
            tokio::task::yield_now().await;
            if core.is_stopping() {
                return;
            }
            core.run("follow_up", |sim| {
                sim.run_follow_up(follow_up);
                Ok(())
            });
        });
    }

    fn spawn_analyzer_chain(self: &Arc<Self>) {
        let core = Arc::clone(self);
        self.spawn(async move {
            let limit = core.config.analyzer_iteration_limit;
            let mut iteration = 0u64;
            while iteration < limit && !core.is_stopping() {
                iteration += 1;
                core.run("analyzer", |sim| sim.analyzer_pass(iteration));
                core.pause(core.config.analyzer_pause_ms).await;
            }
            debug!(iteration, "Analyzer loop finished");
        });
    }

    fn spawn_autopilot_chain(self: &Arc<Self>) {
        let core = Arc::clone(self);
        self.spawn(async move {
            while !core.is_stopping() {
                core.run("autopilot", |sim| {
                    sim.autopilot_step();
                    Ok(())
                });
                core.pause(core.config.autopilot_pause_ms).await;
            }
        });
    }
}
