//! Systems and the dependency-ordered scheduler.
//!
//! A [`System`] is a named unit of per-tick logic with a declared execution
//! [`Phase`], an integer order within that phase, and named must-run-after
//! dependencies. The [`Scheduler`] owns registered systems exclusively and
//! executes each phase in a deterministic order: a Kahn topological sort per
//! phase, with ties broken by `(order, name)` so two runs produce
//! bit-identical execution order -- a requirement for deterministic
//! simulation (e.g. networked lockstep).
//!
//! The sorted order is recomputed lazily, only after systems are added or
//! removed. A dependency cycle within a phase is recoverable: the unresolved
//! systems are appended in declaration order, and the condition is surfaced
//! as [`EcsError::DependencyCycle`] from `execute` so wrong ordering can
//! never pass silently as success.

use crate::world::World;
use crate::EcsError;

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Execution phase of a system within one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Phase {
    /// Before the main update (input, events).
    PreUpdate,
    /// Main update (gameplay, AI).
    Update,
    /// After the update (cleanup, validation).
    PostUpdate,
    /// Before rendering (culling, LOD).
    PreRender,
    /// Render command generation.
    Render,
    /// After rendering (debug, overlays).
    PostRender,
}

impl Phase {
    /// Every phase, in tick execution order.
    pub const ALL: [Phase; 6] = [
        Phase::PreUpdate,
        Phase::Update,
        Phase::PostUpdate,
        Phase::PreRender,
        Phase::Render,
        Phase::PostRender,
    ];
}

// ---------------------------------------------------------------------------
// SystemContext
// ---------------------------------------------------------------------------

/// Per-tick timing context handed to every system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemContext {
    /// Seconds since the previous tick.
    pub delta_time: f32,
    /// Number of frames begun so far.
    pub frame_count: u64,
}

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

/// A unit of per-tick logic.
///
/// Lifetime: registered once, [`initialize`](System::initialize)d once,
/// [`update`](System::update)d every tick while enabled, and
/// [`shutdown`](System::shutdown) once at teardown. The scheduler owns
/// systems exclusively.
pub trait System {
    /// Unique name; dependencies reference systems by this name.
    fn name(&self) -> &str;

    /// The phase this system executes in.
    fn phase(&self) -> Phase {
        Phase::Update
    }

    /// Ordering weight within the phase; lower runs earlier.
    fn order(&self) -> i32 {
        0
    }

    /// Names of systems that must run before this one (same phase).
    fn dependencies(&self) -> &[String] {
        &[]
    }

    /// Called once when the scheduler initializes.
    fn initialize(&mut self, _world: &mut World) {}

    /// Called every tick while the system is enabled.
    fn update(&mut self, world: &mut World, ctx: &SystemContext);

    /// Called once at scheduler shutdown, in reverse execution order.
    fn shutdown(&mut self, _world: &mut World) {}
}

// ---------------------------------------------------------------------------
// FnSystem
// ---------------------------------------------------------------------------

/// Closure-backed system for quick registration.
///
/// ```ignore
/// scheduler.add(Box::new(
///     FnSystem::new("movement", Phase::Update, |world, ctx| {
///         // per-tick logic
///     })
///     .with_order(1)
///     .after("input"),
/// ));
/// ```
pub struct FnSystem<F> {
    name: String,
    phase: Phase,
    order: i32,
    dependencies: Vec<String>,
    func: F,
}

impl<F: FnMut(&mut World, &SystemContext)> FnSystem<F> {
    /// Create a closure system in `phase`.
    pub fn new(name: impl Into<String>, phase: Phase, func: F) -> Self {
        Self {
            name: name.into(),
            phase,
            order: 0,
            dependencies: Vec::new(),
            func,
        }
    }

    /// Set the ordering weight.
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// Add a must-run-after dependency.
    pub fn after(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }
}

impl<F: FnMut(&mut World, &SystemContext)> System for FnSystem<F> {
    fn name(&self) -> &str {
        &self.name
    }

    fn phase(&self) -> Phase {
        self.phase
    }

    fn order(&self) -> i32 {
        self.order
    }

    fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    fn update(&mut self, world: &mut World, ctx: &SystemContext) {
        (self.func)(world, ctx);
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

struct SystemEntry {
    system: Box<dyn System>,
    enabled: bool,
}

/// Owns systems and executes them phase by phase in deterministic order.
#[derive(Default)]
pub struct Scheduler {
    /// Declaration order; never reordered (the cycle fallback relies on it).
    systems: Vec<SystemEntry>,
    /// Indices into `systems`, sorted by phase then topological order.
    execution_order: Vec<usize>,
    /// Phases whose last rebuild detected a dependency cycle, with the
    /// names that could not be ordered.
    cycles: Vec<(Phase, Vec<String>)>,
    dirty: bool,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("systems", &self.systems.len())
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl Scheduler {
    /// An empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a system.
    ///
    /// # Panics
    ///
    /// Panics if a system with the same name is already registered.
    pub fn add(&mut self, system: Box<dyn System>) {
        assert!(
            !self.contains(system.name()),
            "duplicate system name: {:?}",
            system.name()
        );
        tracing::debug!(system = system.name(), phase = ?system.phase(), "registered system");
        self.systems.push(SystemEntry {
            system,
            enabled: true,
        });
        self.dirty = true;
    }

    /// Register a closure as a system in `phase`.
    pub fn add_fn<F>(&mut self, name: impl Into<String>, phase: Phase, func: F)
    where
        F: FnMut(&mut World, &SystemContext) + 'static,
    {
        self.add(Box::new(FnSystem::new(name, phase, func)));
    }

    /// Unregister a system by name. Returns `false` if no such system.
    pub fn remove(&mut self, name: &str) -> bool {
        let Some(index) = self.index_of(name) else {
            return false;
        };
        self.systems.remove(index);
        self.dirty = true;
        true
    }

    /// Whether a system with `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    /// Enable or disable a system. Disabled systems stay registered and keep
    /// their position in the order but are skipped by `execute`.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.index_of(name) {
            Some(index) => {
                self.systems[index].enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Whether the named system is enabled.
    pub fn is_enabled(&self, name: &str) -> Option<bool> {
        self.index_of(name).map(|index| self.systems[index].enabled)
    }

    /// Number of registered systems.
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    /// Whether no systems are registered.
    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    /// System names in execution order (rebuilding it if stale).
    pub fn execution_names(&mut self) -> Vec<String> {
        if self.dirty {
            self.rebuild();
        }
        self.execution_order
            .iter()
            .map(|&index| self.systems[index].system.name().to_owned())
            .collect()
    }

    /// Initialize every system, in execution order.
    pub fn initialize(&mut self, world: &mut World) {
        if self.dirty {
            self.rebuild();
        }
        for position in 0..self.execution_order.len() {
            let index = self.execution_order[position];
            self.systems[index].system.initialize(world);
        }
    }

    /// Execute every enabled system of `phase`, in deterministic order.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::DependencyCycle`] *after* running the phase if its
    /// order was built from a cycle fallback. Execution itself proceeds with
    /// the documented fallback (unresolved systems appended in declaration
    /// order); the error exists so callers cannot mistake that for a clean
    /// ordering.
    pub fn execute(
        &mut self,
        phase: Phase,
        world: &mut World,
        ctx: &SystemContext,
    ) -> Result<(), EcsError> {
        if self.dirty {
            self.rebuild();
        }
        for position in 0..self.execution_order.len() {
            let index = self.execution_order[position];
            let entry = &mut self.systems[index];
            if entry.enabled && entry.system.phase() == phase {
                entry.system.update(world, ctx);
            }
        }
        self.cycle_error_for(Some(phase))
    }

    /// Execute every enabled system across all phases, in phase order.
    ///
    /// # Errors
    ///
    /// As for [`execute`](Self::execute), reporting the first cyclic phase.
    pub fn execute_all(&mut self, world: &mut World, ctx: &SystemContext) -> Result<(), EcsError> {
        if self.dirty {
            self.rebuild();
        }
        for position in 0..self.execution_order.len() {
            let index = self.execution_order[position];
            let entry = &mut self.systems[index];
            if entry.enabled {
                entry.system.update(world, ctx);
            }
        }
        self.cycle_error_for(None)
    }

    /// Shut down every system, in reverse execution order.
    pub fn shutdown(&mut self, world: &mut World) {
        if self.dirty {
            self.rebuild();
        }
        for position in (0..self.execution_order.len()).rev() {
            let index = self.execution_order[position];
            self.systems[index].system.shutdown(world);
        }
    }

    // -- internals ----------------------------------------------------------

    fn index_of(&self, name: &str) -> Option<usize> {
        self.systems
            .iter()
            .position(|entry| entry.system.name() == name)
    }

    fn cycle_error_for(&self, phase: Option<Phase>) -> Result<(), EcsError> {
        let hit = match phase {
            Some(phase) => self.cycles.iter().find(|(p, _)| *p == phase),
            None => self.cycles.first(),
        };
        match hit {
            Some((phase, systems)) => Err(EcsError::DependencyCycle {
                phase: *phase,
                systems: systems.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Recompute `execution_order`: per phase, Kahn's algorithm over the
    /// same-phase dependency edges, ready set popped as a min-heap on
    /// `(order, name)` for bit-identical ordering across runs.
    fn rebuild(&mut self) {
        self.execution_order.clear();
        self.cycles.clear();

        let by_name: HashMap<&str, usize> = self
            .systems
            .iter()
            .enumerate()
            .map(|(index, entry)| (entry.system.name(), index))
            .collect();

        for phase in Phase::ALL {
            let members: Vec<usize> = (0..self.systems.len())
                .filter(|&index| self.systems[index].system.phase() == phase)
                .collect();
            if members.is_empty() {
                continue;
            }

            // Edges: dependency -> dependent, counted within this phase only.
            let mut in_degree: HashMap<usize, u32> =
                members.iter().map(|&index| (index, 0)).collect();
            let mut dependents: HashMap<usize, Vec<usize>> =
                members.iter().map(|&index| (index, Vec::new())).collect();

            for &index in &members {
                for dependency in self.systems[index].system.dependencies() {
                    match by_name.get(dependency.as_str()) {
                        Some(&dep_index) if self.systems[dep_index].system.phase() == phase => {
                            dependents.get_mut(&dep_index).unwrap().push(index);
                            *in_degree.get_mut(&index).unwrap() += 1;
                        }
                        Some(_) => tracing::warn!(
                            system = self.systems[index].system.name(),
                            dependency = dependency.as_str(),
                            "dependency lives in a different phase; ignored for ordering"
                        ),
                        None => tracing::warn!(
                            system = self.systems[index].system.name(),
                            dependency = dependency.as_str(),
                            "unknown dependency; ignored for ordering"
                        ),
                    }
                }
            }

            let mut ready: BinaryHeap<Reverse<(i32, String, usize)>> = members
                .iter()
                .filter(|&&index| in_degree[&index] == 0)
                .map(|&index| Reverse(self.sort_key(index)))
                .collect();

            let mut sorted: Vec<usize> = Vec::with_capacity(members.len());
            while let Some(Reverse((_, _, index))) = ready.pop() {
                sorted.push(index);
                for &dependent in &dependents[&index] {
                    let degree = in_degree.get_mut(&dependent).unwrap();
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(Reverse(self.sort_key(dependent)));
                    }
                }
            }

            if sorted.len() != members.len() {
                // Cycle: append whatever could not be ordered, in declaration
                // order, and remember the condition for execute() to report.
                let unresolved: Vec<usize> = members
                    .iter()
                    .copied()
                    .filter(|index| !sorted.contains(index))
                    .collect();
                let names: Vec<String> = unresolved
                    .iter()
                    .map(|&index| self.systems[index].system.name().to_owned())
                    .collect();
                tracing::error!(
                    ?phase,
                    systems = ?names,
                    "dependency cycle among systems; falling back to declaration order"
                );
                self.cycles.push((phase, names));
                sorted.extend(unresolved);
            }

            self.execution_order.extend(sorted);
        }

        self.dirty = false;
    }

    fn sort_key(&self, index: usize) -> (i32, String, usize) {
        let system = &self.systems[index].system;
        (system.order(), system.name().to_owned(), index)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
