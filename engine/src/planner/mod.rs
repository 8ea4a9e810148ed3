//! Planner
//!
//! Backward-chaining search over the action registry. Starting from the goal
//! type, the planner picks a producing action, recursively plans for each of
//! its inputs that the world does not already hold, and schedules the
//! sub-plans ahead of the action.
//!
//! Candidate order at every sub-goal:
//! 1. actions excluded for the session are skipped
//! 2. actions whose capabilities are unavailable are skipped
//! 3. lowest cost first, then earliest registration
//!
//! If a candidate's sub-plan cannot be completed its partial schedule is
//! rolled back and the next candidate is tried. The first complete plan
//! wins; the search is greedy and deterministic, not globally cost-optimal.
//!
//! A failed search that skipped any producer for missing capabilities is
//! reported as `NoViableAction`, naming the first gated sub-goal and every
//! capability that was missing along the way.

use crate::capability::CapabilityResolver;
use crate::registry::{ActionRegistry, RegisteredAction};
use crate::world::WorldSnapshot;
use sdk::errors::EngineError;
use sdk::types::{ActionSpec, TypeKey};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, trace};

/// Default bound on sub-goal nesting
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Ordered action sequence that materializes a goal type
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    goal: TypeKey,
    steps: Vec<Arc<ActionSpec>>,
}

impl Plan {
    /// Plan with no steps (goal already satisfied)
    pub fn empty(goal: TypeKey) -> Self {
        Self {
            goal,
            steps: Vec::new(),
        }
    }

    pub fn goal(&self) -> &TypeKey {
        &self.goal
    }

    pub fn steps(&self) -> &[Arc<ActionSpec>] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn total_cost(&self) -> f64 {
        self.steps.iter().map(|s| s.cost).sum()
    }

    pub fn action_names(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.name.clone()).collect()
    }
}

/// Goal planner over a shared registry
pub struct Planner {
    registry: Arc<ActionRegistry>,
    capabilities: Arc<dyn CapabilityResolver>,
    max_depth: usize,
}

impl Planner {
    pub fn new(registry: Arc<ActionRegistry>, capabilities: Arc<dyn CapabilityResolver>) -> Self {
        Self {
            registry,
            capabilities,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    pub fn registry(&self) -> &Arc<ActionRegistry> {
        &self.registry
    }

    pub fn capabilities(&self) -> &Arc<dyn CapabilityResolver> {
        &self.capabilities
    }

    /// Plan for `goal` against the given world
    ///
    /// # Errors
    ///
    /// - `NoViableAction` if the search failed after skipping producers
    ///   that lack capabilities
    /// - `UnreachableGoal` if some required type has no producing action
    /// - `CyclicDependency` if a type is needed to produce itself
    pub fn plan(&self, goal: &TypeKey, world: &WorldSnapshot) -> Result<Plan, EngineError> {
        self.plan_excluding(goal, world, &BTreeSet::new())
    }

    /// Plan for `goal` without using the named actions
    pub fn plan_excluding(
        &self,
        goal: &TypeKey,
        world: &WorldSnapshot,
        excluded: &BTreeSet<String>,
    ) -> Result<Plan, EngineError> {
        if world.contains(goal) {
            debug!("Goal {} already satisfied", goal);
            return Ok(Plan::empty(goal.clone()));
        }

        let mut search = Search {
            planner: self,
            world,
            excluded,
            steps: Vec::new(),
            scheduled: HashSet::new(),
            stack: Vec::new(),
            gated: None,
        };
        if let Err(e) = search.solve(goal) {
            return Err(search.into_error(e));
        }

        let plan = Plan {
            goal: goal.clone(),
            steps: search.steps,
        };
        debug!(
            "Planned {} in {} step(s), cost {}: [{}]",
            goal,
            plan.len(),
            plan.total_cost(),
            plan.action_names().join(", ")
        );
        Ok(plan)
    }
}

/// Mutable state of one planning run
struct Search<'a> {
    planner: &'a Planner,
    world: &'a WorldSnapshot,
    excluded: &'a BTreeSet<String>,
    steps: Vec<Arc<ActionSpec>>,
    /// Output types of scheduled steps
    scheduled: HashSet<TypeKey>,
    /// Sub-goals currently being solved, outermost first
    stack: Vec<TypeKey>,
    /// First sub-goal with a capability-blocked producer, and every
    /// capability found missing so far
    gated: Option<(TypeKey, BTreeSet<String>)>,
}

impl<'a> Search<'a> {
    fn satisfied(&self, key: &TypeKey) -> bool {
        self.world.contains(key) || self.scheduled.contains(key)
    }

    fn solve(&mut self, goal: &TypeKey) -> Result<(), EngineError> {
        if self.satisfied(goal) {
            return Ok(());
        }

        if self.stack.contains(goal) {
            let mut path: Vec<&str> = self.stack.iter().map(TypeKey::as_str).collect();
            path.push(goal.as_str());
            return Err(EngineError::CyclicDependency {
                goal: goal.to_string(),
                path: path.join(" -> "),
            });
        }

        if self.stack.len() >= self.planner.max_depth {
            return Err(EngineError::UnreachableGoal(format!(
                "{} (sub-goal depth limit {} reached)",
                goal, self.planner.max_depth
            )));
        }

        let candidates = self.candidates(goal)?;

        self.stack.push(goal.clone());
        let mut first_err = None;

        for candidate in candidates {
            let steps_mark = self.steps.len();
            let scheduled_mark = self.scheduled.clone();

            match self.schedule(&candidate) {
                Ok(()) => {
                    self.stack.pop();
                    return Ok(());
                }
                Err(e) => {
                    trace!(
                        "Candidate {} for {} failed: {}",
                        candidate.name(),
                        goal,
                        e
                    );
                    self.steps.truncate(steps_mark);
                    self.scheduled = scheduled_mark;
                    first_err.get_or_insert(e);
                }
            }
        }

        self.stack.pop();
        Err(first_err.unwrap_or_else(|| EngineError::UnreachableGoal(goal.to_string())))
    }

    /// Final error for a failed search
    fn into_error(self, err: EngineError) -> EngineError {
        match self.gated {
            Some((goal, missing)) => EngineError::NoViableAction {
                goal: goal.to_string(),
                missing: missing.into_iter().collect::<Vec<_>>().join(", "),
            },
            None => err,
        }
    }

    /// Producers of `goal` the session may use, in preference order
    fn candidates(&mut self, goal: &TypeKey) -> Result<Vec<RegisteredAction>, EngineError> {
        let producers: Vec<&RegisteredAction> = self
            .planner
            .registry
            .lookup(goal)
            .into_iter()
            .filter(|action| !self.excluded.contains(action.name()))
            .collect();

        if producers.is_empty() {
            return Err(EngineError::UnreachableGoal(goal.to_string()));
        }

        let capabilities = &self.planner.capabilities;
        let (mut viable, blocked): (Vec<&RegisteredAction>, Vec<&RegisteredAction>) = producers
            .into_iter()
            .partition(|action| capabilities.allows(action.spec()));

        let missing: BTreeSet<String> = blocked
            .iter()
            .flat_map(|action| capabilities.missing(action.spec()))
            .collect();
        if !missing.is_empty() {
            let (_, gated) = self
                .gated
                .get_or_insert_with(|| (goal.clone(), BTreeSet::new()));
            gated.extend(missing.iter().cloned());
        }

        if viable.is_empty() {
            return Err(EngineError::NoViableAction {
                goal: goal.to_string(),
                missing: missing.into_iter().collect::<Vec<_>>().join(", "),
            });
        }

        viable.sort_by(|a, b| {
            a.spec()
                .cost
                .total_cmp(&b.spec().cost)
                .then(a.order().cmp(&b.order()))
        });

        Ok(viable.into_iter().cloned().collect())
    }

    fn schedule(&mut self, action: &RegisteredAction) -> Result<(), EngineError> {
        for input in &action.spec().input_types {
            self.solve(input)?;
        }

        let spec = action.shared_spec();
        self.scheduled.insert(spec.output_type.clone());
        self.steps.push(spec);
        Ok(())
    }
}
