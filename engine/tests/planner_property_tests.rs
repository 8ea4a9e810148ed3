/// Property tests for the planner over randomly generated action sets
///
/// Actions only consume types with a lower index than the type they
/// produce, so every generated registry is acyclic.
use lodestar_engine::capability::{CapabilityResolver, StaticCapabilities, WEB};
use lodestar_engine::planner::Planner;
use lodestar_engine::registry::ActionRegistry;
use lodestar_engine::world::WorldState;
use proptest::prelude::*;
use sdk::action::fn_action;
use sdk::errors::EngineError;
use sdk::types::{ActionInputs, ActionOutcome, ActionSpec, TypeKey};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

const TYPE_COUNT: usize = 8;

#[derive(Debug, Clone)]
struct GeneratedAction {
    output: usize,
    input_mask: u8,
    cost: u8,
    needs_web: bool,
}

fn type_key(index: usize) -> TypeKey {
    TypeKey::new(format!("T{}", index))
}

fn action_strategy() -> impl Strategy<Value = GeneratedAction> {
    (0..TYPE_COUNT, any::<u8>(), 0..5u8, prop::bool::weighted(0.2)).prop_map(
        |(output, input_mask, cost, needs_web)| GeneratedAction {
            output,
            // Only lower-indexed types may be consumed
            input_mask: input_mask & ((1u16 << output) - 1) as u8,
            cost,
            needs_web,
        },
    )
}

fn build_registry(actions: &[GeneratedAction]) -> ActionRegistry {
    let mut registry = ActionRegistry::new();
    for (i, action) in actions.iter().enumerate() {
        let mut spec = ActionSpec::new(format!("a{}", i), type_key(action.output))
            .with_cost(action.cost as f64);
        for input in 0..action.output {
            if action.input_mask & (1 << input) != 0 {
                spec = spec.with_input(type_key(input));
            }
        }
        if action.needs_web {
            spec = spec.with_capability(WEB);
        }
        registry
            .register(
                spec,
                fn_action(|_inputs: ActionInputs| async move { Ok(ActionOutcome::Nothing) }),
            )
            .unwrap();
    }
    registry
}

fn build_world(mask: u8) -> WorldState {
    let mut world = WorldState::new();
    for index in 0..TYPE_COUNT {
        if mask & (1 << index) != 0 {
            world.put(type_key(index), json!({ "index": index }));
        }
    }
    world
}

proptest! {
    #[test]
    fn test_plans_never_reference_unproduced_inputs(
        actions in prop::collection::vec(action_strategy(), 1..16),
        world_mask in any::<u8>(),
        goal in 0..TYPE_COUNT,
        web in any::<bool>(),
    ) {
        let registry = Arc::new(build_registry(&actions));
        let capabilities = StaticCapabilities::none().with(WEB, web);
        let planner = Planner::new(Arc::clone(&registry), Arc::new(capabilities.clone()));
        let world = build_world(world_mask).snapshot();
        let goal = type_key(goal);

        match planner.plan(&goal, &world) {
            Ok(plan) => {
                let mut available: HashSet<TypeKey> = (0..TYPE_COUNT)
                    .map(type_key)
                    .filter(|key| world.contains(key))
                    .collect();
                let mut names = HashSet::new();

                for step in plan.steps() {
                    for input in &step.input_types {
                        prop_assert!(
                            available.contains(input),
                            "{} consumes {} before it exists", step.name, input
                        );
                    }
                    prop_assert!(capabilities.allows(step));
                    prop_assert!(names.insert(step.name.clone()), "{} scheduled twice", step.name);
                    available.insert(step.output_type.clone());
                }
                prop_assert!(available.contains(&goal));
            }
            Err(EngineError::UnreachableGoal(_)) | Err(EngineError::NoViableAction { .. }) => {}
            Err(other) => prop_assert!(false, "unexpected planning error: {}", other),
        }
    }

    #[test]
    fn test_planning_is_deterministic(
        actions in prop::collection::vec(action_strategy(), 1..16),
        world_mask in any::<u8>(),
        goal in 0..TYPE_COUNT,
    ) {
        let registry = Arc::new(build_registry(&actions));
        let planner = Planner::new(registry, Arc::new(StaticCapabilities::none().enable(WEB)));
        let world = build_world(world_mask).snapshot();
        let goal = type_key(goal);

        let first = planner.plan(&goal, &world).map(|plan| plan.action_names());
        let second = planner.plan(&goal, &world).map(|plan| plan.action_names());
        match (first, second) {
            (Ok(a), Ok(b)) => prop_assert_eq!(a, b),
            (Err(a), Err(b)) => prop_assert_eq!(a.to_string(), b.to_string()),
            (a, b) => prop_assert!(false, "plans diverged: {:?} vs {:?}", a, b),
        }
    }

    #[test]
    fn test_without_web_gated_paths_are_never_chosen(
        actions in prop::collection::vec(action_strategy(), 1..16),
        goal in 0..TYPE_COUNT,
    ) {
        let registry = Arc::new(build_registry(&actions));
        let planner = Planner::new(registry, Arc::new(StaticCapabilities::none()));

        if let Ok(plan) = planner.plan(&type_key(goal), &WorldState::new().snapshot()) {
            prop_assert!(plan.steps().iter().all(|step| step.required_capabilities.is_empty()));
        }
    }

    #[test]
    fn test_losing_web_reports_no_viable_action(
        actions in prop::collection::vec(action_strategy(), 1..16),
        world_mask in any::<u8>(),
        goal in 0..TYPE_COUNT,
    ) {
        let registry = Arc::new(build_registry(&actions));
        let with_web = Planner::new(Arc::clone(&registry), Arc::new(StaticCapabilities::none().enable(WEB)));
        let without_web = Planner::new(registry, Arc::new(StaticCapabilities::none()));
        let world = build_world(world_mask).snapshot();
        let goal = type_key(goal);

        if with_web.plan(&goal, &world).is_ok() {
            if let Err(err) = without_web.plan(&goal, &world) {
                prop_assert!(
                    matches!(&err, EngineError::NoViableAction { missing, .. } if missing == WEB),
                    "expected NoViableAction, got {}", err
                );
            }
        }
    }
}

#[test]
fn test_cheaper_chain_beats_expensive_direct_producer() {
    let mut registry = ActionRegistry::new();
    let noop = || fn_action(|_inputs: ActionInputs| async move { Ok(ActionOutcome::Nothing) });
    registry
        .register(ActionSpec::new("A", "X").with_cost(1.0), noop())
        .unwrap();
    registry
        .register(ActionSpec::new("B", "Y").with_input("X").with_cost(1.0), noop())
        .unwrap();
    registry
        .register(ActionSpec::new("C", "Y").with_cost(100.0), noop())
        .unwrap();

    let planner = Planner::new(Arc::new(registry), Arc::new(StaticCapabilities::none()));
    let plan = planner
        .plan(&TypeKey::new("Y"), &WorldState::new().snapshot())
        .unwrap();
    assert_eq!(plan.action_names(), vec!["A", "B"]);
}
