pub mod expectations;

use dojo_game::GameId;

use crate::logic::flows::FlowKind;
use crate::logic::game_tester::SimulationPlan;
use crate::logic::policy::Skill;

/// What a scenario exercises: bot runs through mini-games, or a challenge flow.
#[derive(Debug, Clone)]
pub enum ScenarioPlan {
    Simulation(SimulationPlan),
    Flow(FlowKind),
}

#[derive(Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    pub plan: ScenarioPlan,
}

impl TestScenario {
    #[must_use]
    pub fn simulation(name: impl Into<String>, plan: SimulationPlan) -> Self {
        Self {
            name: name.into(),
            plan: ScenarioPlan::Simulation(plan),
        }
    }

    #[must_use]
    pub fn flow(name: impl Into<String>, kind: FlowKind) -> Self {
        Self {
            name: name.into(),
            plan: ScenarioPlan::Flow(kind),
        }
    }
}

/// Command-line selections that shape game scenarios.
#[derive(Debug, Clone)]
pub struct ScenarioOptions {
    pub games: Vec<GameId>,
    pub skill: Skill,
}

impl ScenarioOptions {
    #[must_use]
    pub const fn new(games: Vec<GameId>, skill: Skill) -> Self {
        Self { games, skill }
    }
}

impl Default for ScenarioOptions {
    fn default() -> Self {
        Self::new(GameId::ALL.to_vec(), Skill::Steady)
    }
}

fn smoke_scenario(options: &ScenarioOptions) -> TestScenario {
    TestScenario::simulation(
        "Smoke Test",
        SimulationPlan::new(options.games.clone(), options.skill)
            .with_expectation(expectations::finished)
            .with_expectation(expectations::ledger_consistent)
            .with_expectation(expectations::combo_rule)
            .with_expectation(expectations::no_ki_on_fail)
            .with_expectation(expectations::clean_teardown),
    )
}

fn mastery_scenario(options: &ScenarioOptions) -> TestScenario {
    TestScenario::simulation(
        "Expert Mastery",
        SimulationPlan::new(options.games.clone(), Skill::Expert)
            .with_expectation(expectations::mastered)
            .with_expectation(expectations::ledger_consistent),
    )
}

fn novice_scenario(options: &ScenarioOptions) -> TestScenario {
    TestScenario::simulation(
        "Novice Gauntlet",
        SimulationPlan::new(options.games.clone(), Skill::Novice)
            .with_expectation(expectations::finished)
            .with_expectation(expectations::ledger_consistent)
            .with_expectation(expectations::combo_rule)
            .with_expectation(expectations::no_ki_on_fail),
    )
}

fn determinism_scenario(options: &ScenarioOptions) -> TestScenario {
    TestScenario::simulation(
        "Deterministic Replay",
        SimulationPlan::new(options.games.clone(), options.skill)
            .with_replay()
            .with_expectation(expectations::deterministic),
    )
}

fn restart_scenario(options: &ScenarioOptions) -> TestScenario {
    TestScenario::simulation(
        "Restart Resets Session",
        SimulationPlan::new(options.games.clone(), options.skill)
            .with_restart_check()
            .with_expectation(expectations::restart_clean)
            .with_expectation(expectations::clean_teardown),
    )
}

fn flow_scenario(kind: FlowKind) -> TestScenario {
    TestScenario::flow(kind.label(), kind)
}

pub fn get_scenario(name: &str, options: &ScenarioOptions) -> Option<TestScenario> {
    match name.to_lowercase().as_str() {
        "smoke" => Some(smoke_scenario(options)),
        "mastery" | "expert" => Some(mastery_scenario(options)),
        "novice-gauntlet" | "novice" => Some(novice_scenario(options)),
        "determinism" | "deterministic" => Some(determinism_scenario(options)),
        "restart-clean" | "restart" => Some(restart_scenario(options)),
        "challenge-idempotence" | "idempotence" => Some(flow_scenario(FlowKind::Idempotence)),
        "guardian-validation" | "guardian" => Some(flow_scenario(FlowKind::GuardianValidation)),
        "offline-fallback" | "offline" => Some(flow_scenario(FlowKind::OfflineFallback)),
        "game-to-belt" | "belt" => Some(flow_scenario(FlowKind::GameToBelt)),
        "late-response" => Some(flow_scenario(FlowKind::LateResponse)),
        "day-rollover" => Some(flow_scenario(FlowKind::DayRollover)),
        _ => None,
    }
}

pub fn list_scenarios() -> Vec<(&'static str, &'static str)> {
    vec![
        ("smoke", "Smoke Test"),
        ("mastery", "Expert Mastery"),
        ("novice-gauntlet", "Novice Gauntlet"),
        ("determinism", "Deterministic Replay"),
        ("restart-clean", "Restart Resets Session"),
        ("challenge-idempotence", FlowKind::Idempotence.label()),
        ("guardian-validation", FlowKind::GuardianValidation.label()),
        ("offline-fallback", FlowKind::OfflineFallback.label()),
        ("game-to-belt", FlowKind::GameToBelt.label()),
        ("late-response", FlowKind::LateResponse.label()),
        ("day-rollover", FlowKind::DayRollover.label()),
    ]
}

/// Expand `all` into every listed scenario, keeping explicit names in order.
pub fn expand_scenarios(requested: &[String]) -> Vec<String> {
    let mut expanded = Vec::new();
    for name in requested {
        if name.eq_ignore_ascii_case("all") {
            for (key, _) in list_scenarios() {
                push_unique(&mut expanded, key.to_string());
            }
        } else {
            push_unique(&mut expanded, name.clone());
        }
    }
    expanded
}

fn push_unique(list: &mut Vec<String>, name: String) {
    if !list.contains(&name) {
        list.push(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_listed_scenario_resolves() {
        let options = ScenarioOptions::default();
        for (key, label) in list_scenarios() {
            let scenario = get_scenario(key, &options).expect(key);
            assert_eq!(scenario.name, label);
        }
    }

    #[test]
    fn unknown_scenario_is_none() {
        assert!(get_scenario("tightrope", &ScenarioOptions::default()).is_none());
    }

    #[test]
    fn mastery_ignores_cli_skill() {
        let options = ScenarioOptions::new(vec![GameId::Memory], Skill::Novice);
        let scenario = get_scenario("mastery", &options).unwrap();
        let ScenarioPlan::Simulation(plan) = scenario.plan else {
            panic!("mastery is a simulation");
        };
        assert_eq!(plan.skill, Skill::Expert);
        assert_eq!(plan.games, vec![GameId::Memory]);
    }

    #[test]
    fn expand_all_lists_everything_once() {
        let requested = vec!["smoke".to_string(), "all".to_string()];
        let expanded = expand_scenarios(&requested);
        assert_eq!(expanded.len(), list_scenarios().len());
        assert_eq!(expanded[0], "smoke");
    }
}
