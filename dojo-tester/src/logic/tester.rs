use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::common::scenario::{ScenarioPlan, TestScenario};
use crate::logic::flows::run_flow;
use crate::logic::game_tester::{GameRun, GameTester, SimulationPlan};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario_name: String,
    pub seed: u64,
    pub passed: bool,
    pub iterations_run: usize,
    pub successful_iterations: usize,
    pub failures: Vec<String>,
    #[serde(with = "duration_serde")]
    pub average_duration: Duration,
    #[serde(with = "duration_vec_serde")]
    pub performance_data: Vec<Duration>,
}

pub struct LogicTester {
    tester: GameTester,
}

impl LogicTester {
    pub const fn new(tester: GameTester) -> Self {
        Self { tester }
    }

    pub async fn run_scenario(
        &self,
        scenario: &TestScenario,
        seeds: &[u64],
        iterations: usize,
    ) -> Vec<ScenarioResult> {
        let mut results = Vec::new();

        for &seed in seeds {
            if self.tester.verbose() {
                println!(
                    "🧪 Testing scenario: {} (seed: {})",
                    scenario.name.bright_white(),
                    seed
                );
            }

            let result = self.run_single_scenario(scenario, seed, iterations).await;
            results.push(result);
        }

        results
    }

    async fn run_single_scenario(
        &self,
        scenario: &TestScenario,
        seed: u64,
        iterations: usize,
    ) -> ScenarioResult {
        let mut successes = 0;
        let mut failures = Vec::new();
        let mut performance_data = Vec::new();

        for i in 0..iterations {
            let start_time = Instant::now();
            let iteration_seed = seed.wrapping_add(u64::try_from(i).unwrap_or(u64::MAX));

            let outcome = match &scenario.plan {
                ScenarioPlan::Simulation(plan) => self.run_simulation(plan, iteration_seed),
                ScenarioPlan::Flow(kind) => run_flow(*kind, iteration_seed, &self.tester)
                    .await
                    .map_err(|err| vec![format!("{err:#}")])
                    .map(|_| ()),
            };

            match outcome {
                Ok(()) => {
                    successes += 1;
                    let duration = start_time.elapsed();
                    performance_data.push(duration);
                    if self.tester.verbose() {
                        println!(
                            "  ✅ Iteration {}/{} passed ({duration:?}) seed:{iteration_seed}",
                            i + 1,
                            iterations,
                        );
                    }
                }
                Err(errors) => {
                    for err in errors {
                        if self.tester.verbose() {
                            println!(
                                "  ❌ Iteration {}/{} failed: {}",
                                i + 1,
                                iterations,
                                err.clone().red()
                            );
                        }
                        failures.push(format!(
                            "Iteration {} (seed {iteration_seed}): {err}",
                            i + 1
                        ));
                    }
                }
            }
        }

        let average_duration = if performance_data.is_empty() {
            Duration::ZERO
        } else {
            performance_data.iter().sum::<Duration>()
                / u32::try_from(performance_data.len()).unwrap_or(1)
        };

        ScenarioResult {
            scenario_name: scenario.name.clone(),
            seed,
            passed: failures.is_empty(),
            iterations_run: iterations,
            successful_iterations: successes,
            failures,
            average_duration,
            performance_data,
        }
    }

    fn run_simulation(&self, plan: &SimulationPlan, seed: u64) -> Result<(), Vec<String>> {
        let summary = self.tester.run_plan(plan, seed);
        let errors: Vec<String> = summary
            .runs
            .iter()
            .filter_map(|run| {
                evaluate_expectations(plan, run)
                    .map(|err| format!("{} [{}]: {err} | {}", run.game, run.bot, describe_run(run)))
            })
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn evaluate_expectations(plan: &SimulationPlan, run: &GameRun) -> Option<String> {
    for expectation in &plan.expectations {
        if let Err(err) = expectation.evaluate(run) {
            return Some(err.to_string());
        }
    }
    None
}

fn describe_run(run: &GameRun) -> String {
    match &run.result {
        Some(result) => format!(
            "{:?} score {} ki {} P{}/G{}/M{} streak {} in {}ms, {} taps ({} dropped)",
            result.outcome,
            result.score,
            result.ki_earned,
            result.perfect_count,
            result.good_count,
            result.miss_count,
            result.best_streak,
            result.duration_ms,
            run.taps,
            run.dropped_inputs
        ),
        None => format!("unfinished after {} frames", run.frames),
    }
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u128::deserialize(deserializer)?;
        Ok(Duration::from_millis(u64::try_from(millis).unwrap_or(0)))
    }
}

mod duration_vec_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(durations: &[Duration], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis: Vec<u128> = durations
            .iter()
            .map(std::time::Duration::as_millis)
            .collect();
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis_vec = Vec::<u128>::deserialize(deserializer)?;
        Ok(millis_vec
            .into_iter()
            .map(|m| Duration::from_millis(u64::try_from(m).unwrap_or(0)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::scenario::{ScenarioOptions, get_scenario};
    use crate::logic::flows::FlowKind;
    use crate::logic::policy::Skill;
    use dojo_game::{GameId, GameTuning};

    fn logic_tester() -> LogicTester {
        LogicTester::new(GameTester::new(GameTuning::default(), false))
    }

    #[tokio::test]
    async fn smoke_passes_for_every_game() {
        let options = ScenarioOptions::new(GameId::ALL.to_vec(), Skill::Steady);
        let scenario = get_scenario("smoke", &options).expect("smoke exists");
        let results = logic_tester().run_scenario(&scenario, &[1337], 1).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].passed, "{:?}", results[0].failures);
        assert_eq!(results[0].successful_iterations, 1);
    }

    #[tokio::test]
    async fn failing_expectation_is_reported_per_game() {
        let plan = SimulationPlan::new(vec![GameId::Rhythm, GameId::Breathing], Skill::Expert)
            .with_expectation(|_: &GameRun| -> anyhow::Result<()> {
                anyhow::bail!("always fails")
            });
        let scenario = TestScenario::simulation("Broken", plan);
        let results = logic_tester().run_scenario(&scenario, &[1], 2).await;
        let result = &results[0];
        assert!(!result.passed);
        assert_eq!(result.successful_iterations, 0);
        assert_eq!(result.failures.len(), 4);
        assert!(result.failures[0].contains("always fails"));
    }

    #[tokio::test]
    async fn flows_run_through_the_same_harness() {
        let scenario = TestScenario::flow("Idempotence", FlowKind::Idempotence);
        let results = logic_tester().run_scenario(&scenario, &[3, 4], 1).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.passed));
    }

    #[test]
    fn scenario_result_serializes_durations_as_millis() {
        let result = ScenarioResult {
            scenario_name: "Smoke".to_string(),
            seed: 1,
            passed: true,
            iterations_run: 1,
            successful_iterations: 1,
            failures: Vec::new(),
            average_duration: Duration::from_millis(12),
            performance_data: vec![Duration::from_millis(12)],
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["average_duration"], 12);
        let back: ScenarioResult = serde_json::from_value(json).unwrap();
        assert_eq!(back.performance_data, vec![Duration::from_millis(12)]);
    }
}
