use anyhow::{Result, ensure};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::logic::game_tester::{GameRun, GameTester, SimulationPlan};
use crate::logic::policy::Skill;
use dojo_game::{GameId, Outcome};

/// One bot run flattened for reporting.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayabilityRecord {
    pub game: GameId,
    pub skill: Skill,
    pub seed: u64,
    pub outcome: Option<Outcome>,
    pub score: u64,
    pub ki_earned: u32,
    pub perfect: u32,
    pub good: u32,
    pub miss: u32,
    pub best_streak: u32,
    pub duration_ms: u64,
    pub frames: u32,
}

impl PlayabilityRecord {
    #[must_use]
    pub fn from_run(run: &GameRun) -> Self {
        let result = run.result.as_ref();
        Self {
            game: run.game,
            skill: run.skill,
            seed: run.seed,
            outcome: result.map(|r| r.outcome),
            score: result.map_or(0, |r| r.score),
            ki_earned: result.map_or(0, |r| r.ki_earned),
            perfect: result.map_or(0, |r| r.perfect_count),
            good: result.map_or(0, |r| r.good_count),
            miss: result.map_or(0, |r| r.miss_count),
            best_streak: result.map_or(0, |r| r.best_streak),
            duration_ms: result.map_or(0, |r| r.duration_ms),
            frames: run.frames,
        }
    }

    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.outcome == Some(Outcome::Success)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayabilityAggregate {
    pub game: GameId,
    pub skill: Skill,
    pub iterations: usize,
    pub success_pct: f64,
    pub mean_score: f64,
    pub std_score: f64,
    pub mean_ki: f64,
    pub mean_best_streak: f64,
    pub mean_duration_ms: f64,
    pub unfinished: usize,
}

/// Play every selected game at every skill level across the seeds.
#[must_use]
pub fn run_playability_analysis(
    tester: &GameTester,
    games: &[GameId],
    seeds: &[u64],
    iterations: usize,
) -> Vec<PlayabilityRecord> {
    let mut records = Vec::new();
    for skill in Skill::ALL {
        let plan = SimulationPlan::new(games.to_vec(), skill);
        for &seed in seeds {
            for i in 0..iterations {
                let iteration_seed = seed.wrapping_add(u64::try_from(i).unwrap_or(u64::MAX));
                let summary = tester.run_plan(&plan, iteration_seed);
                records.extend(summary.runs.iter().map(PlayabilityRecord::from_run));
            }
        }
    }
    records
}

#[must_use]
pub fn aggregate_playability(records: &[PlayabilityRecord]) -> Vec<PlayabilityAggregate> {
    let mut builders: BTreeMap<(GameId, Skill), AggregateBuilder> = BTreeMap::new();
    for record in records {
        builders
            .entry((record.game, record.skill))
            .or_insert_with(|| AggregateBuilder::new(record.game, record.skill))
            .ingest(record);
    }
    builders.into_values().map(AggregateBuilder::finish).collect()
}

/// Expert bots must clear every game; a game an expert cannot finish is
/// mistuned. Nobody may finish with Ki on a failed run.
pub fn validate_playability_targets(
    aggregates: &[PlayabilityAggregate],
    records: &[PlayabilityRecord],
) -> Result<()> {
    for aggregate in aggregates.iter().filter(|a| a.skill == Skill::Expert) {
        ensure!(
            aggregate.success_pct >= 100.0,
            "expert bots cleared only {:.1}% of {} runs",
            aggregate.success_pct,
            aggregate.game
        );
    }
    for record in records {
        ensure!(
            record.outcome.is_some(),
            "{} run for seed {} never ended",
            record.game,
            record.seed
        );
        ensure!(
            record.succeeded() || record.ki_earned == 0,
            "{} awarded {} Ki on a failed run (seed {})",
            record.game,
            record.ki_earned,
            record.seed
        );
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct AggregateBuilder {
    game: GameId,
    skill: Skill,
    iterations: u32,
    successes: u32,
    unfinished: usize,
    score: RunningStats,
    ki: RunningStats,
    best_streak: RunningStats,
    duration: RunningStats,
}

impl AggregateBuilder {
    fn new(game: GameId, skill: Skill) -> Self {
        Self {
            game,
            skill,
            iterations: 0,
            successes: 0,
            unfinished: 0,
            score: RunningStats::default(),
            ki: RunningStats::default(),
            best_streak: RunningStats::default(),
            duration: RunningStats::default(),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn ingest(&mut self, record: &PlayabilityRecord) {
        self.iterations += 1;
        if record.succeeded() {
            self.successes += 1;
        }
        if record.outcome.is_none() {
            self.unfinished += 1;
        }
        self.score.add(record.score as f64);
        self.ki.add(f64::from(record.ki_earned));
        self.best_streak.add(f64::from(record.best_streak));
        self.duration.add(record.duration_ms as f64);
    }

    fn finish(self) -> PlayabilityAggregate {
        let success_pct = if self.iterations == 0 {
            0.0
        } else {
            f64::from(self.successes) / f64::from(self.iterations) * 100.0
        };
        PlayabilityAggregate {
            game: self.game,
            skill: self.skill,
            iterations: usize::try_from(self.iterations).unwrap_or(usize::MAX),
            success_pct,
            mean_score: self.score.mean(),
            std_score: self.score.std_dev(),
            mean_ki: self.ki.mean(),
            mean_best_streak: self.best_streak.mean(),
            mean_duration_ms: self.duration.mean(),
            unfinished: self.unfinished,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct RunningStats {
    count: u32,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    fn add(&mut self, value: f64) {
        self.count += 1;
        let count = f64::from(self.count);
        let delta = value - self.mean;
        self.mean += delta / count;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
    }

    const fn mean(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.mean }
    }

    fn variance(&self) -> f64 {
        if self.count > 1 {
            self.m2 / f64::from(self.count - 1)
        } else {
            0.0
        }
    }

    fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(game: GameId, skill: Skill, outcome: Outcome, score: u64) -> PlayabilityRecord {
        PlayabilityRecord {
            game,
            skill,
            seed: 1,
            outcome: Some(outcome),
            score,
            ki_earned: if outcome == Outcome::Success { 10 } else { 0 },
            perfect: 0,
            good: 0,
            miss: 0,
            best_streak: 0,
            duration_ms: 1_000,
            frames: 60,
        }
    }

    #[test]
    fn aggregates_group_by_game_and_skill() {
        let records = vec![
            record(GameId::Rhythm, Skill::Expert, Outcome::Success, 100),
            record(GameId::Rhythm, Skill::Expert, Outcome::Success, 300),
            record(GameId::Rhythm, Skill::Novice, Outcome::Fail, 0),
        ];
        let aggregates = aggregate_playability(&records);
        assert_eq!(aggregates.len(), 2);
        let expert = aggregates
            .iter()
            .find(|a| a.skill == Skill::Expert)
            .unwrap();
        assert_eq!(expert.iterations, 2);
        assert!((expert.mean_score - 200.0).abs() < f64::EPSILON);
        assert!((expert.success_pct - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn failing_expert_breaks_targets() {
        let records = vec![record(GameId::Memory, Skill::Expert, Outcome::Fail, 0)];
        let aggregates = aggregate_playability(&records);
        assert!(validate_playability_targets(&aggregates, &records).is_err());
    }

    #[test]
    fn ki_on_failure_breaks_targets() {
        let mut bad = record(GameId::Memory, Skill::Novice, Outcome::Fail, 0);
        bad.ki_earned = 5;
        let records = vec![bad];
        assert!(validate_playability_targets(&aggregate_playability(&records), &records).is_err());
    }

    #[test]
    fn analysis_covers_every_skill() {
        let tester = GameTester::new(dojo_game::GameTuning::default(), false);
        let records = run_playability_analysis(&tester, &[GameId::Rhythm], &[7], 1);
        assert_eq!(records.len(), Skill::ALL.len());
        let aggregates = aggregate_playability(&records);
        assert!(validate_playability_targets(&aggregates, &records).is_ok());
    }
}
