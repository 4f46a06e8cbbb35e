use std::sync::Arc;

use anyhow::Result;
use dojo_game::input::default_bindings;
use dojo_game::{
    Action, Arcade, GameId, GameResult, GameTuning, InputEdge, ManualTime, PhysicalInput,
    ScoreEvent, SessionId,
};

use crate::logic::policy::{BotIntent, PlayerPolicy, Skill};

/// Host frame period the tester drives the arcade at.
pub const FRAME_STEP_MS: u64 = 16;
/// Session time after which a run that has not ended is abandoned.
pub const MAX_RUN_MS: u64 = 180_000;

/// Declarative plan for a batch of bot runs.
#[derive(Debug, Clone)]
pub struct SimulationPlan {
    pub games: Vec<GameId>,
    pub skill: Skill,
    /// Play every run twice and compare.
    pub replay: bool,
    /// Restart each session after its first run and inspect it.
    pub restart_check: bool,
    pub expectations: Vec<SimulationExpectation>,
}

impl SimulationPlan {
    #[must_use]
    pub fn new(games: Vec<GameId>, skill: Skill) -> Self {
        Self {
            games,
            skill,
            replay: false,
            restart_check: false,
            expectations: Vec::new(),
        }
    }

    #[must_use]
    pub const fn with_replay(mut self) -> Self {
        self.replay = true;
        self
    }

    #[must_use]
    pub const fn with_restart_check(mut self) -> Self {
        self.restart_check = true;
        self
    }

    #[must_use]
    pub fn with_expectation(mut self, expectation: impl Into<SimulationExpectation>) -> Self {
        self.expectations.push(expectation.into());
        self
    }
}

/// Assertion hook run against every game run of a plan.
type SimulationExpectationFn = Arc<dyn Fn(&GameRun) -> Result<()> + Send + Sync + 'static>;

#[derive(Clone)]
pub struct SimulationExpectation(SimulationExpectationFn);

impl std::fmt::Debug for SimulationExpectation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationExpectation").finish()
    }
}

impl SimulationExpectation {
    #[must_use]
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&GameRun) -> Result<()> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn evaluate(&self, run: &GameRun) -> Result<()> {
        (self.0)(run)
    }
}

impl<F> From<F> for SimulationExpectation
where
    F: Fn(&GameRun) -> Result<()> + Send + Sync + 'static,
{
    fn from(f: F) -> Self {
        Self(Arc::new(f))
    }
}

/// What a restarted session looked like before its first tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartSnapshot {
    pub attempt: u32,
    pub elapsed_ms: u64,
    pub score: u64,
    pub streak: u32,
    pub events: usize,
    pub accepts_input: bool,
}

impl RestartSnapshot {
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.elapsed_ms == 0
            && self.score == 0
            && self.streak == 0
            && self.events == 0
            && self.accepts_input
    }
}

/// Complete record of one bot run through one game.
#[derive(Debug, Clone)]
pub struct GameRun {
    pub game: GameId,
    pub skill: Skill,
    pub seed: u64,
    pub bot: &'static str,
    /// `None` when the run hit [`MAX_RUN_MS`] without ending.
    pub result: Option<GameResult>,
    pub events: Vec<ScoreEvent>,
    pub frames: u32,
    pub taps: u32,
    /// Presses the arcade refused because the session was not playing.
    pub dropped_inputs: u32,
    /// Sessions and subscriptions left after exit, which must both be zero.
    pub leaked_sessions: usize,
    pub leaked_subscriptions: usize,
    /// Frames that still ticked something after exit.
    pub ticks_after_exit: usize,
    pub replay: Option<Option<GameResult>>,
    pub restart: Option<RestartSnapshot>,
}

impl GameRun {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.result.as_ref().is_some_and(GameResult::is_success)
    }

    #[must_use]
    pub fn score(&self) -> u64 {
        self.result.as_ref().map_or(0, |result| result.score)
    }
}

/// Every run of a plan for one seed.
#[derive(Debug, Clone)]
pub struct SimulationSummary {
    pub seed: u64,
    pub skill: Skill,
    pub runs: Vec<GameRun>,
}

/// Headless deterministic runner: one arcade per run, a manual clock
/// advanced in host-sized frames, and a bot pressing real bindings.
#[derive(Clone)]
pub struct GameTester {
    verbose: bool,
    tuning: Arc<GameTuning>,
}

impl GameTester {
    #[must_use]
    pub fn new(tuning: GameTuning, verbose: bool) -> Self {
        Self {
            verbose,
            tuning: Arc::new(tuning),
        }
    }

    #[must_use]
    pub fn try_new(verbose: bool) -> Self {
        Self::new(GameTuning::load_default(), verbose)
    }

    #[must_use]
    pub const fn verbose(&self) -> bool {
        self.verbose
    }

    #[must_use]
    pub fn tuning(&self) -> &GameTuning {
        &self.tuning
    }

    pub fn run_plan(&self, plan: &SimulationPlan, seed: u64) -> SimulationSummary {
        let runs = plan
            .games
            .iter()
            .map(|game| {
                let mut run = self.play(*game, plan.skill, seed, plan.restart_check);
                if plan.replay {
                    run.replay = Some(self.play(*game, plan.skill, seed, false).result);
                }
                run
            })
            .collect();
        SimulationSummary {
            seed,
            skill: plan.skill,
            runs,
        }
    }

    /// Play one game to its end with a bot of the given skill.
    #[must_use]
    pub fn play(&self, game: GameId, skill: Skill, seed: u64, restart_check: bool) -> GameRun {
        let time = ManualTime::new(0);
        let mut arcade = Arcade::new(time.clone(), (*self.tuning).clone());
        let id = arcade.launch(game, seed);
        arcade.start(id);

        let mut bot = skill.create_policy(game, seed);
        let mut driver = BotDriver::default();
        let mut frames = 0u32;
        let mut result = None;
        let mut events = Vec::new();

        loop {
            time.advance(FRAME_STEP_MS);
            arcade.frame();
            frames = frames.saturating_add(1);
            let finished = arcade.take_results().pop();
            let Some(session) = arcade.session(id) else {
                break;
            };
            if let Some(finished) = finished {
                events = session.events().to_vec();
                result = Some(finished);
                break;
            }
            if session.elapsed_ms() > MAX_RUN_MS {
                events = session.events().to_vec();
                break;
            }
            let intent = bot.decide(&session.view(), session.elapsed_ms());
            driver.apply(&mut arcade, id, &intent);
        }

        if self.verbose {
            log_run(game, skill, seed, bot.as_ref(), result.as_ref(), frames);
        }

        let restart = restart_check.then(|| {
            arcade.restart(id);
            arcade.session(id).map(|session| RestartSnapshot {
                attempt: session.attempt(),
                elapsed_ms: session.elapsed_ms(),
                score: session.score(),
                streak: session.streak(),
                events: session.events().len(),
                accepts_input: session.accepts_input(),
            })
        });

        arcade.exit(id);
        let mut ticks_after_exit = 0;
        for _ in 0..8 {
            time.advance(FRAME_STEP_MS);
            ticks_after_exit += arcade.frame();
        }

        GameRun {
            game,
            skill,
            seed,
            bot: bot.name(),
            result,
            events,
            frames,
            taps: driver.taps,
            dropped_inputs: driver.dropped,
            leaked_sessions: arcade.live_sessions(),
            leaked_subscriptions: arcade.scheduled(),
            ticks_after_exit,
            replay: None,
            restart: restart.flatten(),
        }
    }
}

/// Turns bot intents into key edges, the way a real keyboard would.
#[derive(Debug, Default)]
struct BotDriver {
    held: Vec<Action>,
    taps: u32,
    dropped: u32,
}

impl BotDriver {
    fn key_for(action: Action) -> Option<PhysicalInput> {
        default_bindings(action).into_iter().next()
    }

    fn apply(&mut self, arcade: &mut Arcade<ManualTime>, id: SessionId, intent: &BotIntent) {
        for action in self.held.clone() {
            if !intent.holds.contains(&action)
                && let Some(key) = Self::key_for(action)
            {
                arcade.handle_input(id, key, InputEdge::Up);
            }
        }
        // Re-pressing a held key is ignored as auto-repeat, and restores it
        // after the session dropped held input between rounds.
        for action in &intent.holds {
            if let Some(key) = Self::key_for(*action) {
                arcade.handle_input(id, key, InputEdge::Down);
            }
        }
        self.held.clone_from(&intent.holds);

        for action in &intent.taps {
            let Some(key) = Self::key_for(*action) else {
                continue;
            };
            self.taps = self.taps.saturating_add(1);
            if arcade
                .handle_input(id, key.clone(), InputEdge::Down)
                .is_none()
            {
                self.dropped = self.dropped.saturating_add(1);
            }
            arcade.handle_input(id, key, InputEdge::Up);
        }
    }
}

fn log_run(
    game: GameId,
    skill: Skill,
    seed: u64,
    bot: &dyn PlayerPolicy,
    result: Option<&GameResult>,
    frames: u32,
) {
    match result {
        Some(result) => println!(
            "     ↳ {game} [{} / {skill}] seed {seed}: {:?} score {} ki {} (P{} G{} M{}) in {frames} frames",
            bot.name(),
            result.outcome,
            result.score,
            result.ki_earned,
            result.perfect_count,
            result.good_count,
            result.miss_count,
        ),
        None => println!(
            "     ↳ {game} [{} / {skill}] seed {seed}: no result after {frames} frames",
            bot.name()
        ),
    }
}
