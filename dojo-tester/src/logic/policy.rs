use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use clap::ValueEnum;
use dojo_game::{Action, GameId, GameView, dilemma_bank};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};

/// What a bot wants to do before the next frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BotIntent {
    /// Press-and-release within the frame.
    pub taps: Vec<Action>,
    /// Actions to keep held down; anything not listed is released.
    pub holds: Vec<Action>,
}

impl BotIntent {
    #[must_use]
    pub fn idle() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn tap(action: Action) -> Self {
        Self {
            taps: vec![action],
            holds: Vec::new(),
        }
    }

    #[must_use]
    pub fn hold(action: Action) -> Self {
        Self {
            taps: Vec::new(),
            holds: vec![action],
        }
    }
}

/// Policy interface for scripted players.
pub trait PlayerPolicy {
    /// Name used for logging/debug output.
    fn name(&self) -> &'static str;

    /// React to the latest view of the game at session time `now_ms`.
    fn decide(&mut self, view: &GameView, now_ms: u64) -> BotIntent;
}

/// How well a bot plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Skill {
    Novice,
    Steady,
    Expert,
}

/// Motor and attention limits behind a [`Skill`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkillProfile {
    /// Timing error drawn uniformly from `-jitter_ms..=jitter_ms`.
    pub jitter_ms: u64,
    /// Delay before answering a prompt.
    pub reaction_ms: u64,
    /// Chance of an outright mistake, in percent.
    pub slip_pct: u8,
    /// Frames between seeing something and acting on it.
    pub lag_frames: usize,
}

impl Skill {
    pub const ALL: [Self; 3] = [Self::Novice, Self::Steady, Self::Expert];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Novice => "Novice",
            Self::Steady => "Steady",
            Self::Expert => "Expert",
        }
    }

    #[must_use]
    pub const fn profile(self) -> SkillProfile {
        match self {
            Self::Novice => SkillProfile {
                jitter_ms: 320,
                reaction_ms: 1_500,
                slip_pct: 20,
                lag_frames: 6,
            },
            Self::Steady => SkillProfile {
                jitter_ms: 120,
                reaction_ms: 600,
                slip_pct: 5,
                lag_frames: 2,
            },
            Self::Expert => SkillProfile {
                jitter_ms: 40,
                reaction_ms: 250,
                slip_pct: 0,
                lag_frames: 0,
            },
        }
    }

    /// Bot for `game`, seeded so a replay with the same seed acts identically.
    #[must_use]
    pub fn create_policy(self, game: GameId, seed: u64) -> Box<dyn PlayerPolicy> {
        let motor = Motor::new(self.profile(), seed ^ game_salt(game));
        match game {
            GameId::Rhythm => Box::new(BeatBot::new(motor, "Rhythm Bot")),
            GameId::Breathing => Box::new(BeatBot::new(motor, "Breathing Bot")),
            GameId::Memory => Box::new(MemoryBot::new(motor)),
            GameId::Reflex => Box::new(ReflexBot::new(motor)),
            GameId::Balance => Box::new(BalanceBot::new(motor)),
            GameId::Distance => Box::new(DistanceBot::new(motor)),
        }
    }
}

impl fmt::Display for Skill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

const fn game_salt(game: GameId) -> u64 {
    match game {
        GameId::Balance => 0x0ba1,
        GameId::Rhythm => 0x0b0a,
        GameId::Memory => 0x0e30,
        GameId::Breathing => 0x0b2e,
        GameId::Reflex => 0x0f1e,
        GameId::Distance => 0x0d15,
    }
}

/// Shared source of human-like imprecision.
#[derive(Debug, Clone)]
struct Motor {
    profile: SkillProfile,
    rng: ChaCha20Rng,
}

impl Motor {
    fn new(profile: SkillProfile, seed: u64) -> Self {
        Self {
            profile,
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }

    fn jitter(&mut self) -> i64 {
        let spread = i64::try_from(self.profile.jitter_ms).unwrap_or(i64::MAX);
        if spread == 0 {
            return 0;
        }
        self.rng.gen_range(-spread..=spread)
    }

    /// Reaction delay with jitter, never negative.
    fn reaction(&mut self) -> u64 {
        self.profile
            .reaction_ms
            .saturating_add_signed(self.jitter())
    }

    fn slips(&mut self) -> bool {
        self.profile.slip_pct > 0 && self.rng.gen_range(0..100u8) < self.profile.slip_pct
    }

    fn pick<T: Copy>(&mut self, options: &[T]) -> Option<T> {
        if options.is_empty() {
            return None;
        }
        options.get(self.rng.gen_range(0..options.len())).copied()
    }
}

/// One planned press aimed at a known target time.
#[derive(Debug, Clone, Copy)]
struct PlannedPress {
    target_ms: u64,
    press_at_ms: u64,
    action: Action,
    done: bool,
}

/// Taps on a beat: rhythm beats and breathing boundaries.
struct BeatBot {
    name: &'static str,
    motor: Motor,
    plan: Option<PlannedPress>,
}

impl BeatBot {
    fn new(motor: Motor, name: &'static str) -> Self {
        Self {
            name,
            motor,
            plan: None,
        }
    }

    fn target(view: &GameView) -> Option<(u64, Action)> {
        match view {
            GameView::Rhythm {
                next_beat_ms: Some(beat),
                ..
            } => Some((*beat, Action::Confirm)),
            GameView::Breathing {
                next_boundary_ms: Some(boundary),
                expected: Some(expected),
                ..
            } => Some((*boundary, *expected)),
            _ => None,
        }
    }

    fn wrong_action(expected: Action) -> Option<Action> {
        match expected {
            Action::Inhale => Some(Action::Exhale),
            Action::Exhale => Some(Action::Inhale),
            // A missed beat is the only mistake available on a single button.
            _ => None,
        }
    }
}

impl PlayerPolicy for BeatBot {
    fn name(&self) -> &'static str {
        self.name
    }

    fn decide(&mut self, view: &GameView, now_ms: u64) -> BotIntent {
        let Some((target_ms, expected)) = Self::target(view) else {
            self.plan = None;
            return BotIntent::idle();
        };
        if self.plan.is_none_or(|plan| plan.target_ms != target_ms) {
            let press_at_ms = target_ms.saturating_add_signed(self.motor.jitter());
            let slipped = self.motor.slips();
            let action = if slipped {
                Self::wrong_action(expected)
            } else {
                Some(expected)
            };
            self.plan = Some(PlannedPress {
                target_ms,
                press_at_ms,
                action: action.unwrap_or(expected),
                done: slipped && action.is_none(),
            });
        }
        match self.plan.as_mut() {
            Some(plan) if !plan.done && now_ms >= plan.press_at_ms => {
                plan.done = true;
                BotIntent::tap(plan.action)
            }
            _ => BotIntent::idle(),
        }
    }
}

/// Watches the sequence being shown, then replays it pose by pose.
struct MemoryBot {
    motor: Motor,
    seen: BTreeMap<usize, Action>,
    plan: Option<(u32, usize, PlannedPress)>,
}

const MEMORY_POSES: [Action; 5] = [
    Action::MoveLeft,
    Action::MoveRight,
    Action::Confirm,
    Action::Inhale,
    Action::Exhale,
];

impl MemoryBot {
    fn new(motor: Motor) -> Self {
        Self {
            motor,
            seen: BTreeMap::new(),
            plan: None,
        }
    }

    fn choose_pose(&mut self, index: usize) -> Action {
        let remembered = self.seen.get(&index).copied();
        let expected = remembered
            .or_else(|| self.motor.pick(&MEMORY_POSES))
            .unwrap_or(Action::Confirm);
        if !self.motor.slips() {
            return expected;
        }
        let wrong: Vec<Action> = MEMORY_POSES
            .into_iter()
            .filter(|pose| *pose != expected)
            .collect();
        self.motor.pick(&wrong).unwrap_or(expected)
    }
}

impl PlayerPolicy for MemoryBot {
    fn name(&self) -> &'static str {
        "Memory Bot"
    }

    fn decide(&mut self, view: &GameView, now_ms: u64) -> BotIntent {
        let GameView::Memory {
            round,
            showing,
            input_open,
            entered,
            sequence_len,
        } = view
        else {
            return BotIntent::idle();
        };
        if let Some((index, pose)) = showing {
            // Rounds replay a prefix of one sequence, so indices stay valid.
            self.seen.insert(*index, *pose);
            self.plan = None;
            return BotIntent::idle();
        }
        if !*input_open || *entered >= *sequence_len {
            return BotIntent::idle();
        }
        let fresh = self
            .plan
            .is_none_or(|(planned_round, planned_index, _)| {
                planned_round != *round || planned_index != *entered
            });
        if fresh {
            let press_at_ms = now_ms.saturating_add(self.motor.reaction());
            let action = self.choose_pose(*entered);
            self.plan = Some((
                *round,
                *entered,
                PlannedPress {
                    target_ms: now_ms,
                    press_at_ms,
                    action,
                    done: false,
                },
            ));
        }
        match self.plan.as_mut() {
            Some((_, _, plan)) if !plan.done && now_ms >= plan.press_at_ms => {
                plan.done = true;
                BotIntent::tap(plan.action)
            }
            _ => BotIntent::idle(),
        }
    }
}

/// Reads the dilemma and answers after thinking it over.
struct ReflexBot {
    motor: Motor,
    plan: Option<(u32, String, PlannedPress)>,
}

impl ReflexBot {
    fn new(motor: Motor) -> Self {
        Self { motor, plan: None }
    }

    fn choose(&mut self, dilemma_id: &str, options: usize) -> Option<u8> {
        let options = u8::try_from(options).ok().filter(|n| *n > 0)?;
        let virtuous = dilemma_bank()
            .iter()
            .find(|dilemma| dilemma.id == dilemma_id)
            .map(|dilemma| dilemma.virtuous);
        let Some(virtuous) = virtuous else {
            let all: Vec<u8> = (1..=options).collect();
            return self.motor.pick(&all);
        };
        if !self.motor.slips() {
            return Some(virtuous);
        }
        let wrong: Vec<u8> = (1..=options).filter(|n| *n != virtuous).collect();
        self.motor.pick(&wrong).or(Some(virtuous))
    }
}

impl PlayerPolicy for ReflexBot {
    fn name(&self) -> &'static str {
        "Reflex Bot"
    }

    fn decide(&mut self, view: &GameView, now_ms: u64) -> BotIntent {
        let GameView::Reflex {
            round,
            dilemma_id: Some(dilemma_id),
            options,
            ..
        } = view
        else {
            return BotIntent::idle();
        };
        let fresh = self
            .plan
            .as_ref()
            .is_none_or(|(planned_round, planned_id, _)| {
                planned_round != round || planned_id != dilemma_id
            });
        if fresh {
            let Some(choice) = self.choose(dilemma_id, *options) else {
                return BotIntent::idle();
            };
            // Reading a question takes longer than reacting to a beat.
            let think = self.motor.reaction().saturating_mul(2);
            self.plan = Some((
                *round,
                dilemma_id.clone(),
                PlannedPress {
                    target_ms: now_ms,
                    press_at_ms: now_ms.saturating_add(think),
                    action: Action::Choice(choice),
                    done: false,
                },
            ));
        }
        match self.plan.as_mut() {
            Some((_, _, plan)) if !plan.done && now_ms >= plan.press_at_ms => {
                plan.done = true;
                BotIntent::tap(plan.action)
            }
            _ => BotIntent::idle(),
        }
    }
}

/// Perceives a value with the skill's lag.
#[derive(Debug, Clone)]
struct LaggedSignal {
    lag: usize,
    history: VecDeque<f32>,
}

impl LaggedSignal {
    fn new(lag: usize) -> Self {
        Self {
            lag,
            history: VecDeque::with_capacity(lag + 2),
        }
    }

    /// Push the latest reading; returns the perceived value and its
    /// per-frame change.
    fn observe(&mut self, value: f32) -> (f32, f32) {
        self.history.push_back(value);
        while self.history.len() > self.lag + 2 {
            self.history.pop_front();
        }
        let len = self.history.len();
        let perceived_at = len.saturating_sub(1 + self.lag);
        let perceived = self.history.get(perceived_at).copied().unwrap_or(value);
        let before = perceived_at
            .checked_sub(1)
            .and_then(|idx| self.history.get(idx).copied())
            .unwrap_or(perceived);
        (perceived, perceived - before)
    }
}

const BALANCE_LOOKAHEAD_FRAMES: f32 = 6.0;

/// Leans against the tilt it expects a few frames ahead.
struct BalanceBot {
    motor: Motor,
    tilt: LaggedSignal,
    deadband_deg: f32,
}

impl BalanceBot {
    fn new(motor: Motor) -> Self {
        let lag = motor.profile.lag_frames;
        // Slower players only notice larger leans.
        let deadband_deg = 1.5 + 0.75 * f32::from(u16::try_from(lag).unwrap_or(u16::MAX));
        Self {
            motor,
            tilt: LaggedSignal::new(lag),
            deadband_deg,
        }
    }
}

impl PlayerPolicy for BalanceBot {
    fn name(&self) -> &'static str {
        "Balance Bot"
    }

    fn decide(&mut self, view: &GameView, _now_ms: u64) -> BotIntent {
        let GameView::Balance { tilt_deg, .. } = view else {
            return BotIntent::idle();
        };
        let (tilt, velocity) = self.tilt.observe(*tilt_deg);
        let predicted = tilt + velocity * BALANCE_LOOKAHEAD_FRAMES;
        if predicted > self.deadband_deg {
            BotIntent::hold(Action::MoveLeft)
        } else if predicted < -self.deadband_deg {
            BotIntent::hold(Action::MoveRight)
        } else if self.motor.slips() {
            // Fidget.
            self.motor
                .pick(&[Action::MoveLeft, Action::MoveRight])
                .map_or_else(BotIntent::idle, BotIntent::hold)
        } else {
            BotIntent::idle()
        }
    }
}

const DISTANCE_RETREAT_BELOW: f32 = 72.0;
const DISTANCE_CLOSE_ABOVE: f32 = 92.0;

/// Keeps the opponent inside the good band.
struct DistanceBot {
    motor: Motor,
    distance: LaggedSignal,
}

impl DistanceBot {
    fn new(motor: Motor) -> Self {
        let lag = motor.profile.lag_frames;
        Self {
            motor,
            distance: LaggedSignal::new(lag),
        }
    }
}

impl PlayerPolicy for DistanceBot {
    fn name(&self) -> &'static str {
        "Distance Bot"
    }

    fn decide(&mut self, view: &GameView, _now_ms: u64) -> BotIntent {
        let GameView::Distance { distance, .. } = view else {
            return BotIntent::idle();
        };
        let (perceived, _) = self.distance.observe(*distance);
        if self.motor.slips() {
            return BotIntent::idle();
        }
        if perceived < DISTANCE_RETREAT_BELOW {
            BotIntent::hold(Action::MoveLeft)
        } else if perceived > DISTANCE_CLOSE_ABOVE {
            BotIntent::hold(Action::MoveRight)
        } else {
            BotIntent::idle()
        }
    }
}
