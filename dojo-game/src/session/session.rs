use rand::rngs::SmallRng;

use crate::constants::DEBUG_ENV_VAR;
use crate::games::{Frame, GameEvent, GameView, MiniGame, Verdict};
use crate::input::{Action, TimedAction};
use crate::scoring::{ScoreEvent, ScoreLedger, TierPoints};
use crate::seed::run_rng;
use crate::tuning::GameTuning;

use super::phase::{GamePhase, PhaseInput, reduce};
use super::result::{GameId, GameResult, Outcome};

#[cfg(debug_assertions)]
fn debug_log_enabled() -> bool {
    matches!(std::env::var(DEBUG_ENV_VAR), Ok(val) if val != "0")
}

#[cfg(not(debug_assertions))]
const fn debug_log_enabled() -> bool {
    false
}

/// Session-level knobs shared by every game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTuning {
    pub points: TierPoints,
    pub feedback_ms: u64,
}

impl From<&GameTuning> for SessionTuning {
    fn from(tuning: &GameTuning) -> Self {
        Self {
            points: tuning.points,
            feedback_ms: tuning.feedback_ms,
        }
    }
}

impl Default for SessionTuning {
    fn default() -> Self {
        Self::from(&GameTuning::default())
    }
}

/// One mini-game instance driven through the generic lifecycle.
///
/// Within a tick the game's physics runs up to each input's timestamp before
/// that input is judged, and the termination predicate is polled after each
/// step.
#[derive(Debug)]
pub struct GameSession {
    game: Box<dyn MiniGame>,
    tuning: SessionTuning,
    base_seed: u64,
    attempt: u32,
    rng: SmallRng,
    phase: GamePhase,
    elapsed_ms: u64,
    ledger: ScoreLedger,
    lives: Option<u8>,
    result: Option<GameResult>,
    result_claimed: bool,
    scratch: Vec<GameEvent>,
}

impl GameSession {
    /// Mount a session in `Intro`.
    #[must_use]
    pub fn new(mut game: Box<dyn MiniGame>, base_seed: u64, tuning: SessionTuning) -> Self {
        let mut rng = run_rng(base_seed, game.id(), 0);
        game.reset(&mut rng);
        let lives = game.lives();
        Self {
            game,
            tuning,
            base_seed,
            attempt: 0,
            rng,
            phase: GamePhase::Intro,
            elapsed_ms: 0,
            ledger: ScoreLedger::new(),
            lives,
            result: None,
            result_claimed: false,
            scratch: Vec::new(),
        }
    }

    /// Leave `Intro`. Returns `false` from any other phase.
    pub fn start(&mut self) -> bool {
        if self.phase != GamePhase::Intro {
            return false;
        }
        self.phase = reduce(self.phase, PhaseInput::Start);
        self.game.begin_round(0);
        log::debug!("{} session started (seed {})", self.game.id(), self.base_seed);
        true
    }

    /// Begin a fresh run with score, streak, lives, elapsed time and the
    /// game's generators back at their initial values.
    pub fn restart(&mut self) -> bool {
        if self.phase == GamePhase::Intro {
            return false;
        }
        self.attempt = self.attempt.saturating_add(1);
        self.rng = run_rng(self.base_seed, self.game.id(), self.attempt);
        self.game.reset(&mut self.rng);
        self.ledger.reset();
        self.elapsed_ms = 0;
        self.lives = self.game.lives();
        self.result = None;
        self.result_claimed = false;
        self.scratch.clear();
        self.phase = reduce(self.phase, PhaseInput::Restart);
        self.game.begin_round(0);
        log::debug!("{} session restarted (attempt {})", self.game.id(), self.attempt);
        true
    }

    /// Advance to `elapsed_ms` and judge this tick's actions.
    ///
    /// Actions are judged in timestamp order, each after the game has been
    /// advanced to the moment it happened, so a press delivered by a late
    /// frame is still judged against the window it was made in.
    pub fn tick(&mut self, elapsed_ms: u64, held: &[Action], actions: &[TimedAction]) {
        let from = self.elapsed_ms;
        let now = elapsed_ms.max(from);
        self.elapsed_ms = now;

        if let GamePhase::Feedback { .. } = self.phase {
            let next = reduce(self.phase, PhaseInput::Tick { at_ms: now });
            if next.is_playing() {
                self.phase = next;
                self.game.begin_round(now);
            }
            return;
        }
        if !self.phase.is_playing() {
            return;
        }

        let mut queued = actions.to_vec();
        queued.sort_by_key(|action| action.at_ms);
        let mut cursor = from;
        for action in queued {
            let at = action.at_ms.clamp(cursor, now);
            if at > cursor {
                self.step(cursor, at, held);
                cursor = at;
            }
            if !self.dispatch(action) {
                break;
            }
        }
        if cursor < now && self.phase.is_playing() {
            self.step(cursor, now, held);
        }

        if debug_log_enabled() {
            log::debug!(
                "{} tick {}ms score {} streak {} phase {:?}",
                self.game.id(),
                now,
                self.ledger.score(),
                self.ledger.streak(),
                self.phase
            );
        }
    }

    fn step(&mut self, from_ms: u64, to_ms: u64, held: &[Action]) {
        if !self.phase.is_playing() {
            return;
        }
        let frame = Frame {
            elapsed_ms: to_ms,
            dt_ms: to_ms - from_ms,
            held,
        };
        self.game.advance(&frame, &mut self.rng, &mut self.scratch);
        self.apply_events();
        self.poll(to_ms);
    }

    /// Judge one action immediately. Input outside `Playing` is ignored.
    pub fn dispatch(&mut self, action: TimedAction) -> bool {
        if !self.phase.is_playing() {
            return false;
        }
        self.game.on_action(action, &mut self.scratch);
        self.apply_events();
        self.poll(action.at_ms.max(self.elapsed_ms));
        true
    }

    fn apply_events(&mut self) {
        for event in std::mem::take(&mut self.scratch) {
            match event {
                GameEvent::Scored { tier, at_ms } => {
                    self.ledger.record(tier, at_ms, &self.tuning.points);
                }
                GameEvent::LifeLost { at_ms } => {
                    if let Some(lives) = self.lives.as_mut() {
                        *lives = lives.saturating_sub(1);
                        log::debug!("{} life lost at {at_ms}ms ({lives} left)", self.game.id());
                    }
                }
                GameEvent::RoundComplete { round, at_ms }
                | GameEvent::RoundRetry { round, at_ms } => {
                    self.phase = reduce(
                        self.phase,
                        PhaseInput::RoundComplete {
                            round,
                            at_ms,
                            feedback_ms: self.tuning.feedback_ms,
                        },
                    );
                    if self.phase.is_playing() {
                        self.game.begin_round(at_ms);
                    }
                }
            }
        }
    }

    fn poll(&mut self, at_ms: u64) {
        if self.phase.is_terminal() || self.phase == GamePhase::Intro {
            return;
        }
        if self.lives == Some(0) {
            self.finish(Outcome::Fail, at_ms);
            return;
        }
        match self.game.verdict() {
            Verdict::Continue => {}
            Verdict::Success => self.finish(Outcome::Success, at_ms),
            Verdict::Fail => self.finish(Outcome::Fail, at_ms),
        }
    }

    fn finish(&mut self, outcome: Outcome, at_ms: u64) {
        let input = match outcome {
            Outcome::Success => PhaseInput::Succeeded { at_ms },
            Outcome::Fail => PhaseInput::Failed { at_ms },
        };
        self.phase = reduce(self.phase, input);
        let result = GameResult::from_ledger(
            self.game.id(),
            self.attempt,
            &self.ledger,
            self.game.reward(),
            at_ms,
            outcome,
        );
        log::info!(
            "{} run {} ended {:?}: score {} ki {}",
            result.game_id,
            result.run,
            result.outcome,
            result.score,
            result.ki_earned
        );
        self.result = Some(result);
    }

    #[must_use]
    pub fn game_id(&self) -> GameId {
        self.game.id()
    }

    #[must_use]
    pub const fn phase(&self) -> GamePhase {
        self.phase
    }

    #[must_use]
    pub const fn accepts_input(&self) -> bool {
        self.phase.is_playing()
    }

    #[must_use]
    pub const fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    #[must_use]
    pub const fn score(&self) -> u64 {
        self.ledger.score()
    }

    #[must_use]
    pub const fn streak(&self) -> u32 {
        self.ledger.streak()
    }

    #[must_use]
    pub const fn lives(&self) -> Option<u8> {
        self.lives
    }

    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    #[must_use]
    pub const fn ledger(&self) -> &ScoreLedger {
        &self.ledger
    }

    #[must_use]
    pub fn events(&self) -> &[ScoreEvent] {
        self.ledger.events()
    }

    #[must_use]
    pub fn actions(&self) -> Vec<Action> {
        self.game.actions()
    }

    #[must_use]
    pub fn view(&self) -> GameView {
        self.game.view()
    }

    /// Result of the current run, once it has ended.
    #[must_use]
    pub const fn result(&self) -> Option<&GameResult> {
        self.result.as_ref()
    }

    /// Hand the current run's result out exactly once.
    pub fn take_result(&mut self) -> Option<GameResult> {
        if self.result_claimed {
            return None;
        }
        let result = self.result.clone()?;
        self.result_claimed = true;
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::build_game;
    use crate::scoring::Tier;

    fn rhythm_session() -> GameSession {
        session_for(GameId::Rhythm)
    }

    fn session_for(id: GameId) -> GameSession {
        let tuning = GameTuning::default();
        GameSession::new(build_game(id, &tuning), 1337, SessionTuning::from(&tuning))
    }

    fn judged(session: &GameSession) -> Vec<(Tier, u64)> {
        session
            .events()
            .iter()
            .map(|event| (event.tier, event.at_ms))
            .collect()
    }

    fn virtuous_choice(session: &GameSession) -> u8 {
        let GameView::Reflex {
            dilemma_id: Some(id),
            ..
        } = session.view()
        else {
            panic!("no dilemma on screen");
        };
        crate::data::dilemma_bank()
            .iter()
            .find(|dilemma| dilemma.id == id)
            .map(|dilemma| dilemma.virtuous)
            .unwrap()
    }

    fn confirm(at_ms: u64) -> TimedAction {
        TimedAction::new(Action::Confirm, at_ms)
    }

    #[test]
    fn intro_ignores_ticks_and_input() {
        let mut session = rhythm_session();
        session.tick(900, &[], &[confirm(850)]);
        assert_eq!(session.phase(), GamePhase::Intro);
        assert_eq!(session.score(), 0);
        assert!(!session.dispatch(confirm(850)));
        assert!(!session.restart());
    }

    #[test]
    fn perfect_hit_then_miss_resets_streak() {
        let mut session = rhythm_session();
        assert!(session.start());
        session.tick(850, &[], &[confirm(850)]);
        assert_eq!(session.streak(), 1);
        assert_eq!(session.score(), 100);

        // Second beat at 1600; a press 500ms early is outside every window.
        session.tick(1_100, &[], &[confirm(1_100)]);
        assert_eq!(session.streak(), 0);
        assert_eq!(session.score(), 100);

        session.tick(2_400, &[], &[confirm(2_400)]);
        let last = session.events().last().copied().unwrap();
        assert_eq!(last.tier, Tier::Perfect);
        assert_eq!(last.multiplier, 1);
        assert_eq!(session.score(), 200);
    }

    #[test]
    fn restart_resets_everything() {
        let mut session = rhythm_session();
        session.start();
        for beat in 0..12u64 {
            let at = 800 + beat * 800;
            session.tick(at, &[], &[confirm(at)]);
        }
        assert!(session.phase().is_terminal());
        let result = session.take_result().expect("run result");
        assert_eq!(result.outcome, Outcome::Success);
        assert!(session.take_result().is_none());

        assert!(session.restart());
        assert_eq!(session.phase(), GamePhase::Playing);
        assert_eq!(session.elapsed_ms(), 0);
        assert_eq!(session.score(), 0);
        assert_eq!(session.streak(), 0);
        assert!(session.events().is_empty());
        assert!(session.result().is_none());
        assert_eq!(session.attempt(), 1);
    }

    #[test]
    fn unanswered_beats_fail_the_run() {
        let mut session = rhythm_session();
        session.start();
        session.tick(20_000, &[], &[]);
        assert_eq!(session.phase(), GamePhase::Failed { at_ms: 20_000 });
        let result = session.take_result().unwrap();
        assert_eq!(result.miss_count, 12);
        assert_eq!(result.ki_earned, 0);
    }

    #[test]
    fn late_frame_keeps_rhythm_good_edge() {
        let mut session = rhythm_session();
        session.start();
        session.tick(1_216, &[], &[confirm(1_200)]);
        assert_eq!(judged(&session), vec![(Tier::Good, 1_200)]);
        assert_eq!(session.streak(), 1);

        // Just past the edge: the beat expires on its own and the press
        // counts toward the 1600ms beat instead.
        let mut session = rhythm_session();
        session.start();
        session.tick(1_216, &[], &[confirm(1_201)]);
        assert_eq!(
            judged(&session),
            vec![(Tier::Miss, 1_200), (Tier::Good, 1_201)]
        );
    }

    #[test]
    fn late_frame_keeps_breathing_good_edge() {
        let mut session = session_for(GameId::Breathing);
        session.start();
        let inhale = TimedAction::new(Action::Inhale, 1_700);
        session.tick(1_716, &[], &[inhale]);
        assert_eq!(judged(&session), vec![(Tier::Good, 1_700)]);

        let mut session = session_for(GameId::Breathing);
        session.start();
        let inhale = TimedAction::new(Action::Inhale, 1_701);
        session.tick(1_716, &[], &[inhale]);
        assert_eq!(judged(&session)[0], (Tier::Miss, 1_700));
    }

    #[test]
    fn late_frame_keeps_reflex_answer_at_deadline() {
        let mut session = session_for(GameId::Reflex);
        session.start();
        let choice = virtuous_choice(&session);
        session.tick(8_016, &[], &[TimedAction::new(Action::Choice(choice), 8_000)]);
        assert_eq!(judged(&session), vec![(Tier::Good, 8_000)]);
        assert_eq!(session.lives(), Some(3));
        assert!(matches!(session.phase(), GamePhase::Feedback { round: 1, .. }));

        let mut session = session_for(GameId::Reflex);
        session.start();
        let choice = virtuous_choice(&session);
        session.tick(8_016, &[], &[TimedAction::new(Action::Choice(choice), 8_001)]);
        assert_eq!(judged(&session), vec![(Tier::Miss, 8_000)]);
    }

    #[test]
    fn wrong_memory_pose_replays_the_round_after_feedback() {
        let mut session = session_for(GameId::Memory);
        session.start();
        session.tick(0, &[], &[]);
        let GameView::Memory {
            showing: Some((0, first)),
            ..
        } = session.view()
        else {
            panic!("memory opens by showing its first pose");
        };
        let wrong = if first == Action::Confirm {
            Action::Inhale
        } else {
            Action::Confirm
        };

        session.tick(1_900, &[], &[TimedAction::new(wrong, 1_850)]);
        assert_eq!(judged(&session), vec![(Tier::Miss, 1_850)]);
        assert_eq!(session.lives(), Some(2));
        assert_eq!(
            session.phase(),
            GamePhase::Feedback {
                round: 1,
                until_ms: 3_050
            }
        );
        assert!(!session.accepts_input());

        session.tick(3_050, &[], &[]);
        assert_eq!(session.phase(), GamePhase::Playing);
        let GameView::Memory {
            round,
            showing,
            entered,
            ..
        } = session.view()
        else {
            panic!("memory view expected");
        };
        assert_eq!(round, 0);
        assert_eq!(showing, Some((0, first)));
        assert_eq!(entered, 0);
    }

    #[test]
    fn queued_actions_are_judged_in_time_order() {
        let mut session = rhythm_session();
        session.start();
        session.tick(1_700, &[], &[confirm(1_650), confirm(820)]);
        assert_eq!(
            judged(&session),
            vec![(Tier::Perfect, 820), (Tier::Perfect, 1_650)]
        );
        assert_eq!(session.score(), 300);
    }

    #[test]
    fn elapsed_never_runs_backwards() {
        let mut session = rhythm_session();
        session.start();
        session.tick(500, &[], &[]);
        session.tick(300, &[], &[]);
        assert_eq!(session.elapsed_ms(), 500);
    }
}
