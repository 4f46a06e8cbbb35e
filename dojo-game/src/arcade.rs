//! Session host: the one place the platform calls per animation frame and
//! per raw input event.
//!
//! The arcade owns every live [`GameSession`], its [`InputMapper`] and its
//! scheduler subscription. Exiting a session unsubscribes, unregisters and
//! drops it in one call, so no later frame can reach it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::clock::{FrameScheduler, SubscriptionId, TimeSource};
use crate::games::build_game;
use crate::input::{Action, InputEdge, InputMapper, PhysicalInput, RawInput};
use crate::session::{GameId, GameResult, GameSession, SessionTuning};
use crate::tuning::GameTuning;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(u64);

#[derive(Debug)]
struct Slot {
    session: GameSession,
    input: InputMapper,
    subscription: SubscriptionId,
}

#[derive(Debug)]
pub struct Arcade<T: TimeSource> {
    time: T,
    tuning: GameTuning,
    scheduler: FrameScheduler,
    slots: BTreeMap<SessionId, Slot>,
    next_id: u64,
    finished: Vec<GameResult>,
}

impl<T: TimeSource> Arcade<T> {
    #[must_use]
    pub fn new(time: T, tuning: GameTuning) -> Self {
        let scheduler = FrameScheduler::at_hz(tuning.frame_hz);
        Self {
            time,
            tuning,
            scheduler,
            slots: BTreeMap::new(),
            next_id: 0,
            finished: Vec::new(),
        }
    }

    /// Mount a game in `Intro` with its default bindings.
    pub fn launch(&mut self, game_id: GameId, seed: u64) -> SessionId {
        let id = SessionId(self.next_id);
        self.next_id += 1;
        let session = GameSession::new(
            build_game(game_id, &self.tuning),
            seed,
            SessionTuning::from(&self.tuning),
        );
        let input = InputMapper::with_defaults(&session.actions());
        let subscription = self.scheduler.subscribe(self.time.now_ms());
        log::debug!("launched {game_id} as session {}", id.0);
        self.slots.insert(
            id,
            Slot {
                session,
                input,
                subscription,
            },
        );
        id
    }

    pub fn start(&mut self, id: SessionId) -> bool {
        let now = self.time.now_ms();
        let Some(slot) = self.slots.get_mut(&id) else {
            return false;
        };
        if !slot.session.start() {
            return false;
        }
        self.scheduler.restart(slot.subscription, now);
        slot.input.set_accepting(true);
        true
    }

    pub fn restart(&mut self, id: SessionId) -> bool {
        let now = self.time.now_ms();
        let Some(slot) = self.slots.get_mut(&id) else {
            return false;
        };
        if !slot.session.restart() {
            return false;
        }
        self.scheduler.restart(slot.subscription, now);
        slot.input.set_accepting(true);
        true
    }

    /// Tear a session down. Its subscription and bindings are gone before
    /// this returns.
    pub fn exit(&mut self, id: SessionId) -> bool {
        let Some(mut slot) = self.slots.remove(&id) else {
            return false;
        };
        self.scheduler.unsubscribe(slot.subscription);
        slot.input.unregister_all();
        log::debug!("session {} exited", id.0);
        true
    }

    /// Feed one raw device event, stamped with the session's elapsed time.
    /// Returns the action it was queued as.
    pub fn handle_input(
        &mut self,
        id: SessionId,
        input: PhysicalInput,
        edge: InputEdge,
    ) -> Option<Action> {
        let now = self.time.now_ms();
        let slot = self.slots.get_mut(&id)?;
        if !slot.session.accepts_input() {
            return None;
        }
        let at_ms = self.scheduler.elapsed(slot.subscription, now)?;
        slot.input.handle(RawInput { input, edge, at_ms })
    }

    /// Run every due tick. Returns the number of sessions ticked.
    pub fn frame(&mut self) -> usize {
        let now = self.time.now_ms();
        let ticks = self.scheduler.due(now);
        let mut ticked = 0;
        for tick in ticks {
            let Some(slot) = self
                .slots
                .values_mut()
                .find(|slot| slot.subscription == tick.id)
            else {
                continue;
            };
            let held = slot.input.held_actions();
            let actions = slot.input.drain_tick();
            slot.session.tick(tick.elapsed_ms, &held, &actions);
            slot.input.set_accepting(slot.session.accepts_input());
            if let Some(result) = slot.session.take_result() {
                self.finished.push(result);
            }
            ticked += 1;
        }
        ticked
    }

    /// Results of runs that ended since the last call.
    pub fn take_results(&mut self) -> Vec<GameResult> {
        std::mem::take(&mut self.finished)
    }

    #[must_use]
    pub fn session(&self, id: SessionId) -> Option<&GameSession> {
        self.slots.get(&id).map(|slot| &slot.session)
    }

    #[must_use]
    pub fn live_sessions(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn scheduled(&self) -> usize {
        self.scheduler.len()
    }

    #[must_use]
    pub fn bindings(&self, id: SessionId) -> usize {
        self.slots
            .get(&id)
            .map_or(0, |slot| slot.input.binding_count())
    }

    #[must_use]
    pub const fn time(&self) -> &T {
        &self.time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualTime;
    use crate::session::GamePhase;

    fn arcade() -> (Arcade<ManualTime>, ManualTime) {
        let time = ManualTime::new(10_000);
        (Arcade::new(time.clone(), GameTuning::default()), time)
    }

    fn press(arcade: &mut Arcade<ManualTime>, id: SessionId, code: &str) -> Option<Action> {
        let action = arcade.handle_input(id, PhysicalInput::key(code), InputEdge::Down);
        arcade.handle_input(id, PhysicalInput::key(code), InputEdge::Up);
        action
    }

    #[test]
    fn intro_discards_input_and_ticks() {
        let (mut arcade, time) = arcade();
        let id = arcade.launch(GameId::Rhythm, 1);
        assert_eq!(press(&mut arcade, id, "Space"), None);
        time.advance(100);
        arcade.frame();
        assert_eq!(arcade.session(id).unwrap().phase(), GamePhase::Intro);
    }

    #[test]
    fn presses_are_stamped_with_session_time() {
        let (mut arcade, time) = arcade();
        let id = arcade.launch(GameId::Rhythm, 1);
        time.advance(5_000);
        assert!(arcade.start(id));
        time.advance(848);
        assert_eq!(press(&mut arcade, id, "Space"), Some(Action::Confirm));
        time.advance(16);
        assert_eq!(arcade.frame(), 1);
        let session = arcade.session(id).unwrap();
        assert_eq!(session.score(), 100);
        assert_eq!(session.events()[0].at_ms, 848);
    }

    #[test]
    fn two_devices_on_one_action_count_once() {
        let (mut arcade, time) = arcade();
        let id = arcade.launch(GameId::Rhythm, 1);
        arcade.start(id);
        time.advance(800);
        press(&mut arcade, id, "Space");
        arcade.handle_input(
            id,
            PhysicalInput::Touch(crate::input::TouchButton::Confirm),
            InputEdge::Down,
        );
        time.advance(16);
        arcade.frame();
        assert_eq!(arcade.session(id).unwrap().events().len(), 1);
    }

    #[test]
    fn exit_is_synchronous_and_final() {
        let (mut arcade, time) = arcade();
        let id = arcade.launch(GameId::Rhythm, 1);
        arcade.start(id);
        assert!(arcade.bindings(id) > 0);
        time.advance(800);
        press(&mut arcade, id, "Space");

        assert!(arcade.exit(id));
        assert_eq!(arcade.scheduled(), 0);
        assert_eq!(arcade.bindings(id), 0);
        assert!(arcade.session(id).is_none());

        time.advance(1_000);
        assert_eq!(arcade.frame(), 0);
        assert_eq!(press(&mut arcade, id, "Space"), None);
        assert!(arcade.take_results().is_empty());
        assert!(!arcade.exit(id));
    }

    #[test]
    fn finished_runs_are_reported_once() {
        let (mut arcade, time) = arcade();
        let id = arcade.launch(GameId::Rhythm, 1);
        arcade.start(id);
        time.advance(20_000);
        arcade.frame();
        let results = arcade.take_results();
        assert_eq!(results.len(), 1);
        assert!(!results[0].is_success());
        time.advance(16);
        arcade.frame();
        assert!(arcade.take_results().is_empty());

        assert!(arcade.restart(id));
        assert_eq!(arcade.session(id).unwrap().score(), 0);
        assert!(arcade.session(id).unwrap().accepts_input());
    }
}
