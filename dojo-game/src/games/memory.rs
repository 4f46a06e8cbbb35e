use rand::rngs::SmallRng;
use rand::seq::SliceRandom;

use super::{Frame, GameEvent, GameView, MiniGame, Verdict};
use crate::input::{Action, TimedAction};
use crate::scoring::Tier;
use crate::session::GameId;
use crate::tuning::{KiReward, MemoryTuning};

const POSES: [Action; 5] = [
    Action::MoveLeft,
    Action::MoveRight,
    Action::Confirm,
    Action::Inhale,
    Action::Exhale,
];

/// Mirror a pose sequence shown one pose at a time. Each round shows one
/// more pose than the last; a wrong pose costs a life and the round is
/// shown again after feedback.
#[derive(Debug, Clone)]
pub struct MemoryGame {
    tuning: MemoryTuning,
    sequence: Vec<Action>,
    completed: u32,
    entered: usize,
    show_from_ms: u64,
    prompt_ms: u64,
    now_ms: u64,
}

impl MemoryGame {
    #[must_use]
    pub fn new(tuning: MemoryTuning) -> Self {
        Self {
            tuning,
            sequence: Vec::new(),
            completed: 0,
            entered: 0,
            show_from_ms: 0,
            prompt_ms: 0,
            now_ms: 0,
        }
    }

    /// Poses the player must reproduce this round.
    #[must_use]
    pub fn round_sequence(&self) -> &[Action] {
        let len = self.round_len().min(self.sequence.len());
        &self.sequence[..len]
    }

    fn round_len(&self) -> usize {
        usize::try_from(self.tuning.start_length.saturating_add(self.completed)).unwrap_or(usize::MAX)
    }

    fn input_opens_ms(&self) -> u64 {
        let shown = u64::try_from(self.round_sequence().len()).unwrap_or(u64::MAX);
        self.show_from_ms
            .saturating_add(shown.saturating_mul(self.tuning.show_ms))
    }

    fn showing(&self) -> Option<(usize, Action)> {
        if self.now_ms < self.show_from_ms || self.now_ms >= self.input_opens_ms() {
            return None;
        }
        let index = (self.now_ms - self.show_from_ms) / self.tuning.show_ms.max(1);
        let index = usize::try_from(index).ok()?;
        self.round_sequence().get(index).map(|pose| (index, *pose))
    }
}

impl MiniGame for MemoryGame {
    fn id(&self) -> GameId {
        GameId::Memory
    }

    fn actions(&self) -> Vec<Action> {
        POSES.to_vec()
    }

    fn lives(&self) -> Option<u8> {
        Some(self.tuning.lives)
    }

    fn reward(&self) -> KiReward {
        self.tuning.reward
    }

    fn reset(&mut self, rng: &mut SmallRng) {
        let total = self
            .tuning
            .start_length
            .saturating_add(self.tuning.rounds.saturating_sub(1));
        self.sequence = (0..total)
            .filter_map(|_| POSES.choose(rng).copied())
            .collect();
        self.completed = 0;
        self.entered = 0;
        self.show_from_ms = 0;
        self.prompt_ms = 0;
        self.now_ms = 0;
    }

    fn begin_round(&mut self, at_ms: u64) {
        self.entered = 0;
        self.show_from_ms = at_ms;
        self.now_ms = self.now_ms.max(at_ms);
        self.prompt_ms = self.input_opens_ms();
    }

    fn advance(&mut self, frame: &Frame<'_>, _rng: &mut SmallRng, _events: &mut Vec<GameEvent>) {
        self.now_ms = frame.elapsed_ms;
    }

    fn on_action(&mut self, action: TimedAction, events: &mut Vec<GameEvent>) {
        if !POSES.contains(&action.action) || action.at_ms < self.input_opens_ms() {
            return;
        }
        let Some(expected) = self.round_sequence().get(self.entered).copied() else {
            return;
        };
        if action.action != expected {
            events.push(GameEvent::Scored {
                tier: Tier::Miss,
                at_ms: action.at_ms,
            });
            events.push(GameEvent::LifeLost {
                at_ms: action.at_ms,
            });
            self.entered = 0;
            events.push(GameEvent::RoundRetry {
                round: self.completed + 1,
                at_ms: action.at_ms,
            });
            return;
        }

        let latency = action.at_ms.saturating_sub(self.prompt_ms);
        let tier = if latency <= self.tuning.perfect_latency_ms {
            Tier::Perfect
        } else {
            Tier::Good
        };
        events.push(GameEvent::Scored {
            tier,
            at_ms: action.at_ms,
        });
        self.entered += 1;
        self.prompt_ms = action.at_ms;

        if self.entered == self.round_sequence().len() {
            self.completed += 1;
            self.entered = 0;
            events.push(GameEvent::RoundComplete {
                round: self.completed,
                at_ms: action.at_ms,
            });
        }
    }

    fn verdict(&self) -> Verdict {
        if self.completed >= self.tuning.rounds {
            Verdict::Success
        } else {
            Verdict::Continue
        }
    }

    fn view(&self) -> GameView {
        GameView::Memory {
            round: self.completed,
            showing: self.showing(),
            input_open: self.now_ms >= self.input_opens_ms(),
            entered: self.entered,
            sequence_len: self.round_sequence().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn started() -> MemoryGame {
        let mut game = MemoryGame::new(MemoryTuning::default());
        game.reset(&mut SmallRng::seed_from_u64(11));
        game.begin_round(0);
        game
    }

    fn wrong_pose(expected: Action) -> Action {
        POSES
            .into_iter()
            .find(|pose| *pose != expected)
            .unwrap_or(Action::Confirm)
    }

    #[test]
    fn sequence_grows_each_round() {
        let mut game = started();
        assert_eq!(game.round_sequence().len(), 3);
        let poses = game.round_sequence().to_vec();
        let mut events = Vec::new();
        for (i, pose) in poses.iter().enumerate() {
            let at = 1_800 + u64::try_from(i).unwrap() * 300;
            game.on_action(TimedAction::new(*pose, at), &mut events);
        }
        assert_eq!(
            events.last(),
            Some(&GameEvent::RoundComplete {
                round: 1,
                at_ms: 2_400
            })
        );
        assert_eq!(game.round_sequence().len(), 4);
        assert_eq!(game.round_sequence()[..3], poses[..]);
    }

    #[test]
    fn poses_during_the_show_are_ignored() {
        let mut game = started();
        let first = game.round_sequence()[0];
        let mut events = Vec::new();
        game.on_action(TimedAction::new(first, 500), &mut events);
        assert!(events.is_empty());
    }

    #[test]
    fn slow_answer_is_good() {
        let mut game = started();
        let first = game.round_sequence()[0];
        let mut events = Vec::new();
        game.on_action(TimedAction::new(first, 1_800 + 1_001), &mut events);
        assert_eq!(
            events,
            vec![GameEvent::Scored {
                tier: Tier::Good,
                at_ms: 2_801
            }]
        );
    }

    #[test]
    fn wrong_pose_costs_a_life_and_replays() {
        let mut game = started();
        let first = game.round_sequence()[0];
        let mut events = Vec::new();
        game.on_action(TimedAction::new(first, 1_800), &mut events);
        let second = game.round_sequence()[1];
        game.on_action(TimedAction::new(wrong_pose(second), 1_900), &mut events);
        assert!(events.contains(&GameEvent::LifeLost { at_ms: 1_900 }));
        assert_eq!(
            events.last(),
            Some(&GameEvent::RoundRetry {
                round: 1,
                at_ms: 1_900
            })
        );

        game.begin_round(3_100);
        let mut rng = SmallRng::seed_from_u64(0);
        let frame = Frame {
            elapsed_ms: 3_150,
            dt_ms: 50,
            held: &[],
        };
        game.advance(&frame, &mut rng, &mut Vec::new());
        match game.view() {
            GameView::Memory {
                showing, entered, ..
            } => {
                assert_eq!(showing, Some((0, first)));
                assert_eq!(entered, 0);
            }
            other => panic!("unexpected view {other:?}"),
        }
    }
}
