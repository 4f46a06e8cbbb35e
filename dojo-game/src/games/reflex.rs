use rand::rngs::SmallRng;
use rand::seq::SliceRandom;

use super::{Frame, GameEvent, GameView, MiniGame, Verdict};
use crate::data::Dilemma;
use crate::input::{Action, TimedAction};
use crate::scoring::Tier;
use crate::session::GameId;
use crate::tuning::{KiReward, ReflexTuning};

/// Moral-choice rounds against a countdown. The virtuous answer scores by
/// latency, any other answer costs a life, and an expired countdown scores
/// a "no answer" miss.
#[derive(Debug, Clone)]
pub struct ReflexGame {
    tuning: ReflexTuning,
    bank: Vec<Dilemma>,
    order: Vec<usize>,
    completed: u32,
    virtuous_answers: u32,
    asked_ms: u64,
    deadline_ms: u64,
    awaiting: bool,
}

impl ReflexGame {
    #[must_use]
    pub fn new(tuning: ReflexTuning, bank: Vec<Dilemma>) -> Self {
        Self {
            tuning,
            bank,
            order: Vec::new(),
            completed: 0,
            virtuous_answers: 0,
            asked_ms: 0,
            deadline_ms: 0,
            awaiting: false,
        }
    }

    /// Dilemma asked in the current round.
    #[must_use]
    pub fn current(&self) -> Option<&Dilemma> {
        let slot = usize::try_from(self.completed).ok()?;
        self.order.get(slot).and_then(|index| self.bank.get(*index))
    }

    fn close_round(&mut self, at_ms: u64, events: &mut Vec<GameEvent>) {
        self.awaiting = false;
        self.completed += 1;
        events.push(GameEvent::RoundComplete {
            round: self.completed,
            at_ms,
        });
    }
}

impl MiniGame for ReflexGame {
    fn id(&self) -> GameId {
        GameId::Reflex
    }

    fn actions(&self) -> Vec<Action> {
        let widest = self
            .bank
            .iter()
            .map(|dilemma| dilemma.options.len())
            .max()
            .unwrap_or(0);
        (1..=widest)
            .filter_map(|n| u8::try_from(n).ok())
            .map(Action::Choice)
            .collect()
    }

    fn lives(&self) -> Option<u8> {
        Some(self.tuning.lives)
    }

    fn reward(&self) -> KiReward {
        self.tuning.reward
    }

    fn reset(&mut self, rng: &mut SmallRng) {
        let mut indices: Vec<usize> = (0..self.bank.len()).collect();
        indices.shuffle(rng);
        let rounds = usize::try_from(self.tuning.rounds).unwrap_or(usize::MAX);
        // A short bank repeats its shuffled order.
        self.order = indices.iter().copied().cycle().take(rounds).collect();
        self.completed = 0;
        self.virtuous_answers = 0;
        self.asked_ms = 0;
        self.deadline_ms = 0;
        self.awaiting = false;
    }

    fn begin_round(&mut self, at_ms: u64) {
        if self.current().is_none() {
            return;
        }
        self.awaiting = true;
        self.asked_ms = at_ms;
        self.deadline_ms = at_ms.saturating_add(self.tuning.countdown_ms);
    }

    fn advance(&mut self, frame: &Frame<'_>, _rng: &mut SmallRng, events: &mut Vec<GameEvent>) {
        if self.awaiting && frame.elapsed_ms > self.deadline_ms {
            log::debug!("reflex round {} timed out", self.completed + 1);
            events.push(GameEvent::Scored {
                tier: Tier::Miss,
                at_ms: self.deadline_ms,
            });
            self.close_round(self.deadline_ms, events);
        }
    }

    fn on_action(&mut self, action: TimedAction, events: &mut Vec<GameEvent>) {
        let Action::Choice(choice) = action.action else {
            return;
        };
        if !self.awaiting || action.at_ms > self.deadline_ms {
            return;
        }
        let Some(dilemma) = self.current() else {
            return;
        };
        if choice == 0 || usize::from(choice) > dilemma.options.len() {
            return;
        }

        if choice == dilemma.virtuous {
            let latency = action.at_ms.saturating_sub(self.asked_ms);
            let tier = if latency <= self.tuning.perfect_latency_ms {
                Tier::Perfect
            } else {
                Tier::Good
            };
            self.virtuous_answers += 1;
            events.push(GameEvent::Scored {
                tier,
                at_ms: action.at_ms,
            });
        } else {
            events.push(GameEvent::Scored {
                tier: Tier::Miss,
                at_ms: action.at_ms,
            });
            events.push(GameEvent::LifeLost {
                at_ms: action.at_ms,
            });
        }
        self.close_round(action.at_ms, events);
    }

    fn verdict(&self) -> Verdict {
        if self.completed < self.tuning.rounds {
            Verdict::Continue
        } else if self.virtuous_answers > 0 {
            Verdict::Success
        } else {
            Verdict::Fail
        }
    }

    fn view(&self) -> GameView {
        let dilemma = self.current().filter(|_| self.awaiting);
        GameView::Reflex {
            round: self.completed,
            dilemma_id: dilemma.map(|d| d.id.clone()),
            options: dilemma.map_or(0, |d| d.options.len()),
            deadline_ms: dilemma.map(|_| self.deadline_ms),
        }
    }
}
