use rand::rngs::SmallRng;

use super::{Frame, GameEvent, GameView, MiniGame, Verdict, passes};
use crate::input::{Action, TimedAction};
use crate::scoring::{Tier, TimedTarget};
use crate::session::GameId;
use crate::tuning::{BreathingTuning, KiReward};

/// Guided breathing: switch between inhale and exhale on each phase
/// boundary. The first boundary asks for an inhale.
#[derive(Debug, Clone)]
pub struct BreathingGame {
    tuning: BreathingTuning,
    boundaries: Vec<u64>,
    next: usize,
    hits: u32,
}

impl BreathingGame {
    #[must_use]
    pub fn new(tuning: BreathingTuning) -> Self {
        Self {
            tuning,
            boundaries: Vec::new(),
            next: 0,
            hits: 0,
        }
    }

    const fn expected_at(index: usize) -> Action {
        if index % 2 == 0 {
            Action::Inhale
        } else {
            Action::Exhale
        }
    }

    fn judge(&mut self, tier: Tier, at_ms: u64, events: &mut Vec<GameEvent>) {
        self.next += 1;
        if tier.is_hit() {
            self.hits += 1;
        }
        events.push(GameEvent::Scored { tier, at_ms });
    }

    fn count(n: usize) -> u32 {
        u32::try_from(n).unwrap_or(u32::MAX)
    }
}

impl MiniGame for BreathingGame {
    fn id(&self) -> GameId {
        GameId::Breathing
    }

    fn actions(&self) -> Vec<Action> {
        vec![Action::Inhale, Action::Exhale]
    }

    fn reward(&self) -> KiReward {
        self.tuning.reward
    }

    fn reset(&mut self, _rng: &mut SmallRng) {
        self.next = 0;
        self.hits = 0;
        let total = self.tuning.cycles.saturating_mul(2);
        self.boundaries = (0..u64::from(total))
            .map(|k| {
                self.tuning
                    .first_boundary_ms
                    .saturating_add(k.saturating_mul(self.tuning.phase_ms))
            })
            .collect();
    }

    fn advance(&mut self, frame: &Frame<'_>, _rng: &mut SmallRng, events: &mut Vec<GameEvent>) {
        let windows = self.tuning.windows;
        while let Some(&boundary) = self.boundaries.get(self.next) {
            if !windows.expired(TimedTarget { at_ms: boundary }, frame.elapsed_ms) {
                break;
            }
            self.judge(Tier::Miss, boundary.saturating_add(windows.good_ms), events);
        }
    }

    fn on_action(&mut self, action: TimedAction, events: &mut Vec<GameEvent>) {
        if !matches!(action.action, Action::Inhale | Action::Exhale) {
            return;
        }
        let Some(&boundary) = self.boundaries.get(self.next) else {
            return;
        };
        let tier = if action.action == Self::expected_at(self.next) {
            self.tuning
                .windows
                .evaluate(TimedTarget { at_ms: boundary }, action.at_ms)
        } else {
            Tier::Miss
        };
        self.judge(tier, action.at_ms, events);
    }

    fn verdict(&self) -> Verdict {
        if self.next < self.boundaries.len() {
            Verdict::Continue
        } else if passes(self.hits, Self::count(self.next), self.tuning.pass_pct) {
            Verdict::Success
        } else {
            Verdict::Fail
        }
    }

    fn view(&self) -> GameView {
        let pending = self.boundaries.get(self.next).copied();
        GameView::Breathing {
            next_boundary_ms: pending,
            expected: pending.map(|_| Self::expected_at(self.next)),
            judged: Self::count(self.next),
            total: Self::count(self.boundaries.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn fresh() -> BreathingGame {
        let mut game = BreathingGame::new(BreathingTuning::default());
        game.reset(&mut SmallRng::seed_from_u64(1));
        game
    }

    fn scored(events: &[GameEvent]) -> Vec<Tier> {
        events
            .iter()
            .filter_map(|event| match event {
                GameEvent::Scored { tier, .. } => Some(*tier),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn alternates_inhale_and_exhale() {
        let mut game = fresh();
        let mut events = Vec::new();
        game.on_action(TimedAction::new(Action::Inhale, 1_100), &mut events);
        game.on_action(TimedAction::new(Action::Exhale, 5_600), &mut events);
        assert_eq!(scored(&events), vec![Tier::Perfect, Tier::Good]);
        assert_eq!(
            game.view(),
            GameView::Breathing {
                next_boundary_ms: Some(9_000),
                expected: Some(Action::Inhale),
                judged: 2,
                total: 10,
            }
        );
    }

    #[test]
    fn wrong_breath_is_a_miss_even_on_time() {
        let mut game = fresh();
        let mut events = Vec::new();
        game.on_action(TimedAction::new(Action::Exhale, 1_000), &mut events);
        assert_eq!(scored(&events), vec![Tier::Miss]);
    }

    #[test]
    fn half_the_boundaries_is_enough() {
        let mut game = fresh();
        let mut events = Vec::new();
        for k in 0..5u64 {
            let at = 1_000 + k * 4_000;
            let action = BreathingGame::expected_at(usize::try_from(k).unwrap());
            game.on_action(TimedAction::new(action, at), &mut events);
        }
        let mut rng = SmallRng::seed_from_u64(1);
        let frame = Frame {
            elapsed_ms: 60_000,
            dt_ms: 16,
            held: &[],
        };
        game.advance(&frame, &mut rng, &mut events);
        assert_eq!(scored(&events).len(), 10);
        assert_eq!(game.verdict(), Verdict::Success);
    }
}
