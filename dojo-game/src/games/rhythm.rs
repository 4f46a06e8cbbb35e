use rand::Rng;
use rand::rngs::SmallRng;

use super::{Frame, GameEvent, GameView, MiniGame, Verdict, passes};
use crate::input::{Action, TimedAction};
use crate::scoring::{Tier, TimedTarget};
use crate::session::GameId;
use crate::tuning::{KiReward, RhythmTuning};

const ACCENT_CHANCE: f64 = 0.25;

/// Press Confirm on each beat. A press is judged against the earliest
/// pending beat; a beat nobody pressed for expires as a miss once it leaves
/// the good window.
#[derive(Debug, Clone)]
pub struct RhythmGame {
    tuning: RhythmTuning,
    beats: Vec<u64>,
    next: usize,
    hits: u32,
}

impl RhythmGame {
    #[must_use]
    pub fn new(tuning: RhythmTuning) -> Self {
        Self {
            tuning,
            beats: Vec::new(),
            next: 0,
            hits: 0,
        }
    }

    #[must_use]
    pub fn beats(&self) -> &[u64] {
        &self.beats
    }

    fn judge(&mut self, tier: Tier, at_ms: u64, events: &mut Vec<GameEvent>) {
        self.next += 1;
        if tier.is_hit() {
            self.hits += 1;
        }
        events.push(GameEvent::Scored { tier, at_ms });
    }

    fn judged(&self) -> u32 {
        u32::try_from(self.next).unwrap_or(u32::MAX)
    }
}

impl MiniGame for RhythmGame {
    fn id(&self) -> GameId {
        GameId::Rhythm
    }

    fn actions(&self) -> Vec<Action> {
        vec![Action::Confirm]
    }

    fn reward(&self) -> KiReward {
        self.tuning.reward
    }

    fn reset(&mut self, rng: &mut SmallRng) {
        self.beats.clear();
        self.next = 0;
        self.hits = 0;
        let mut at = self.tuning.first_beat_ms;
        for _ in 0..self.tuning.beats {
            self.beats.push(at);
            let mut gap = self.tuning.beat_interval_ms;
            if self.tuning.shuffle && rng.gen_bool(ACCENT_CHANCE) {
                gap += self.tuning.beat_interval_ms / 2;
            }
            at = at.saturating_add(gap);
        }
    }

    fn advance(&mut self, frame: &Frame<'_>, _rng: &mut SmallRng, events: &mut Vec<GameEvent>) {
        let windows = self.tuning.windows;
        while let Some(&beat) = self.beats.get(self.next) {
            let target = TimedTarget { at_ms: beat };
            if !windows.expired(target, frame.elapsed_ms) {
                break;
            }
            self.judge(Tier::Miss, beat.saturating_add(windows.good_ms), events);
        }
    }

    fn on_action(&mut self, action: TimedAction, events: &mut Vec<GameEvent>) {
        if action.action != Action::Confirm {
            return;
        }
        let Some(&beat) = self.beats.get(self.next) else {
            return;
        };
        let tier = self
            .tuning
            .windows
            .evaluate(TimedTarget { at_ms: beat }, action.at_ms);
        self.judge(tier, action.at_ms, events);
    }

    fn verdict(&self) -> Verdict {
        if self.next < self.beats.len() {
            return Verdict::Continue;
        }
        if passes(self.hits, self.judged(), self.tuning.pass_pct) {
            Verdict::Success
        } else {
            Verdict::Fail
        }
    }

    fn view(&self) -> GameView {
        GameView::Rhythm {
            next_beat_ms: self.beats.get(self.next).copied(),
            judged: self.judged(),
            total: u32::try_from(self.beats.len()).unwrap_or(u32::MAX),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn game(tuning: RhythmTuning) -> (RhythmGame, SmallRng) {
        let mut rng = SmallRng::seed_from_u64(7);
        let mut game = RhythmGame::new(tuning);
        game.reset(&mut rng);
        (game, rng)
    }

    fn frame(elapsed_ms: u64) -> Frame<'static> {
        Frame {
            elapsed_ms,
            dt_ms: 16,
            held: &[],
        }
    }

    #[test]
    fn straight_beats_follow_the_interval() {
        let (game, _) = game(RhythmTuning::default());
        assert_eq!(game.beats().len(), 12);
        assert_eq!(game.beats()[0], 800);
        assert_eq!(game.beats()[1], 1_600);
        assert_eq!(game.beats()[11], 800 + 11 * 800);
    }

    #[test]
    fn shuffled_gaps_only_stretch() {
        let tuning = RhythmTuning {
            shuffle: true,
            beats: 40,
            ..RhythmTuning::default()
        };
        let (game, _) = game(tuning);
        for pair in game.beats().windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap == 800 || gap == 1_200, "unexpected gap {gap}");
        }
    }

    #[test]
    fn boundary_presses_are_inclusive() {
        let (mut game, _) = game(RhythmTuning::default());
        let mut events = Vec::new();
        game.on_action(TimedAction::new(Action::Confirm, 1_000), &mut events);
        game.on_action(TimedAction::new(Action::Confirm, 2_000), &mut events);
        assert_eq!(
            events,
            vec![
                GameEvent::Scored {
                    tier: Tier::Perfect,
                    at_ms: 1_000
                },
                GameEvent::Scored {
                    tier: Tier::Good,
                    at_ms: 2_000
                },
            ]
        );
    }

    #[test]
    fn unanswered_beats_expire_once() {
        let (mut game, mut rng) = game(RhythmTuning::default());
        let mut events = Vec::new();
        game.advance(&frame(1_200), &mut rng, &mut events);
        assert!(events.is_empty());
        game.advance(&frame(1_201), &mut rng, &mut events);
        assert_eq!(
            events,
            vec![GameEvent::Scored {
                tier: Tier::Miss,
                at_ms: 1_200
            }]
        );
        game.advance(&frame(1_201), &mut rng, &mut events);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn other_actions_are_ignored() {
        let (mut game, _) = game(RhythmTuning::default());
        let mut events = Vec::new();
        game.on_action(TimedAction::new(Action::Inhale, 800), &mut events);
        assert!(events.is_empty());
        assert_eq!(game.verdict(), Verdict::Continue);
    }
}
