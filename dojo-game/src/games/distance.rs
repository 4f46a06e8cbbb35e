use rand::Rng;
use rand::rngs::SmallRng;

use super::{Frame, GameEvent, GameView, MiniGame, Verdict};
use crate::input::{Action, TimedAction};
use crate::numbers::ms_to_secs;
use crate::scoring::DistanceBand;
use crate::session::GameId;
use crate::tuning::{DistanceTuning, KiReward};

/// Keep sparring distance from an opponent who drifts in and out until the
/// timer runs down. MoveLeft retreats, MoveRight steps in.
#[derive(Debug, Clone)]
pub struct DistanceGame {
    tuning: DistanceTuning,
    distance: f32,
    opponent_speed: f32,
    next_change_ms: u64,
    next_sample_ms: u64,
    ends_ms: u64,
    now_ms: u64,
}

impl DistanceGame {
    #[must_use]
    pub fn new(tuning: DistanceTuning) -> Self {
        let distance = tuning.start_distance;
        Self {
            tuning,
            distance,
            opponent_speed: 0.0,
            next_change_ms: 0,
            next_sample_ms: 0,
            ends_ms: 0,
            now_ms: 0,
        }
    }

    #[must_use]
    pub const fn distance(&self) -> f32 {
        self.distance
    }

    fn draw_speed(&self, rng: &mut SmallRng) -> f32 {
        let (min, max) = (self.tuning.opponent_min_speed, self.tuning.opponent_max_speed);
        if min < max { rng.gen_range(min..=max) } else { min }
    }
}

impl MiniGame for DistanceGame {
    fn id(&self) -> GameId {
        GameId::Distance
    }

    fn actions(&self) -> Vec<Action> {
        vec![Action::MoveLeft, Action::MoveRight]
    }

    fn lives(&self) -> Option<u8> {
        Some(self.tuning.lives)
    }

    fn reward(&self) -> KiReward {
        self.tuning.reward
    }

    fn reset(&mut self, _rng: &mut SmallRng) {
        self.distance = self.tuning.start_distance;
        self.opponent_speed = 0.0;
        self.now_ms = 0;
        self.begin_round(0);
    }

    fn begin_round(&mut self, at_ms: u64) {
        self.next_change_ms = at_ms;
        self.next_sample_ms = at_ms.saturating_add(self.tuning.sample_interval_ms);
        self.ends_ms = at_ms.saturating_add(self.tuning.duration_ms);
    }

    fn advance(&mut self, frame: &Frame<'_>, rng: &mut SmallRng, events: &mut Vec<GameEvent>) {
        self.now_ms = frame.elapsed_ms;
        while self.next_change_ms <= frame.elapsed_ms {
            self.opponent_speed = self.draw_speed(rng);
            self.next_change_ms = self
                .next_change_ms
                .saturating_add(self.tuning.opponent_change_ms.max(1));
        }

        let mut player = 0.0;
        if frame.holds(Action::MoveLeft) {
            player += self.tuning.player_speed;
        }
        if frame.holds(Action::MoveRight) {
            player -= self.tuning.player_speed;
        }
        let dt = ms_to_secs(frame.dt_ms);
        self.distance = (self.distance + (player - self.opponent_speed) * dt)
            .clamp(0.0, self.tuning.max_distance);

        let interval = self.tuning.sample_interval_ms.max(1);
        while self.next_sample_ms <= frame.elapsed_ms.min(self.ends_ms) {
            let at_ms = self.next_sample_ms;
            self.next_sample_ms = self.next_sample_ms.saturating_add(interval);
            let band = self.tuning.bands.band(self.distance);
            let Some(tier) = band.tier() else {
                continue;
            };
            events.push(GameEvent::Scored { tier, at_ms });
            if band == DistanceBand::Danger {
                events.push(GameEvent::LifeLost { at_ms });
                self.distance = self.tuning.start_distance;
                log::debug!("distance: opponent closed in at {at_ms}ms");
            }
        }
    }

    fn on_action(&mut self, _action: TimedAction, _events: &mut Vec<GameEvent>) {}

    fn verdict(&self) -> Verdict {
        if self.now_ms >= self.ends_ms {
            Verdict::Success
        } else {
            Verdict::Continue
        }
    }

    fn view(&self) -> GameView {
        GameView::Distance {
            distance: self.distance,
            remaining_ms: self.ends_ms.saturating_sub(self.now_ms),
        }
    }
}
