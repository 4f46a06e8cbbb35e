use rand::rngs::SmallRng;

use super::{Frame, GameEvent, GameView, MiniGame, Verdict};
use crate::input::{Action, TimedAction};
use crate::numbers::{ms_to_secs, symmetric_draw};
use crate::scoring::{Classify, Tier};
use crate::session::GameId;
use crate::tuning::{BalanceTuning, KiReward};

/// Longest physics substep; late frames are integrated in slices.
const MAX_STEP_MS: u64 = 50;

/// Walk a beam while gusts push the tilt around. Positive tilt leans right;
/// holding MoveLeft or MoveRight shifts weight to that side.
#[derive(Debug, Clone)]
pub struct BalanceGame {
    tuning: BalanceTuning,
    tilt_deg: f32,
    velocity: f32,
    distance_m: f32,
    gust: f32,
    next_gust_ms: u64,
    next_sample_ms: u64,
    falls: u32,
}

impl BalanceGame {
    #[must_use]
    pub fn new(tuning: BalanceTuning) -> Self {
        Self {
            tuning,
            tilt_deg: 0.0,
            velocity: 0.0,
            distance_m: 0.0,
            gust: 0.0,
            next_gust_ms: 0,
            next_sample_ms: 0,
            falls: 0,
        }
    }

    #[must_use]
    pub const fn tilt_deg(&self) -> f32 {
        self.tilt_deg
    }

    #[must_use]
    pub const fn distance_m(&self) -> f32 {
        self.distance_m
    }

    #[must_use]
    pub const fn falls(&self) -> u32 {
        self.falls
    }

    fn integrate(&mut self, dt: f32, control: f32) {
        let t = &self.tuning;
        let accel = self.gust + t.instability * self.tilt_deg + control * t.correction_deg_s2
            - t.damping * self.velocity;
        self.velocity += accel * dt;
        self.tilt_deg += self.velocity * dt;
        self.distance_m += t.walk_speed_mps * dt;
    }
}

impl MiniGame for BalanceGame {
    fn id(&self) -> GameId {
        GameId::Balance
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
        self.tilt_deg = 0.0;
        self.velocity = 0.0;
        self.distance_m = 0.0;
        self.gust = 0.0;
        self.falls = 0;
        self.next_gust_ms = 0;
        self.next_sample_ms = self.tuning.sample_interval_ms;
    }

    fn begin_round(&mut self, at_ms: u64) {
        self.next_gust_ms = at_ms;
        self.next_sample_ms = at_ms.saturating_add(self.tuning.sample_interval_ms);
    }

    fn advance(&mut self, frame: &Frame<'_>, rng: &mut SmallRng, events: &mut Vec<GameEvent>) {
        while self.next_gust_ms <= frame.elapsed_ms {
            self.gust = symmetric_draw(rng, self.tuning.gust_max_deg_s2);
            self.next_gust_ms = self
                .next_gust_ms
                .saturating_add(self.tuning.gust_interval_ms.max(1));
        }

        let mut control = 0.0;
        if frame.holds(Action::MoveLeft) {
            control -= 1.0;
        }
        if frame.holds(Action::MoveRight) {
            control += 1.0;
        }

        let mut remaining = frame.dt_ms;
        while remaining > 0 {
            let step = remaining.min(MAX_STEP_MS);
            remaining -= step;
            self.integrate(ms_to_secs(step), control);
            if !self.tilt_deg.is_finite() || self.tilt_deg.abs() > self.tuning.fall_angle_deg {
                self.tilt_deg = 0.0;
                self.velocity = 0.0;
                self.falls += 1;
                log::debug!("balance fall #{} at {}ms", self.falls, frame.elapsed_ms);
                events.push(GameEvent::Scored {
                    tier: Tier::Miss,
                    at_ms: frame.elapsed_ms,
                });
                events.push(GameEvent::LifeLost {
                    at_ms: frame.elapsed_ms,
                });
            }
        }

        let interval = self.tuning.sample_interval_ms.max(1);
        while self.next_sample_ms <= frame.elapsed_ms {
            let tier = self
                .tuning
                .windows
                .classify(self.tilt_deg)
                .unwrap_or(Tier::Miss);
            events.push(GameEvent::Scored {
                tier,
                at_ms: self.next_sample_ms,
            });
            self.next_sample_ms = self.next_sample_ms.saturating_add(interval);
        }
    }

    fn on_action(&mut self, _action: TimedAction, _events: &mut Vec<GameEvent>) {}

    fn verdict(&self) -> Verdict {
        if self.distance_m >= self.tuning.goal_distance_m {
            Verdict::Success
        } else {
            Verdict::Continue
        }
    }

    fn view(&self) -> GameView {
        GameView::Balance {
            tilt_deg: self.tilt_deg,
            distance_m: self.distance_m,
            goal_m: self.tuning.goal_distance_m,
        }
    }
}
