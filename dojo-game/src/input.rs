//! Raw device input to logical game actions.
//!
//! Keyboard and touch events funnel through one [`InputMapper`]. Per tick the
//! mapper hands out at most one [`TimedAction`] per logical action, so two
//! devices bound to the same action can never double count within a tick.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet};

/// Logical action vocabulary shared by every mini-game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    MoveLeft,
    MoveRight,
    Confirm,
    Inhale,
    Exhale,
    /// One-based option number in a choice round.
    Choice(u8),
}

/// Touch-screen buttons rendered by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TouchButton {
    Left,
    Right,
    Confirm,
    Inhale,
    Exhale,
    Option(u8),
}

/// A physical input that can be bound to an action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PhysicalInput {
    /// `KeyboardEvent.code`, e.g. `ArrowLeft`, `KeyA`, `Digit2`.
    Key(String),
    Touch(TouchButton),
}

impl PhysicalInput {
    #[must_use]
    pub fn key(code: &str) -> Self {
        Self::Key(code.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InputEdge {
    Down,
    Up,
}

/// Raw device event, timestamped in session milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawInput {
    pub input: PhysicalInput,
    pub edge: InputEdge,
    pub at_ms: u64,
}

/// Logical action stamped with the session time it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedAction {
    pub action: Action,
    pub at_ms: u64,
}

impl TimedAction {
    #[must_use]
    pub const fn new(action: Action, at_ms: u64) -> Self {
        Self { action, at_ms }
    }
}

/// Actions currently held down.
pub type HeldActions = SmallVec<[Action; 4]>;

// Centralized numeric keyboard mapping
// Returns Some(0..=9) if the string is a number key; None otherwise
#[must_use]
pub fn numeric_key_to_index(key: &str) -> Option<u8> {
    let mut chars = key.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => c.to_digit(10).and_then(|d| u8::try_from(d).ok()),
        _ => None,
    }
}

// Parses KeyboardEvent.code such as "Digit3" or "Numpad5"
#[must_use]
pub fn numeric_code_to_index(code: &str) -> Option<u8> {
    let digit = code
        .strip_prefix("Digit")
        .or_else(|| code.strip_prefix("Numpad"))?;
    numeric_key_to_index(digit)
}

/// Default physical bindings for an action: arrows and WASD share moves,
/// touch buttons mirror every action.
#[must_use]
pub fn default_bindings(action: Action) -> Vec<PhysicalInput> {
    match action {
        Action::MoveLeft => vec![
            PhysicalInput::key("ArrowLeft"),
            PhysicalInput::key("KeyA"),
            PhysicalInput::Touch(TouchButton::Left),
        ],
        Action::MoveRight => vec![
            PhysicalInput::key("ArrowRight"),
            PhysicalInput::key("KeyD"),
            PhysicalInput::Touch(TouchButton::Right),
        ],
        Action::Confirm => vec![
            PhysicalInput::key("Space"),
            PhysicalInput::key("Enter"),
            PhysicalInput::Touch(TouchButton::Confirm),
        ],
        Action::Inhale => vec![
            PhysicalInput::key("ArrowUp"),
            PhysicalInput::key("KeyW"),
            PhysicalInput::Touch(TouchButton::Inhale),
        ],
        Action::Exhale => vec![
            PhysicalInput::key("ArrowDown"),
            PhysicalInput::key("KeyS"),
            PhysicalInput::Touch(TouchButton::Exhale),
        ],
        Action::Choice(n) => vec![
            PhysicalInput::Key(format!("Digit{n}")),
            PhysicalInput::Touch(TouchButton::Option(n)),
        ],
    }
}

/// Maps physical events onto logical actions for one active game.
#[derive(Debug, Clone, Default)]
pub struct InputMapper {
    bindings: HashMap<PhysicalInput, Action>,
    pressed: HashSet<PhysicalInput>,
    queue: SmallVec<[TimedAction; 8]>,
    accepting: bool,
}

impl InputMapper {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mapper with the default bindings for every listed action.
    #[must_use]
    pub fn with_defaults(actions: &[Action]) -> Self {
        let mut mapper = Self::new();
        for action in actions {
            for input in default_bindings(*action) {
                mapper.register_binding(input, *action);
            }
        }
        mapper
    }

    /// Bind a physical input, returning the action it was previously bound to.
    pub fn register_binding(&mut self, input: PhysicalInput, action: Action) -> Option<Action> {
        self.bindings.insert(input, action)
    }

    pub fn unregister_binding(&mut self, input: &PhysicalInput) -> Option<Action> {
        self.pressed.remove(input);
        self.bindings.remove(input)
    }

    /// Drop every binding and any queued or held input.
    pub fn unregister_all(&mut self) {
        self.bindings.clear();
        self.pressed.clear();
        self.queue.clear();
        self.accepting = false;
    }

    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// Gate dispatch; while closed every event is dropped without error.
    pub fn set_accepting(&mut self, accepting: bool) {
        self.accepting = accepting;
        if !accepting {
            self.queue.clear();
            self.pressed.clear();
        }
    }

    #[must_use]
    pub const fn is_accepting(&self) -> bool {
        self.accepting
    }

    fn resolve(&self, input: &PhysicalInput) -> Option<Action> {
        if let Some(action) = self.bindings.get(input) {
            return Some(*action);
        }
        // Numpad and digit-row codes resolve to the same option when choices are bound.
        if let PhysicalInput::Key(code) = input
            && let Some(n) = numeric_code_to_index(code)
            && self.bindings.values().any(|bound| *bound == Action::Choice(n))
        {
            return Some(Action::Choice(n));
        }
        None
    }

    /// Feed one raw event. Returns the action queued for a press, if any.
    pub fn handle(&mut self, event: RawInput) -> Option<Action> {
        if !self.accepting {
            return None;
        }
        let action = self.resolve(&event.input)?;
        match event.edge {
            InputEdge::Down => {
                // Auto-repeat of a key already down is not a new press.
                if !self.pressed.insert(event.input) {
                    return None;
                }
                self.queue.push(TimedAction::new(action, event.at_ms));
                Some(action)
            }
            InputEdge::Up => {
                self.pressed.remove(&event.input);
                None
            }
        }
    }

    /// Whether any physical input bound to `action` is down.
    #[must_use]
    pub fn is_held(&self, action: Action) -> bool {
        self.pressed
            .iter()
            .any(|input| self.resolve(input) == Some(action))
    }

    #[must_use]
    pub fn held_actions(&self) -> HeldActions {
        let mut held: HeldActions = self
            .pressed
            .iter()
            .filter_map(|input| self.resolve(input))
            .collect();
        held.sort_unstable();
        held.dedup();
        held
    }

    /// The single dispatch point: this tick's presses, one per action,
    /// earliest timestamp first.
    pub fn drain_tick(&mut self) -> SmallVec<[TimedAction; 4]> {
        let mut actions: SmallVec<[TimedAction; 4]> = SmallVec::new();
        for pending in self.queue.drain(..) {
            match actions.iter_mut().find(|seen| seen.action == pending.action) {
                Some(seen) => seen.at_ms = seen.at_ms.min(pending.at_ms),
                None => actions.push(pending),
            }
        }
        actions.sort_by_key(|timed| timed.at_ms);
        actions
    }
}
