//! Embedded content: built-in daily challenges and moral-choice dilemmas.

use anyhow::{Context, ensure};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::challenge::{Challenge, ChallengeKind};

const DEFAULT_CHALLENGE_DATA: &str = include_str!("../data/challenges.json");
const DEFAULT_DILEMMA_DATA: &str = include_str!("../data/dilemmas.json");

/// Highest option count a dilemma may offer; options map onto digit keys.
pub const MAX_DILEMMA_OPTIONS: usize = 9;

/// One moral-choice round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dilemma {
    pub id: String,
    pub prompt: String,
    pub options: Vec<String>,
    /// One-based index of the virtuous option.
    pub virtuous: u8,
}

impl Dilemma {
    #[must_use]
    pub fn is_playable(&self) -> bool {
        (2..=MAX_DILEMMA_OPTIONS).contains(&self.options.len())
            && (1..=self.options.len()).contains(&usize::from(self.virtuous))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DilemmaBank {
    #[serde(default)]
    pub dilemmas: Vec<Dilemma>,
}

impl DilemmaBank {
    /// # Errors
    ///
    /// Returns an error if the JSON cannot be parsed into a dilemma bank.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Embedded bank with unplayable entries dropped; never empty.
    #[must_use]
    pub fn load_from_static() -> Self {
        let mut bank = Self::from_json(DEFAULT_DILEMMA_DATA).unwrap_or_else(|err| {
            log::warn!("embedded dilemmas unreadable, using fallback: {err}");
            Self::default()
        });
        bank.dilemmas.retain(|dilemma| {
            let playable = dilemma.is_playable();
            if !playable {
                log::warn!("dropping unplayable dilemma '{}'", dilemma.id);
            }
            playable
        });
        if bank.dilemmas.is_empty() {
            bank.dilemmas.push(fallback_dilemma());
        }
        bank
    }
}

fn fallback_dilemma() -> Dilemma {
    Dilemma {
        id: "fallback-share".to_string(),
        prompt: "A friend forgot their water bottle at practice.".to_string(),
        options: vec![
            "Share yours".to_string(),
            "Tell them it is their problem".to_string(),
        ],
        virtuous: 1,
    }
}

/// Shared embedded dilemmas.
#[must_use]
pub fn dilemma_bank() -> &'static [Dilemma] {
    static BANK: OnceLock<DilemmaBank> = OnceLock::new();
    &BANK.get_or_init(DilemmaBank::load_from_static).dilemmas
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeCatalog {
    #[serde(default)]
    pub challenges: Vec<Challenge>,
}

impl ChallengeCatalog {
    /// # Errors
    ///
    /// Returns an error if the JSON cannot be parsed into a challenge catalog.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    #[must_use]
    pub fn load_from_static() -> Self {
        match Self::from_json(DEFAULT_CHALLENGE_DATA) {
            Ok(catalog) if !catalog.challenges.is_empty() => catalog,
            Ok(_) => Self::fallback(),
            Err(err) => {
                log::warn!("embedded challenges unreadable, using fallback: {err}");
                Self::fallback()
            }
        }
    }

    fn fallback() -> Self {
        Self {
            challenges: vec![Challenge {
                id: "salut".to_string(),
                kind: ChallengeKind::Virtue,
                xp_value: 10,
                requires_guardian_approval: false,
                title: "Perfect bow".to_string(),
                description: "Greet your sensei and partners with a respectful bow.".to_string(),
                icon: "bow".to_string(),
                game: None,
            }],
        }
    }
}

/// Built-in daily challenge set used when the backend and cache are empty.
#[must_use]
pub fn builtin_challenges() -> &'static [Challenge] {
    static CATALOG: OnceLock<ChallengeCatalog> = OnceLock::new();
    &CATALOG.get_or_init(ChallengeCatalog::load_from_static).challenges
}

/// Parse every embedded document strictly, for startup checks.
///
/// # Errors
///
/// Returns the first document that fails to parse or validate.
pub fn check_embedded() -> anyhow::Result<()> {
    let challenges =
        ChallengeCatalog::from_json(DEFAULT_CHALLENGE_DATA).context("parsing challenges.json")?;
    ensure!(
        !challenges.challenges.is_empty(),
        "challenges.json has no challenges"
    );
    let bank = DilemmaBank::from_json(DEFAULT_DILEMMA_DATA).context("parsing dilemmas.json")?;
    if let Some(bad) = bank.dilemmas.iter().find(|dilemma| !dilemma.is_playable()) {
        anyhow::bail!("dilemma '{}' is not playable", bad.id);
    }
    crate::tuning::GameTuning::from_json(crate::tuning::DEFAULT_TUNING_DATA)
        .context("validating tuning.json")?;
    crate::progression::BeltTable::from_json(crate::progression::DEFAULT_BELT_DATA)
        .context("validating belts.json")?;
    Ok(())
}
