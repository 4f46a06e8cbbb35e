use std::hash::Hasher;

use dojo_game::{GameId, GameTuning, builtin_challenges, compute_belt, dilemma_bank};
use twox_hash::XxHash64;

const TUNING_SNAPSHOT_HASH: u64 = 0x5ef8_b830_36fd_8b66;

#[test]
fn default_tuning_snapshot_stable() {
    let canonical = serde_json::to_string_pretty(&GameTuning::default()).unwrap();
    let digest = snapshot_hash(canonical.as_bytes());
    assert_eq!(
        digest, TUNING_SNAPSHOT_HASH,
        "default tuning snapshot changed\n{canonical}"
    );
}

#[test]
fn shipped_tuning_matches_compiled_defaults() {
    let shipped = GameTuning::load_default();
    assert_eq!(shipped, GameTuning::default());
    shipped.validate().unwrap();
}

#[test]
fn partial_tuning_only_overrides_named_fields() {
    let tuning = GameTuning::from_json(r#"{ "rhythm": { "beats": 4 } }"#).unwrap();
    assert_eq!(tuning.rhythm.beats, 4);
    assert_eq!(tuning.rhythm.beat_interval_ms, 800);
    assert_eq!(tuning.balance, GameTuning::default().balance);
}

#[test]
fn game_ids_round_trip_through_names() {
    for id in GameId::ALL {
        assert_eq!(id.as_str().parse::<GameId>().unwrap(), id);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }
    assert!("karate".parse::<GameId>().is_err());
}

#[test]
fn embedded_content_is_usable() {
    assert!(!builtin_challenges().is_empty());
    assert!(dilemma_bank().len() >= 5);
    assert!(dilemma_bank().iter().all(dojo_game::Dilemma::is_playable));
    assert_eq!(compute_belt(0).name, "white");
}

fn snapshot_hash(bytes: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(bytes);
    hasher.finish()
}
