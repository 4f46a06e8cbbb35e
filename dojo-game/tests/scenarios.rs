use chrono::{TimeZone, Utc};
use dojo_game::{
    Action, Arcade, ChallengeManager, ChallengeStatus, CompletionOutcome, CompletionStatus,
    Evidence, FixedClock, GameId, GamePhase, GameSession, GameTuning, GameView, InputEdge,
    LocalState, ManualTime, MemoryBackend, MemoryStore, PhysicalInput, SessionTuning, Tier,
    TimedAction, build_game, builtin_challenges, compute_belt, dilemma_bank,
};

fn rhythm_session() -> GameSession {
    let tuning = GameTuning::default();
    let mut session = GameSession::new(
        build_game(GameId::Rhythm, &tuning),
        0xD0_5E,
        SessionTuning::from(&tuning),
    );
    assert!(session.start());
    session
}

#[test]
fn rhythm_perfect_then_miss_then_unmultiplied_hit() {
    let mut session = rhythm_session();

    session.tick(850, &[], &[TimedAction::new(Action::Confirm, 850)]);
    let first = session.events()[0];
    assert_eq!(first.tier, Tier::Perfect);
    assert_eq!(first.multiplier, 1);
    assert_eq!(session.streak(), 1);
    assert_eq!(session.score(), 100);

    // 500ms away from the 1600ms beat.
    session.tick(1_100, &[], &[TimedAction::new(Action::Confirm, 1_100)]);
    assert_eq!(session.events()[1].tier, Tier::Miss);
    assert_eq!(session.streak(), 0);
    assert_eq!(session.score(), 100);

    session.tick(2_410, &[], &[TimedAction::new(Action::Confirm, 2_410)]);
    let third = session.events()[2];
    assert_eq!(third.tier, Tier::Perfect);
    assert_eq!(third.multiplier, 1);
    assert_eq!(third.points, 100);
    assert_eq!(session.score(), 200);
}

#[test]
fn perfect_window_boundary_is_inclusive() {
    let mut session = rhythm_session();
    session.tick(1_000, &[], &[TimedAction::new(Action::Confirm, 1_000)]);
    assert_eq!(session.events()[0].tier, Tier::Perfect);
    session.tick(1_801, &[], &[TimedAction::new(Action::Confirm, 1_801)]);
    assert_eq!(session.events()[1].tier, Tier::Good);
}

fn judged(session: &GameSession) -> Vec<(Tier, u64)> {
    session
        .events()
        .iter()
        .map(|event| (event.tier, event.at_ms))
        .collect()
}

#[test]
fn press_inside_window_counts_when_its_frame_is_late() {
    let mut session = rhythm_session();
    session.tick(1_215, &[], &[TimedAction::new(Action::Confirm, 1_199)]);
    assert_eq!(judged(&session), vec![(Tier::Good, 1_199)]);

    // The next beat is untouched by the late delivery.
    session.tick(1_600, &[], &[TimedAction::new(Action::Confirm, 1_600)]);
    assert_eq!(session.events()[1].tier, Tier::Perfect);
    assert_eq!(session.events()[1].multiplier, 2);
}

#[test]
fn arcade_judges_a_coalesced_press_by_its_stamp() {
    let time = ManualTime::new(0);
    let mut arcade = Arcade::new(time.clone(), GameTuning::default());
    let id = arcade.launch(GameId::Rhythm, 42);
    arcade.start(id);
    time.advance(1_199);
    assert_eq!(
        arcade.handle_input(id, PhysicalInput::key("Enter"), InputEdge::Down),
        Some(Action::Confirm)
    );
    time.advance(16);
    assert_eq!(arcade.frame(), 1);

    let session = arcade.session(id).unwrap();
    assert_eq!(judged(session), vec![(Tier::Good, 1_199)]);
}

#[test]
fn reflex_answer_before_deadline_counts_when_its_frame_is_late() {
    let tuning = GameTuning::default();
    let mut session = GameSession::new(
        build_game(GameId::Reflex, &tuning),
        0xD0_5E,
        SessionTuning::from(&tuning),
    );
    assert!(session.start());
    let GameView::Reflex {
        dilemma_id: Some(asked),
        ..
    } = session.view()
    else {
        panic!("reflex starts with a dilemma on screen");
    };
    let virtuous = dilemma_bank()
        .iter()
        .find(|dilemma| dilemma.id == asked)
        .unwrap()
        .virtuous;

    session.tick(8_011, &[], &[TimedAction::new(Action::Choice(virtuous), 7_995)]);
    assert_eq!(judged(&session), vec![(Tier::Good, 7_995)]);
    assert_eq!(session.lives(), Some(3));
    assert!(matches!(session.phase(), GamePhase::Feedback { round: 1, .. }));
}

#[test]
fn restart_after_failure_is_clean() {
    let mut session = rhythm_session();
    session.tick(850, &[], &[TimedAction::new(Action::Confirm, 850)]);
    session.tick(30_000, &[], &[]);
    assert!(matches!(session.phase(), GamePhase::Failed { .. }));
    assert!(session.score() > 0);

    assert!(session.restart());
    assert_eq!(session.elapsed_ms(), 0);
    assert_eq!(session.score(), 0);
    assert_eq!(session.streak(), 0);
    assert!(session.events().is_empty());
}

#[test]
fn torn_down_session_never_scores_again() {
    let time = ManualTime::new(0);
    let mut arcade = Arcade::new(time.clone(), GameTuning::default());
    let id = arcade.launch(GameId::Rhythm, 42);
    arcade.start(id);
    time.advance(790);
    arcade.handle_input(id, PhysicalInput::key("Enter"), InputEdge::Down);
    arcade.exit(id);

    for _ in 0..100 {
        time.advance(16);
        assert_eq!(arcade.frame(), 0);
    }
    assert!(arcade.session(id).is_none());
    assert!(arcade.take_results().is_empty());
}

#[tokio::test]
async fn salut_twice_credits_ten_points_once() {
    let now = Utc.with_ymd_and_hms(2024, 9, 2, 8, 30, 0).unwrap();
    let backend = MemoryBackend::new(builtin_challenges().to_vec()).with_today(now.date_naive());
    let manager = ChallengeManager::new(
        backend.clone(),
        MemoryStore::new(),
        FixedClock::new(now),
        "student-1",
    );

    let first = manager.complete("salut", Evidence::in_person()).await.unwrap();
    let CompletionOutcome::Recorded(record) = first else {
        panic!("first completion should create a record");
    };
    assert_eq!(record.status, CompletionStatus::Confirmed);
    assert_eq!(manager.total_points(), 10);

    let second = manager.complete("salut", Evidence::in_person()).await.unwrap();
    assert_eq!(second, CompletionOutcome::AlreadyCompleted(record));
    assert_eq!(manager.total_points(), 10);
    assert_eq!(backend.total_points("student-1"), 10);
}

#[tokio::test]
async fn guardian_challenge_waits_for_confirmation() {
    let now = Utc.with_ymd_and_hms(2024, 9, 2, 18, 0, 0).unwrap();
    let backend = MemoryBackend::new(builtin_challenges().to_vec()).with_today(now.date_naive());
    let manager = ChallengeManager::new(
        backend.clone(),
        MemoryStore::new(),
        FixedClock::new(now),
        "student-1",
    );

    let outcome = manager
        .complete("home-kata", Evidence::in_person())
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        CompletionOutcome::Recorded(ref record) if record.status == CompletionStatus::PendingValidation
    ));
    assert_eq!(manager.total_points(), 0);

    manager.confirm_validation("home-kata").unwrap();
    manager.confirm_validation("home-kata").unwrap();
    assert_eq!(manager.status("home-kata"), ChallengeStatus::Completed);
    assert_eq!(manager.total_points(), 30);
}

#[tokio::test]
async fn winning_a_game_feeds_a_technique_challenge() {
    let now = Utc.with_ymd_and_hms(2024, 9, 3, 17, 0, 0).unwrap();
    let backend = MemoryBackend::new(builtin_challenges().to_vec()).with_today(now.date_naive());
    let store = MemoryStore::new();
    let manager = ChallengeManager::new(backend, store.clone(), FixedClock::new(now), "student-2");

    let mut session = rhythm_session();
    for beat in 0..12u64 {
        let at = 800 + beat * 800;
        session.tick(at, &[], &[TimedAction::new(Action::Confirm, at + 20)]);
    }
    let result = session.take_result().unwrap();
    assert!(result.is_success());
    assert_eq!(result.ki_earned, 10 + 12);

    let local = LocalState::new(store);
    assert!(local.record_game_result(&result).unwrap());
    assert_eq!(local.offline_ki().unwrap(), 22);

    let outcome = manager
        .complete("rhythm-kata", Evidence::Game(result))
        .await
        .unwrap();
    assert!(matches!(outcome, CompletionOutcome::Recorded(_)));
    assert_eq!(manager.progress().total_points, 15);
}

#[test]
fn belt_boundaries_follow_the_table() {
    assert_eq!(compute_belt(0).rank, 0);
    assert_eq!(compute_belt(199).rank, 0);
    assert_eq!(compute_belt(200).rank, 1);
    assert_eq!(compute_belt(600).rank, 2);
}
