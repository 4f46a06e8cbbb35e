//! Invariants every bot run must satisfy, whatever the bot's skill.

use anyhow::{Context, Result, ensure};
use dojo_game::Tier;

use crate::logic::game_tester::GameRun;

pub fn finished(run: &GameRun) -> Result<()> {
    ensure!(
        run.result.is_some(),
        "run did not end within {} frames",
        run.frames
    );
    Ok(())
}

/// The result's score and tier counts are exactly what its events add up to.
pub fn ledger_consistent(run: &GameRun) -> Result<()> {
    let Some(result) = &run.result else {
        return Ok(());
    };
    let total: u64 = run.events.iter().map(|event| event.points).sum();
    ensure!(
        total == result.score,
        "score {} but events sum to {total}",
        result.score
    );
    let count = |tier: Tier| {
        u32::try_from(run.events.iter().filter(|e| e.tier == tier).count()).unwrap_or(u32::MAX)
    };
    ensure!(
        (count(Tier::Perfect), count(Tier::Good), count(Tier::Miss))
            == (result.perfect_count, result.good_count, result.miss_count),
        "tier counts disagree with the event log"
    );
    let best = run
        .events
        .iter()
        .map(|event| event.streak_after)
        .max()
        .unwrap_or(0);
    ensure!(
        best == result.best_streak,
        "best streak {} but events peak at {best}",
        result.best_streak
    );
    Ok(())
}

/// Each event's multiplier is one plus the streak before it, a miss resets
/// the streak and earns nothing.
pub fn combo_rule(run: &GameRun) -> Result<()> {
    let mut streak = 0u32;
    for event in &run.events {
        ensure!(
            event.multiplier == streak + 1,
            "event {} multiplier {} after streak {streak}",
            event.seq,
            event.multiplier
        );
        ensure!(
            event.points == u64::from(event.base_points) * u64::from(event.multiplier),
            "event {} points {} != {} x {}",
            event.seq,
            event.points,
            event.base_points,
            event.multiplier
        );
        let expected = if event.tier.is_hit() { streak + 1 } else { 0 };
        ensure!(
            event.streak_after == expected,
            "event {} streak {} expected {expected}",
            event.seq,
            event.streak_after
        );
        if !event.tier.is_hit() {
            ensure!(event.points == 0, "miss {} scored {}", event.seq, event.points);
        }
        streak = event.streak_after;
    }
    Ok(())
}

/// Ki only comes from successful runs.
pub fn no_ki_on_fail(run: &GameRun) -> Result<()> {
    if let Some(result) = &run.result
        && !result.is_success()
    {
        ensure!(
            result.ki_earned == 0,
            "failed run earned {} Ki",
            result.ki_earned
        );
    }
    Ok(())
}

/// Exit leaves nothing behind: no session, no frame subscription, no tick.
pub fn clean_teardown(run: &GameRun) -> Result<()> {
    ensure!(run.leaked_sessions == 0, "{} sessions leaked", run.leaked_sessions);
    ensure!(
        run.leaked_subscriptions == 0,
        "{} frame subscriptions leaked",
        run.leaked_subscriptions
    );
    ensure!(
        run.ticks_after_exit == 0,
        "{} ticks after exit",
        run.ticks_after_exit
    );
    Ok(())
}

pub fn mastered(run: &GameRun) -> Result<()> {
    let result = run.result.as_ref().context("no result")?;
    ensure!(result.is_success(), "expected success, got {:?}", result.outcome);
    ensure!(result.ki_earned > 0, "successful run earned no Ki");
    Ok(())
}

pub fn deterministic(run: &GameRun) -> Result<()> {
    let replay = run.replay.as_ref().context("run was not replayed")?;
    ensure!(
        *replay == run.result,
        "same seed produced {replay:?} then {:?}",
        run.result
    );
    Ok(())
}

pub fn restart_clean(run: &GameRun) -> Result<()> {
    let snapshot = run.restart.context("session was not restarted")?;
    ensure!(snapshot.is_clean(), "restart left state behind: {snapshot:?}");
    ensure!(
        snapshot.attempt == 1,
        "restart should be attempt 1, got {}",
        snapshot.attempt
    );
    Ok(())
}
