use anyhow::Result;
use colored::Colorize;
use std::io::Write;
use std::time::Duration;

use super::ScenarioResult;
use super::playability::{PlayabilityAggregate, PlayabilityRecord};

#[allow(clippy::cast_precision_loss)]
fn success_rate(passed: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        passed as f64 / total as f64 * 100.0
    }
}

pub fn generate_console_report<W: Write>(
    writer: &mut W,
    results: &[ScenarioResult],
    aggregates: &[PlayabilityAggregate],
    total_duration: Duration,
) -> Result<()> {
    writeln!(writer)?;
    writeln!(writer, "{}", "📊 Logic Test Results Summary".bright_cyan().bold())?;
    writeln!(writer, "{}", "==============================".cyan())?;

    let total_tests = results.len();
    let passed_tests = results.iter().filter(|r| r.passed).count();
    let failed_tests = total_tests - passed_tests;

    writeln!(writer, "Total scenarios: {total_tests}")?;
    writeln!(writer, "Passed: {}", passed_tests.to_string().green())?;
    writeln!(writer, "Failed: {}", failed_tests.to_string().red())?;
    writeln!(
        writer,
        "Success rate: {:.1}%",
        success_rate(passed_tests, total_tests)
    )?;
    writeln!(writer, "Total time: {total_duration:?}")?;
    writeln!(writer)?;

    for result in results {
        let status = if result.passed {
            "✅ PASS".green()
        } else {
            "❌ FAIL".red()
        };

        writeln!(
            writer,
            "{} {} (seed {})",
            status,
            result.scenario_name.bold(),
            result.seed
        )?;
        writeln!(
            writer,
            "   Iterations: {}/{} successful",
            result.successful_iterations, result.iterations_run
        )?;
        writeln!(writer, "   Average time: {:?}", result.average_duration)?;

        if !result.failures.is_empty() {
            writeln!(writer, "   Failures:")?;
            for failure in &result.failures {
                writeln!(writer, "     • {}", failure.red())?;
            }
        }
        writeln!(writer)?;
    }

    let fastest = results.iter().min_by_key(|r| r.average_duration);
    let slowest = results.iter().max_by_key(|r| r.average_duration);
    if let (Some(fastest), Some(slowest)) = (fastest, slowest) {
        writeln!(writer, "{}", "⚡ Performance Summary".bright_yellow().bold())?;
        writeln!(writer, "{}", "=====================".yellow())?;
        writeln!(
            writer,
            "Fastest: {} ({:?})",
            fastest.scenario_name.green(),
            fastest.average_duration
        )?;
        writeln!(
            writer,
            "Slowest: {} ({:?})",
            slowest.scenario_name.yellow(),
            slowest.average_duration
        )?;
        writeln!(writer)?;
    }

    if !aggregates.is_empty() {
        writeln!(writer, "{}", "🎮 Playability by Game and Skill".bright_magenta().bold())?;
        writeln!(writer, "{}", "================================".magenta())?;
        writeln!(
            writer,
            "{:<10} {:<7} {:>5} {:>8} {:>9} {:>8} {:>7} {:>7}",
            "game", "skill", "runs", "success", "score", "±", "ki", "streak"
        )?;
        for aggregate in aggregates {
            let success = format!("{:.1}%", aggregate.success_pct);
            let success = if aggregate.success_pct >= 100.0 {
                success.green()
            } else if aggregate.success_pct >= 50.0 {
                success.yellow()
            } else {
                success.red()
            };
            writeln!(
                writer,
                "{:<10} {:<7} {:>5} {:>8} {:>9.1} {:>8.1} {:>7.1} {:>7.1}",
                aggregate.game.to_string(),
                aggregate.skill.to_string(),
                aggregate.iterations,
                success,
                aggregate.mean_score,
                aggregate.std_score,
                aggregate.mean_ki,
                aggregate.mean_best_streak
            )?;
        }
    }
    Ok(())
}

pub fn generate_json_report<W: Write>(writer: &mut W, results: &[ScenarioResult]) -> Result<()> {
    serde_json::to_writer_pretty(&mut *writer, results)?;
    writeln!(writer)?;
    Ok(())
}

pub fn generate_markdown_report<W: Write>(
    writer: &mut W,
    results: &[ScenarioResult],
) -> Result<()> {
    writeln!(writer, "# Dojo Logic Test Results\n")?;

    let total_tests = results.len();
    let passed_tests = results.iter().filter(|r| r.passed).count();
    let failed_tests = total_tests - passed_tests;

    writeln!(writer, "## Summary\n")?;
    writeln!(writer, "- **Total scenarios**: {total_tests}")?;
    writeln!(writer, "- **Passed**: {passed_tests}")?;
    writeln!(writer, "- **Failed**: {failed_tests}")?;
    writeln!(
        writer,
        "- **Success rate**: {:.1}%\n",
        success_rate(passed_tests, total_tests)
    )?;

    writeln!(writer, "## Detailed Results\n")?;

    for result in results {
        let status = if result.passed { "✅" } else { "❌" };

        writeln!(
            writer,
            "### {} {} (seed {})\n",
            status, result.scenario_name, result.seed
        )?;
        writeln!(
            writer,
            "- **Iterations**: {}/{} successful",
            result.successful_iterations, result.iterations_run
        )?;
        writeln!(writer, "- **Average time**: {:?}", result.average_duration)?;

        if !result.failures.is_empty() {
            writeln!(writer, "- **Failures**:")?;
            for failure in &result.failures {
                writeln!(writer, "  - {failure}")?;
            }
        }
        writeln!(writer)?;
    }
    Ok(())
}

const CSV_HEADER: &str = "game,skill,seed,outcome,score,ki_earned,perfect,good,miss,best_streak,duration_ms,frames";

/// One row per bot run; every field is numeric or a fixed identifier so
/// nothing needs quoting.
pub fn generate_csv_report<W: Write>(writer: &mut W, records: &[PlayabilityRecord]) -> Result<()> {
    writeln!(writer, "{CSV_HEADER}")?;
    for record in records {
        let outcome = match record.outcome {
            Some(dojo_game::Outcome::Success) => "success",
            Some(dojo_game::Outcome::Fail) => "fail",
            None => "unfinished",
        };
        writeln!(
            writer,
            "{},{},{},{},{},{},{},{},{},{},{},{}",
            record.game,
            record.skill.label().to_ascii_lowercase(),
            record.seed,
            outcome,
            record.score,
            record.ki_earned,
            record.perfect,
            record.good,
            record.miss,
            record.best_streak,
            record.duration_ms,
            record.frames
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::playability::aggregate_playability;
    use crate::logic::policy::Skill;
    use dojo_game::{GameId, Outcome};

    fn result(name: &str, passed: bool, millis: u64) -> ScenarioResult {
        ScenarioResult {
            scenario_name: name.to_string(),
            seed: 1337,
            passed,
            iterations_run: 2,
            successful_iterations: usize::from(passed) * 2,
            failures: if passed {
                Vec::new()
            } else {
                vec!["Iteration 1 (seed 1337): rhythm [beat]: boom".to_string()]
            },
            average_duration: Duration::from_millis(millis),
            performance_data: vec![Duration::from_millis(millis)],
        }
    }

    fn record(outcome: Option<Outcome>) -> PlayabilityRecord {
        PlayabilityRecord {
            game: GameId::Breathing,
            skill: Skill::Steady,
            seed: 9,
            outcome,
            score: 800,
            ki_earned: 12,
            perfect: 6,
            good: 2,
            miss: 0,
            best_streak: 8,
            duration_ms: 40_000,
            frames: 2_500,
        }
    }

    fn render<F>(f: F) -> String
    where
        F: FnOnce(&mut Vec<u8>) -> Result<()>,
    {
        let mut buffer = Vec::new();
        f(&mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn console_report_lists_failures_and_extremes() {
        colored::control::set_override(false);
        let results = vec![result("Smoke Test", true, 5), result("Day Rollover", false, 9)];
        let aggregates = aggregate_playability(&[record(Some(Outcome::Success))]);
        let text = render(|w| {
            generate_console_report(w, &results, &aggregates, Duration::from_secs(1))
        });
        assert!(text.contains("Success rate: 50.0%"));
        assert!(text.contains("• Iteration 1 (seed 1337)"));
        assert!(text.contains("Fastest: Smoke Test"));
        assert!(text.contains("Slowest: Day Rollover"));
        assert!(text.contains("breathing"));
    }

    #[test]
    fn console_report_handles_no_results() {
        let text = render(|w| generate_console_report(w, &[], &[], Duration::ZERO));
        assert!(text.contains("Success rate: 0.0%"));
        assert!(!text.contains("Performance Summary"));
    }

    #[test]
    fn json_report_is_parseable() {
        let results = vec![result("Smoke Test", true, 5)];
        let text = render(|w| generate_json_report(w, &results));
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed[0]["scenario_name"], "Smoke Test");
        assert_eq!(parsed[0]["average_duration"], 5);
    }

    #[test]
    fn markdown_report_has_sections() {
        let results = vec![result("Offline Fallback", false, 3)];
        let text = render(|w| generate_markdown_report(w, &results));
        assert!(text.starts_with("# Dojo Logic Test Results"));
        assert!(text.contains("### ❌ Offline Fallback (seed 1337)"));
        assert!(text.contains("  - Iteration 1"));
    }

    #[test]
    fn csv_report_has_header_and_rows() {
        let records = vec![record(Some(Outcome::Success)), record(None)];
        let text = render(|w| generate_csv_report(w, &records));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(
            lines[1],
            "breathing,steady,9,success,800,12,6,2,0,8,40000,2500"
        );
        assert!(lines[2].contains(",unfinished,"));
    }
}
