mod common;
mod logic;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use dojo_game::GameId;
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;

use common::scenario::{ScenarioOptions, expand_scenarios, get_scenario, list_scenarios};
use common::split_csv;
use logic::{
    GameTester, LogicTester, PlayabilityAggregate, PlayabilityRecord, Skill,
    aggregate_playability, resolve_seed_inputs, run_playability_analysis,
    validate_playability_targets,
};

#[derive(Debug, Parser)]
#[command(name = "dojo-tester", version = "0.1.0")]
#[command(
    about = "Automated QA for the dojo mini-games and challenge flows, driven by deterministic bots"
)]
struct Args {
    /// Scenarios to run (comma-separated, `all` for every scenario)
    #[arg(long, default_value = "smoke")]
    scenarios: String,

    /// List all available scenarios and exit
    #[arg(long)]
    list_scenarios: bool,

    /// Mini-games to exercise (comma-separated, `all` for every game)
    #[arg(long, default_value = "all")]
    games: String,

    /// Bot skill for scenarios that do not pin one
    #[arg(long, value_enum, default_value_t = Skill::Steady)]
    skill: Skill,

    /// Seeds to run (comma-separated decimal or 0x hex, `all` for presets)
    #[arg(long, default_value = "1337")]
    seeds: String,

    /// Number of iterations per scenario and seed
    #[arg(long, default_value_t = 10)]
    iterations: usize,

    /// Run extended acceptance sweeps (forces ≥100 iterations for playability analysis)
    #[arg(long)]
    acceptance: bool,

    /// Output report format
    #[arg(long, default_value = "console")]
    #[arg(value_parser = ["json", "markdown", "console", "csv"])]
    report: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if maybe_list_scenarios(&args)? {
        return Ok(());
    }

    dojo_game::data::check_embedded().context("embedded game data is invalid")?;

    announce_banner();

    let playability_iterations = compute_playability_iterations(&args);
    let start_time = Instant::now();
    let scenarios = expand_scenarios(&split_csv(&args.scenarios));
    let seeds = resolve_seed_inputs(&split_csv(&args.seeds))?;
    let options = ScenarioOptions::new(parse_games(&args.games)?, args.skill);
    let game_tester = GameTester::try_new(args.verbose);
    log::info!(
        "running {} scenarios over {} seeds and {} games",
        scenarios.len(),
        seeds.len(),
        options.games.len()
    );

    let all_results =
        run_logic_scenarios(&args, &scenarios, &seeds, &options, &game_tester).await;

    let (playability_records, playability_aggregates) =
        gather_playability(&args, &game_tester, &options.games, &seeds, playability_iterations);

    write_reports(
        &args,
        &all_results,
        playability_records.as_deref(),
        playability_aggregates.as_deref(),
        start_time,
    )?;

    if let Some(aggregates) = playability_aggregates.as_ref() {
        let record_slice = playability_records.as_deref().unwrap_or(&[]);
        validate_playability_targets(aggregates, record_slice)?;
    }

    if all_results.iter().any(|r| !r.passed) {
        std::process::exit(1);
    }

    Ok(())
}

fn maybe_list_scenarios(args: &Args) -> Result<bool> {
    if !args.list_scenarios {
        return Ok(false);
    }
    let mut output_target = OutputTarget::new(args.output.clone())?;
    writeln!(output_target.writer(), "Available scenarios:")?;
    for (key, description) in list_scenarios() {
        writeln!(output_target.writer(), "  {key:25} - {description}")?;
    }
    output_target.flush_inner()?;
    Ok(true)
}

fn announce_banner() {
    println!("{}", "🥋 Dojo Automated Tester".bright_cyan().bold());
    println!("{}", "================================".cyan());
}

fn compute_playability_iterations(args: &Args) -> usize {
    if args.acceptance {
        if args.iterations < 100 {
            println!(
                "🔁 Acceptance mode enabled: increasing playability iterations from {} to 100",
                args.iterations
            );
        } else {
            println!(
                "🔁 Acceptance mode enabled: using {} playability iterations",
                args.iterations
            );
        }
        args.iterations.max(100)
    } else {
        args.iterations
    }
}

fn parse_games(games_arg: &str) -> Result<Vec<GameId>> {
    let tokens = split_csv(games_arg);
    if tokens.is_empty() || tokens.iter().any(|t| t.eq_ignore_ascii_case("all")) {
        return Ok(GameId::ALL.to_vec());
    }
    let mut games = Vec::new();
    for token in tokens {
        let game = GameId::from_str(&token)?;
        if !games.contains(&game) {
            games.push(game);
        }
    }
    Ok(games)
}

async fn run_logic_scenarios(
    args: &Args,
    scenarios: &[String],
    seeds: &[u64],
    options: &ScenarioOptions,
    game_tester: &GameTester,
) -> Vec<logic::ScenarioResult> {
    let mut results: Vec<logic::ScenarioResult> = Vec::new();

    println!("{}", "🧠 Running Logic Tests".bright_yellow().bold());
    println!("{}", "-".repeat(30).yellow());

    let logic_tester = LogicTester::new(game_tester.clone());

    for scenario_name in scenarios {
        if let Some(scenario) = get_scenario(scenario_name, options) {
            let scenario_results = logic_tester
                .run_scenario(&scenario, seeds, args.iterations)
                .await;
            results.extend(scenario_results);
        } else {
            eprintln!("⚠️  Unknown scenario: {}", scenario_name.yellow());
        }
    }

    results
}

type PlayabilitySummary = (
    Option<Vec<PlayabilityRecord>>,
    Option<Vec<PlayabilityAggregate>>,
);

fn gather_playability(
    args: &Args,
    game_tester: &GameTester,
    games: &[GameId],
    seeds: &[u64],
    playability_iterations: usize,
) -> PlayabilitySummary {
    if !matches!(args.report.as_str(), "console" | "csv") {
        return (None, None);
    }
    let playability = run_playability_analysis(game_tester, games, seeds, playability_iterations);
    let aggregates = aggregate_playability(&playability);
    (Some(playability), Some(aggregates))
}

fn write_reports(
    args: &Args,
    results: &[logic::ScenarioResult],
    playability_records: Option<&[PlayabilityRecord]>,
    playability_aggregates: Option<&[PlayabilityAggregate]>,
    start_time: Instant,
) -> Result<()> {
    let mut output_target = OutputTarget::new(args.output.clone())?;

    match args.report.as_str() {
        "json" => {
            logic::reports::generate_json_report(&mut output_target, results)?;
        }
        "markdown" => {
            if results.is_empty() {
                writeln!(
                    &mut output_target,
                    "# Dojo Logic Test Results\n\n_No scenarios executed._"
                )?;
            } else {
                logic::reports::generate_markdown_report(&mut output_target, results)?;
            }
        }
        "csv" => {
            logic::reports::generate_csv_report(
                &mut output_target,
                playability_records.unwrap_or(&[]),
            )?;
        }
        _ => {
            let duration = start_time.elapsed();
            if results.is_empty() {
                writeln!(&mut output_target, "No logic scenarios executed.")?;
            } else {
                logic::reports::generate_console_report(
                    &mut output_target,
                    results,
                    playability_aggregates.unwrap_or(&[]),
                    duration,
                )?;
            }
            writeln!(&mut output_target)?;
            writeln!(&mut output_target, "🏁 Total time: {duration:?}")?;
        }
    }

    output_target.flush_inner()?;
    Ok(())
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

impl Write for OutputTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_inner()
    }
}
