//! D-Logic CLI - Command-line interface for racer scoring and knowledge tooling

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use dialoguer::{theme::ColorfulTheme, Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::FmtSubscriber;

use dlogic::config::{self, resolve_path, KnowledgeConfig};
use dlogic::data::{parse_file, select_combined, write_jsonl, FanRecord};
use dlogic::engine::tables::stadium_name;
use dlogic::knowledge::{SourceChain, SourceProvider};
use dlogic::{
    Confidence, EngineResponse, KnowledgeEntry, KnowledgeStore, Lookup, ParticipantInput,
    RaceContext, ScoringEngine,
};

#[derive(Parser)]
#[command(name = "dlogic")]
#[command(author, version, about = "Boat racer scoring CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Run in interactive mode
    #[arg(short, long)]
    interactive: bool,

    /// Knowledge JSONL file (default: BOAT_KNOWLEDGE_* settings)
    #[arg(long, global = true)]
    knowledge: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Score and rank the participants of a race
    Score {
        /// Race identifier
        #[arg(long, required_unless_present = "request")]
        race_id: Option<String>,

        /// Race date (YYYY-MM-DD)
        #[arg(short, long)]
        date: Option<String>,

        /// Venue name or stadium code (1-24)
        #[arg(short, long)]
        venue: Option<String>,

        /// Race grade (SG, G1, G2, G3, 一般)
        #[arg(short, long)]
        grade: Option<String>,

        /// Register number or name, in lane order
        #[arg(short, long = "racer", num_args = 1.., required_unless_present = "request")]
        racers: Vec<String>,

        /// JSON request file in the HTTP body shape
        #[arg(long, conflicts_with_all = ["race_id", "racers"])]
        request: Option<PathBuf>,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Show one racer's knowledge entry
    Lookup {
        /// Register number
        #[arg(short, long, required_unless_present = "name")]
        register: Option<String>,

        /// Racer name
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Show knowledge base statistics
    Stats,

    /// Convert fan fixed-width files into knowledge JSONL
    Convert {
        /// Directory of extracted fan .txt files
        #[arg(short, long)]
        input: PathBuf,

        /// Output directory for per-file JSONL
        #[arg(short, long)]
        output: PathBuf,

        /// Also write one combined JSONL file
        #[arg(long)]
        combined: Option<PathBuf>,

        /// Earliest release year kept in the combined file
        #[arg(long)]
        min_year: Option<i32>,

        /// Latest release year kept in the combined file
        #[arg(long)]
        max_year: Option<i32>,
    },
}

/// Request file: race context fields plus participants
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestFile {
    #[serde(flatten)]
    context: RaceContext,
    participants: Vec<ParticipantInput>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    println!(
        "{}",
        format!("D-Logic CLI v{}", env!("CARGO_PKG_VERSION")).cyan().bold()
    );
    println!();

    if cli.interactive {
        run_interactive(cli.knowledge.as_deref())?;
    } else if let Some(command) = cli.command {
        match command {
            Commands::Score {
                race_id,
                date,
                venue,
                grade,
                racers,
                request,
                json,
            } => {
                let (context, participants) = match request {
                    Some(path) => load_request(&path)?,
                    None => {
                        let context = RaceContext {
                            race_date: date,
                            venue,
                            grade,
                            ..RaceContext::new(race_id.unwrap_or_default())
                        };
                        (context, participants_from_args(&racers))
                    }
                };
                let engine = open_engine(cli.knowledge.as_deref())?;
                runtime()?.block_on(score_race(&engine, &context, &participants, json))?;
            }
            Commands::Lookup { register, name } => {
                let engine = open_engine(cli.knowledge.as_deref())?;
                runtime()?.block_on(lookup_racer(&engine, register, name))?;
            }
            Commands::Stats => {
                let engine = open_engine(cli.knowledge.as_deref())?;
                runtime()?.block_on(show_stats(&engine))?;
            }
            Commands::Convert {
                input,
                output,
                combined,
                min_year,
                max_year,
            } => {
                run_convert(&input, &output, combined.as_deref(), min_year, max_year)?;
            }
        }
    } else {
        println!("Use --help for usage information or --interactive for interactive mode.");
    }

    Ok(())
}

/// Logs go to stderr so tables and --json output stay clean
fn init_logging() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config::log_level())
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")
}

/// Engine over either the given file or the configured source chain
fn open_engine(knowledge: Option<&Path>) -> Result<ScoringEngine> {
    let config = KnowledgeConfig::from_env();

    let store = match knowledge {
        Some(path) => {
            let path = resolve_path(path);
            if !path.exists() {
                bail!("Knowledge file not found: {:?}", path);
            }
            let chain = SourceChain::new(vec![SourceProvider::File(path)], config.timeout)?;
            KnowledgeStore::with_sources(chain)
        }
        None => KnowledgeStore::new(config).context("Failed to configure knowledge source")?,
    };

    Ok(ScoringEngine::new(Arc::new(store)))
}

fn load_request(path: &Path) -> Result<(RaceContext, Vec<ParticipantInput>)> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read request file {:?}", path))?;
    let request: RequestFile = serde_json::from_str(&text)
        .with_context(|| format!("Invalid request file {:?}", path))?;
    Ok((request.context, request.participants))
}

/// Digits are register numbers, anything else is a name
///
/// Lanes follow argument order; racers past lane 255 get no lane.
fn participants_from_args(racers: &[String]) -> Vec<ParticipantInput> {
    racers
        .iter()
        .enumerate()
        .map(|(i, racer)| {
            let racer = racer.trim();
            let mut participant =
                if !racer.is_empty() && racer.chars().all(|c| c.is_ascii_digit()) {
                    ParticipantInput::by_register(racer)
                } else {
                    ParticipantInput::by_name(racer)
                };
            participant.lane = u8::try_from(i + 1).ok();
            participant
        })
        .collect()
}

fn load_spinner(message: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(message.to_string());
    Ok(pb)
}

async fn score_race(
    engine: &ScoringEngine,
    context: &RaceContext,
    participants: &[ParticipantInput],
    json: bool,
) -> Result<()> {
    let pb = load_spinner("Loading knowledge...")?;
    let result = engine.run(context, participants).await;
    pb.finish_and_clear();
    let response = result.with_context(|| format!("Failed to score race {}", context.race_id))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    print_response(context, &response);
    Ok(())
}

fn print_response(context: &RaceContext, response: &EngineResponse) {
    let venue = context
        .venue
        .as_deref()
        .map(|v| match v.parse::<u8>().ok().and_then(stadium_name) {
            Some(name) => name.to_string(),
            None => v.to_string(),
        })
        .unwrap_or_else(|| "-".to_string());

    println!(
        "{}: {} / {} / {} / {}",
        "Scoring".green(),
        response.race_id,
        context.race_date.as_deref().unwrap_or("-"),
        venue,
        context.grade.as_deref().unwrap_or("-")
    );
    println!();

    println!("{}", "D-Logic スコア (Scores):".yellow().bold());
    println!(
        "{:>4} {:>4} {:>6} {:<12} {:<6} {:>6} {:>6} {:>5} {:>5} {:>5} {:<6}",
        "順位", "艇番", "登番", "選手名", "支部", "スコア", "基礎", "経験", "時期", "格", "信頼度"
    );
    println!("{}", "-".repeat(80));

    for result in &response.participants {
        let rank = if result.data_available {
            result.rank.to_string()
        } else {
            "-".to_string()
        };
        let line = format!(
            "{:>4} {:>4} {:>6} {:<12} {:<6} {:>6.1} {:>6.1} {:>5.1} {:>5.2} {:>5.2} {:<6}",
            rank,
            result.lane.map(|l| l.to_string()).unwrap_or_default(),
            result.register_number.as_deref().unwrap_or("-"),
            truncate_name(&result.name, 12),
            result.branch.as_deref().unwrap_or("-"),
            result.score,
            result.components.base_score,
            result.components.experience_bonus,
            result.components.recency_multiplier,
            result.components.grade_factor,
            result.confidence.as_str()
        );

        match result.confidence {
            _ if !result.data_available => println!("{}", line.dimmed()),
            Confidence::High if result.rank == 1 => println!("{}", line.green().bold()),
            Confidence::None | Confidence::Low => println!("{}", line.yellow()),
            _ => println!("{}", line),
        }
    }

    let missing: Vec<_> = response
        .participants
        .iter()
        .filter_map(|r| r.missing_reason.as_deref().map(|reason| (&r.name, reason)))
        .collect();
    if !missing.is_empty() {
        println!();
        for (name, reason) in missing {
            println!("{} {}: {}", "!".red(), name, reason);
        }
    }

    println!();
    println!(
        "Knowledge: {} ({} racers)",
        response.knowledge_source, response.metadata.knowledge_size
    );
}

async fn lookup_racer(
    engine: &ScoringEngine,
    register: Option<String>,
    name: Option<String>,
) -> Result<()> {
    let pb = load_spinner("Loading knowledge...")?;
    let index = engine.store().index().await;
    pb.finish_and_clear();
    let index = index.context("Failed to load knowledge")?;

    let lookup = Lookup {
        register_number: register.as_deref(),
        name: name.as_deref(),
    };
    match index.find(lookup) {
        Some(entry) => print_entry(entry),
        None => println!(
            "{}",
            format!(
                "No racer found for {}",
                register.or(name).unwrap_or_default()
            )
            .red()
        ),
    }

    Ok(())
}

fn print_entry(entry: &KnowledgeEntry) {
    println!(
        "{} {} ({})",
        entry.register_number.bold(),
        entry.name_kanji.bold(),
        entry.name_kana
    );
    println!("{:<8} {}", "支部", entry.branch);
    println!("{:<8} {}", "級別", entry.grade);
    if let Some(birthplace) = &entry.birthplace {
        println!("{:<8} {}", "出身", birthplace);
    }
    println!(
        "{:<8} {}{} {}",
        "期",
        entry
            .release_year
            .map(|y| y.to_string())
            .unwrap_or_else(|| "-".to_string()),
        entry
            .release_month
            .map(|m| format!("/{:02}", m))
            .unwrap_or_default(),
        entry.release_term.as_deref().unwrap_or("")
    );
    println!("{:<8} {}", "出典", entry.source);
    println!();

    println!("{}", "Metrics:".yellow().bold());
    println!(
        "  primary   {}/{}  {}",
        entry.primary_available(),
        entry.metrics_primary.len(),
        format_metrics(&entry.metrics_primary)
    );
    println!(
        "  secondary {}/{}  {}",
        entry.secondary_available(),
        entry.metrics_secondary.len(),
        format_metrics(&entry.metrics_secondary)
    );
}

fn format_metrics(values: &[Option<f64>]) -> String {
    values
        .iter()
        .map(|v| match v {
            Some(v) => format!("{:.2}", v),
            None => "-".to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

async fn show_stats(engine: &ScoringEngine) -> Result<()> {
    let pb = load_spinner("Loading knowledge...")?;
    let index = engine.store().index().await;
    pb.finish_and_clear();
    let index = index.context("Failed to load knowledge")?;
    let metadata = &index.metadata;

    println!("{}", "Knowledge Base:".yellow().bold());
    println!("  Source:        {}", metadata.source);
    println!("  Loaded at:     {}", metadata.generated_at);
    println!("  Racers:        {}", metadata.total_entries);
    println!("  Skipped lines: {}", metadata.skipped_lines);
    println!();

    if metadata.releases.is_empty() {
        println!("{}", "No release information.".yellow());
        return Ok(());
    }

    println!("{:>6} {:<6} {:>8}", "年", "期", "件数");
    println!("{}", "-".repeat(24));
    for (year, summary) in &metadata.releases {
        println!(
            "{:>6} {:<6} {:>8}",
            year,
            summary.term.as_deref().unwrap_or("-"),
            summary.count
        );
    }

    Ok(())
}

fn run_convert(
    input_dir: &Path,
    output_dir: &Path,
    combined: Option<&Path>,
    min_year: Option<i32>,
    max_year: Option<i32>,
) -> Result<()> {
    println!(
        "{}: {} -> {}",
        "Converting".green(),
        input_dir.display(),
        output_dir.display()
    );
    println!();

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {:?}", output_dir))?;

    let mut txt_files: Vec<_> = std::fs::read_dir(input_dir)
        .with_context(|| format!("Failed to read directory: {:?}", input_dir))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("txt")))
        .collect();
    txt_files.sort();

    if txt_files.is_empty() {
        println!("{}", "No .txt files found in input directory".yellow());
        return Ok(());
    }

    println!("Found {} files to process", txt_files.len());

    let pb = ProgressBar::new(txt_files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let mut all_records: Vec<FanRecord> = Vec::new();
    let mut failed = 0usize;

    for txt_path in &txt_files {
        let file_name = txt_path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        pb.set_message(file_name.clone());

        match parse_file(txt_path) {
            Ok(records) => {
                let stem = txt_path
                    .file_stem()
                    .unwrap_or_default()
                    .to_string_lossy()
                    .to_string();
                let out_path = output_dir.join(format!("{}.jsonl", stem));
                write_jsonl(&records, &out_path)
                    .with_context(|| format!("Failed to write {:?}", out_path))?;

                pb.println(format!("  {} {} ({} records)", "✓".green(), file_name, records.len()));
                if combined.is_some() {
                    all_records.extend(records);
                }
            }
            Err(e) => {
                failed += 1;
                pb.println(format!("  {} {}: {}", "✗".red(), file_name, e));
            }
        }
        pb.inc(1);
    }

    pb.finish_with_message("done");
    println!();

    if let Some(combined_path) = combined {
        let records = select_combined(all_records, min_year, max_year);
        write_jsonl(&records, combined_path)
            .with_context(|| format!("Failed to write {:?}", combined_path))?;
        println!(
            "{}: {} records -> {}",
            "Combined".green(),
            records.len(),
            combined_path.display()
        );
    }

    println!(
        "Converted {} files ({} failed)",
        txt_files.len() - failed,
        failed
    );

    Ok(())
}

fn run_interactive(knowledge: Option<&Path>) -> Result<()> {
    println!("{}", "Interactive mode".green().bold());
    println!("Type 'quit' to exit.\n");

    let theme = ColorfulTheme::default();
    let rt = runtime()?;
    let engine = open_engine(knowledge)?;

    loop {
        let options = vec!["Score a race", "Look up a racer", "Knowledge stats", "Quit"];

        let selection = Select::with_theme(&theme)
            .with_prompt("What would you like to do?")
            .items(&options)
            .default(0)
            .interact()?;

        match selection {
            0 => {
                // Score
                let race_id: String = Input::with_theme(&theme)
                    .with_prompt("Race ID")
                    .interact_text()?;

                let venue: String = Input::with_theme(&theme)
                    .with_prompt("Venue name or code (blank to skip)")
                    .allow_empty(true)
                    .interact_text()?;

                let grades = ["一般", "G3", "G2", "G1", "SG"];
                let grade = Select::with_theme(&theme)
                    .with_prompt("Grade")
                    .items(&grades)
                    .default(0)
                    .interact()?;

                let racers: String = Input::with_theme(&theme)
                    .with_prompt("Racers in lane order (register numbers or names, comma separated)")
                    .interact_text()?;
                let racers: Vec<String> = racers
                    .split(',')
                    .map(|r| r.trim().to_string())
                    .filter(|r| !r.is_empty())
                    .collect();

                let context = RaceContext {
                    venue: Some(venue.trim().to_string()).filter(|v| !v.is_empty()),
                    grade: Some(grades[grade].to_string()),
                    ..RaceContext::new(race_id)
                };

                println!();
                let participants = participants_from_args(&racers);
                if let Err(e) = rt.block_on(score_race(&engine, &context, &participants, false)) {
                    println!("{} {:#}", "Error:".red(), e);
                }
                println!();
            }
            1 => {
                // Lookup
                let query: String = Input::with_theme(&theme)
                    .with_prompt("Register number or name")
                    .interact_text()?;
                let query = query.trim().to_string();
                let (register, name) = if query.chars().all(|c| c.is_ascii_digit()) {
                    (Some(query), None)
                } else {
                    (None, Some(query))
                };

                println!();
                if let Err(e) = rt.block_on(lookup_racer(&engine, register, name)) {
                    println!("{} {:#}", "Error:".red(), e);
                }
                println!();
            }
            2 => {
                println!();
                if let Err(e) = rt.block_on(show_stats(&engine)) {
                    println!("{} {:#}", "Error:".red(), e);
                }
                println!();
            }
            3 => {
                println!("Goodbye!");
                break;
            }
            _ => {}
        }
    }

    Ok(())
}

/// Truncate name to fit display width
fn truncate_name(name: &str, max_len: usize) -> String {
    let chars: Vec<char> = name.chars().collect();
    if chars.len() <= max_len {
        name.to_string()
    } else {
        chars[..max_len - 1].iter().collect::<String>() + "…"
    }
}
