use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use threadreel::budget::{BudgetAllocator, BudgetPolicy};
use threadreel::pipeline::{Collaborators, TimelineAssembler};
use threadreel::services::{
    ContentRewriter, GoogleTts, OpenAiRewriter, RedditSource, WhisperTimer,
};
use threadreel::{
    AppConfig, FfmpegRenderer, FfprobeProbe, GenerationLoop, RunOutcome, ThreadParser,
    UsedThreadLedger,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "threadreel")]
#[command(
    about = "Turns discussion threads into short narrated vertical videos",
    long_about = None
)]
struct Cli {
    /// Configuration file (defaults to threadreel.toml when present)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch threads and produce videos until the target count is reached
    Run {
        /// Number of videos to produce
        #[arg(short, long)]
        count: Option<usize>,
    },
    /// Produce one video from a local thread file
    Render {
        /// Thread JSON file
        #[arg(value_name = "THREAD_JSON")]
        thread: PathBuf,

        /// Output video path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Narrate the thread as written
        #[arg(long)]
        no_rewrite: bool,

        /// Seed for asset selection
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Show how segment durations would be packed under the duration budget
    Budget {
        /// Comment segment durations in seconds, in narration order
        #[arg(value_name = "DURATIONS", required = true)]
        durations: Vec<f64>,

        /// Title segment duration in seconds
        #[arg(long)]
        title: Option<f64>,

        /// Transition length in seconds
        #[arg(long, default_value_t = 0.0)]
        transition: f64,

        /// Minimum total duration
        #[arg(long)]
        min: Option<f64>,

        /// Maximum total duration
        #[arg(long)]
        max: Option<f64>,
    },
    /// Print the effective configuration as TOML
    Config,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config =
        AppConfig::load_from(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Config => {
            print!("{}", config.to_toml().context("Failed to serialize configuration")?);
        }
        Commands::Budget {
            durations,
            title,
            transition,
            min,
            max,
        } => {
            if let Some(min) = min {
                config.budget.min_duration = min;
            }
            if let Some(max) = max {
                config.budget.max_duration = max;
            }
            print_budget(&config, title, durations, transition);
        }
        Commands::Render {
            thread,
            output,
            no_rewrite,
            seed,
        } => {
            if seed.is_some() {
                config.assets.seed = seed;
            }
            println!("🎬 threadreel: rendering {}\n", thread.display());
            let content = ThreadParser::parse_json(&thread)?;
            println!("📋 Thread Summary:");
            println!("{}", ThreadParser::summarize(&content));

            let rewriter = if no_rewrite {
                None
            } else {
                Some(OpenAiRewriter::new(&config.services)?)
            };
            let rewriter = rewriter.as_ref().map(|r| r as &dyn ContentRewriter);
            let outcome = with_loop(&config, rewriter, |runner| runner.produce(content, output))?;
            report_outcome(&outcome);
            if !outcome.is_produced() {
                std::process::exit(1);
            }
        }
        Commands::Run { count } => {
            let target = count.unwrap_or(config.output.target_videos);
            println!("🎬 threadreel: producing {} video(s)\n", target);

            let rewriter = OpenAiRewriter::new(&config.services)?;
            let mut source =
                RedditSource::new(&config.services, &config.content, config.assets.seed)?;
            let summary =
                with_loop(&config, Some(&rewriter), |runner| runner.run(&mut source, target))?;

            println!("\n📊 Run Summary:");
            println!("  Attempts: {}", summary.attempts);
            println!("  Produced: {}", summary.produced.len());
            for path in &summary.produced {
                println!("    ✓ {}", path.display());
            }
            println!("  Skipped:  {}", summary.skipped);
            println!("  Failed:   {}", summary.failed);
        }
    }

    Ok(())
}

/// Wire the production collaborators into a generation loop and hand it to `f`.
fn with_loop<T>(
    config: &AppConfig,
    rewriter: Option<&dyn ContentRewriter>,
    f: impl FnOnce(&mut GenerationLoop<'_>) -> T,
) -> Result<T> {
    let synthesizer = GoogleTts::new(&config.services)?;
    let timer = WhisperTimer::new(&config.services)?;
    let probe = FfprobeProbe;
    let renderer = FfmpegRenderer::new(config.video.clone());
    if !FfmpegRenderer::is_available() {
        println!("⚠️  ffmpeg not found on PATH, rendering will fail");
    }

    let assembler = TimelineAssembler::new(
        config,
        Collaborators {
            synthesizer: &synthesizer,
            timer: &timer,
            probe: &probe,
            renderer: &renderer,
        },
    );
    let ledger = UsedThreadLedger::open(&config.output.ledger)?;
    let mut runner = GenerationLoop::new(config, assembler, rewriter, ledger);
    Ok(f(&mut runner))
}

fn report_outcome(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Produced(path) => println!("\n✅ Video created: {}", path.display()),
        RunOutcome::Skipped(reason) => println!("\n⏭️  Skipped: {}", reason),
        RunOutcome::Failed(reason) => eprintln!("\n❌ Failed: {}", reason),
    }
}

fn print_budget(config: &AppConfig, title: Option<f64>, durations: Vec<f64>, transition: f64) {
    let policy = BudgetPolicy::new(&config.budget, transition);
    let allocator = BudgetAllocator::new(policy);
    let allocation = allocator.allocate(title, durations);

    println!(
        "⏱️  Budget: {:.2}s to {:.2}s, transition {:.2}s\n",
        policy.min_duration, policy.max_duration, policy.transition
    );
    if let Some(slot) = &allocation.title {
        println!("  title      offset {:>7.2}s  length {:>6.2}s", slot.offset, slot.segment);
    }
    for slot in &allocation.slots {
        println!(
            "  comment {:<2} offset {:>7.2}s  length {:>6.2}s",
            slot.color_index, slot.offset, slot.segment
        );
    }
    let totals: Vec<String> = allocation
        .running_totals
        .iter()
        .map(|t| format!("{:.2}", t))
        .collect();
    println!("\n  Running totals: [{}]", totals.join(", "));
    println!("  Total: {:.2}s", allocation.total);
    println!("  Dropped: {}", allocation.dropped);

    match allocation.check(&policy) {
        Ok(()) => println!("\n✅ Accepted"),
        Err(e) => println!("\n❌ Rejected: {}", e),
    }
}
