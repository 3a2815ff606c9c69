use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use colored::Colorize;
use console::Emoji;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing::{debug, error};

use podsync::{
    Backoff, DEFAULT_ANCHOR, EmbeddedJsonExtractor, FeedsConfig, Ledger, LocalSink, NoopReporter,
    ProgressEvent, ProgressReporter, ReqwestClient, RetryPolicy, SharedProgressReporter,
    SidecarTagger, SyncContext, SyncError, SyncOptions, SyncRun, Tagger, describe_source,
    feed_folder_name, sync_feed,
};

// Emoji with fallback for terminals without Unicode support
static MICROPHONE: Emoji<'_, '_> = Emoji("🎙️  ", "");
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static HEADPHONES: Emoji<'_, '_> = Emoji("🎧 ", "[i] ");
static DOWNLOAD: Emoji<'_, '_> = Emoji("📥 ", "[v] ");
static RETRY: Emoji<'_, '_> = Emoji("🔁 ", "[r] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static BROOM: Emoji<'_, '_> = Emoji("🧹 ", "[-] ");
static PARTY: Emoji<'_, '_> = Emoji("🎉 ", "[*] ");
static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "x ");

const LEDGER_FILE_NAME: &str = ".podsync-ledger.json";

/// Exit status when some episodes were attempted and all of them failed
const EXIT_ALL_FAILED: u8 = 1;
/// Exit status for a fatal error or cancellation
const EXIT_FATAL: u8 = 2;

/// Synchronize podcast feeds into a local archive
#[derive(Parser, Debug)]
#[command(name = "podsync")]
#[command(about = "Synchronize podcast feeds into a local archive, downloading every episode once")]
#[command(version)]
struct Args {
    /// RSS feed URL or path to a local RSS file; with --batch, a JSON file
    /// mapping feed names to feed URLs
    feed: String,

    /// Output directory for downloaded episodes
    output_dir: PathBuf,

    /// Sync every feed listed in FEED into its own subfolder
    #[arg(long)]
    batch: bool,

    /// Store episodes in a subfolder named after this feed
    #[arg(long, conflicts_with = "batch")]
    feed_name: Option<String>,

    /// Ledger file [default: OUTPUT_DIR/.podsync-ledger.json]
    #[arg(long)]
    ledger: Option<PathBuf>,

    /// Maximum number of new episodes to attempt per feed
    #[arg(short, long)]
    limit: Option<usize>,

    /// Seconds to pause between episodes
    #[arg(long, default_value = "1.0", value_parser = parse_seconds)]
    delay: Duration,

    /// Download attempts per episode, the first one included
    #[arg(long, default_value = "3", value_parser = clap::value_parser!(u32).range(1..))]
    retries: u32,

    /// Seconds to wait before the first retry
    #[arg(long, default_value = "2.0", value_parser = parse_seconds)]
    retry_delay: Duration,

    /// How the wait grows between retries
    #[arg(long, value_enum, default_value = "exponential")]
    backoff: BackoffArg,

    /// Give up on a request after this many seconds without data
    #[arg(long, default_value = "60", value_parser = parse_seconds)]
    timeout: Duration,

    /// Token that precedes the embedded episode data on detail pages
    #[arg(long, default_value = DEFAULT_ANCHOR)]
    anchor: String,

    /// Don't write a JSON metadata file next to each episode
    #[arg(long)]
    no_sidecar: bool,

    /// Quiet mode - suppress progress output
    #[arg(short, long)]
    quiet: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackoffArg {
    Fixed,
    Exponential,
}

impl From<BackoffArg> for Backoff {
    fn from(arg: BackoffArg) -> Self {
        match arg {
            BackoffArg::Fixed => Backoff::Fixed,
            BackoffArg::Exponential => Backoff::Exponential,
        }
    }
}

fn parse_seconds(value: &str) -> Result<Duration, String> {
    let seconds: f64 = value
        .parse()
        .map_err(|_| format!("`{value}` is not a number of seconds"))?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(format!("`{value}` must be zero or more seconds"));
    }
    Ok(Duration::from_secs_f64(seconds))
}

/// Progress reporter using indicatif for terminal output
struct IndicatifReporter {
    multi: MultiProgress,
    main_bar: ProgressBar,
    download_bar: Mutex<Option<ProgressBar>>,
}

impl IndicatifReporter {
    fn new() -> Self {
        let multi = MultiProgress::new();

        let main_style = ProgressStyle::default_bar()
            .template("{spinner:.green} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());

        let main_bar = multi.add(ProgressBar::new_spinner());
        main_bar.set_style(main_style);
        main_bar.enable_steady_tick(Duration::from_millis(100));

        Self {
            multi,
            main_bar,
            download_bar: Mutex::new(None),
        }
    }

    fn start_bar(&self, length: Option<u64>, message: String) {
        let style = ProgressStyle::default_bar()
            .template(&format!(
                "  {DOWNLOAD}[{{bar:30.cyan/blue}}] {{bytes}}/{{total_bytes}} {{wide_msg}}"
            ))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");

        let bar = self.multi.add(ProgressBar::new(length.unwrap_or(0)));
        bar.set_style(style);
        bar.set_message(message);

        let mut current = self.lock_bar();
        if let Some(previous) = current.replace(bar) {
            previous.finish_and_clear();
        }
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Some(bar) = self.lock_bar().as_ref() {
            f(bar);
        }
    }

    fn finish_bar(&self) {
        if let Some(bar) = self.lock_bar().take() {
            bar.finish_and_clear();
        }
    }

    fn lock_bar(&self) -> std::sync::MutexGuard<'_, Option<ProgressBar>> {
        self.download_bar
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn println(&self, line: String) {
        // Printing through MultiProgress keeps the bars intact
        let _ = self.multi.println(line);
    }
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::FetchingFeed { source } => {
                self.main_bar.set_message(format!(
                    "{SEARCH}Fetching feed: {}",
                    describe_source(&source).cyan()
                ));
            }

            ProgressEvent::FeedParsed {
                feed_title,
                total_episodes,
            } => {
                self.println(format!(
                    "{HEADPHONES}{} • {} episodes in feed",
                    feed_title.bold().green(),
                    total_episodes.to_string().cyan()
                ));
            }

            ProgressEvent::EpisodeSkipped { title, .. } => {
                self.main_bar
                    .set_message(format!("Already have {}", truncate_title(&title, 50).dimmed()));
            }

            ProgressEvent::ResolvingMedia { title, .. } => {
                self.main_bar.set_message(format!(
                    "{SEARCH}Resolving {}",
                    truncate_title(&title, 50)
                ));
            }

            ProgressEvent::DownloadStarting {
                title,
                attempt,
                content_length,
                ..
            } => {
                let message = if attempt > 1 {
                    format!("{} (attempt {attempt})", truncate_title(&title, 40))
                } else {
                    truncate_title(&title, 40)
                };
                self.start_bar(content_length, message);
            }

            ProgressEvent::DownloadProgress {
                bytes_downloaded,
                total_bytes,
                ..
            } => self.with_bar(|bar| {
                if let Some(total) = total_bytes {
                    bar.set_length(total);
                }
                bar.set_position(bytes_downloaded);
            }),

            ProgressEvent::DownloadRetrying {
                title,
                attempt,
                delay,
                error,
                ..
            } => {
                self.finish_bar();
                self.println(format!(
                    "  {RETRY}{} attempt {attempt} failed ({}), retrying in {:.1}s",
                    truncate_title(&title, 30).yellow(),
                    error.dimmed(),
                    delay.as_secs_f64()
                ));
            }

            ProgressEvent::DownloadCompleted { title, .. } => {
                self.finish_bar();
                self.println(format!("  {SUCCESS}{}", truncate_title(&title, 60).green()));
            }

            ProgressEvent::EpisodeFailed {
                title, kind, error, ..
            } => {
                self.finish_bar();
                self.println(format!(
                    "  {FAILURE}{} [{kind}] {}",
                    truncate_title(&title, 40).red(),
                    error.dimmed()
                ));
            }

            ProgressEvent::PartialFilesCleanedUp { count } => {
                self.println(format!(
                    "{BROOM}Removed {} unfinished download(s) from an earlier run",
                    count.to_string().yellow()
                ));
            }

            ProgressEvent::SyncCompleted {
                succeeded,
                skipped,
                failed,
            } => {
                self.finish_bar();
                self.main_bar.set_message(String::new());
                self.println(format!(
                    "{PARTY}{} {} downloaded, {} skipped, {} failed",
                    "Sync complete:".bold().green(),
                    succeeded.to_string().green().bold(),
                    skipped.to_string().yellow(),
                    if failed > 0 {
                        failed.to_string().red().bold()
                    } else {
                        failed.to_string().green()
                    }
                ));
            }
        }
    }
}

impl Drop for IndicatifReporter {
    fn drop(&mut self) {
        self.main_bar.finish_and_clear();
    }
}

fn truncate_title(title: &str, max_chars: usize) -> String {
    if title.chars().count() <= max_chars {
        title.to_string()
    } else {
        let head: String = title.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{head}...")
    }
}

/// One feed to sync and the directory its episodes go to
struct FeedJob {
    name: Option<String>,
    source: String,
    dir: PathBuf,
    /// Subfolder of the output directory, recorded in ledger locations
    folder: Option<String>,
}

impl FeedJob {
    fn new(output_dir: &Path, name: Option<String>, source: String) -> Self {
        let folder = name.as_deref().map(feed_folder_name);
        let dir = match &folder {
            Some(folder) => output_dir.join(folder),
            None => output_dir.to_path_buf(),
        };
        Self {
            name,
            source,
            dir,
            folder,
        }
    }
}

fn plan_jobs(args: &Args) -> Result<Vec<FeedJob>> {
    if args.batch {
        let config = FeedsConfig::load(Path::new(&args.feed))
            .with_context(|| format!("Failed to load feeds from {}", args.feed))?;

        return Ok(config
            .iter()
            .map(|(name, source)| {
                FeedJob::new(&args.output_dir, Some(name.to_string()), source.to_string())
            })
            .collect());
    }

    Ok(vec![FeedJob::new(
        &args.output_dir,
        args.feed_name.clone(),
        args.feed.clone(),
    )])
}

/// Totals across all feeds of one invocation
#[derive(Default)]
struct Totals {
    succeeded: usize,
    failed: usize,
    fatal: usize,
}

async fn sync_all(args: &Args, reporter: SharedProgressReporter) -> Result<Totals> {
    let client =
        ReqwestClient::with_read_timeout(args.timeout).context("Failed to set up HTTP client")?;
    let extractor = EmbeddedJsonExtractor::new(args.anchor.as_str());
    let options = SyncOptions {
        limit: args.limit,
        delay: args.delay,
        retry: RetryPolicy::new(args.retries, args.retry_delay, args.backoff.into()),
    };
    debug!(?options, "sync options");

    let jobs = plan_jobs(args)?;

    let ledger_path = args
        .ledger
        .clone()
        .unwrap_or_else(|| args.output_dir.join(LEDGER_FILE_NAME));
    let mut ledger = Ledger::open(&ledger_path)
        .with_context(|| format!("Failed to open ledger {}", ledger_path.display()))?;

    let mut totals = Totals::default();

    for job in &jobs {
        if let Some(name) = &job.name
            && jobs.len() > 1
        {
            println!("\n{}", name.bold().magenta());
        }

        let result = sync_job(
            job,
            &client,
            &extractor,
            &mut ledger,
            args.no_sidecar,
            &options,
            &reporter,
        )
        .await;

        match result {
            Ok(run) => {
                if !args.quiet {
                    print_failures(&run);
                }
                totals.succeeded += run.succeeded;
                totals.failed += run.failed;
            }
            Err(SyncError::Ledger(e)) => {
                return Err(e).context("Ledger could not be written");
            }
            Err(e) => {
                error!(feed = %job.source, error = %e, "feed sync failed");
                print_fatal(&format!("Failed to sync {}: {e}", describe_source(&job.source)));
                totals.fatal += 1;
            }
        }
    }

    Ok(totals)
}

/// Open the job's output folder and sync its feed into it
async fn sync_job(
    job: &FeedJob,
    client: &ReqwestClient,
    extractor: &EmbeddedJsonExtractor,
    ledger: &mut Ledger,
    no_sidecar: bool,
    options: &SyncOptions,
    reporter: &SharedProgressReporter,
) -> Result<SyncRun, SyncError> {
    let (sink, cleaned) = LocalSink::open(&job.dir)?;
    let sink = match &job.folder {
        Some(folder) => sink.with_prefix(folder.as_str()),
        None => sink,
    };
    if cleaned > 0 {
        reporter.report(ProgressEvent::PartialFilesCleanedUp { count: cleaned });
    }

    let sidecar = SidecarTagger::new(sink.dir());
    let tagger: Option<&dyn Tagger> = if no_sidecar { None } else { Some(&sidecar) };

    let mut ctx = SyncContext {
        client,
        extractor,
        sink: &sink,
        ledger,
        tagger,
        reporter: reporter.clone(),
    };
    sync_feed(&mut ctx, &job.source, options).await
}

fn print_failures(run: &SyncRun) {
    if run.failures.is_empty() {
        return;
    }

    println!("\n{}", "Failed episodes:".red().bold());
    for failure in &run.failures {
        println!(
            "  {}{} [{}] - {}",
            CROSS,
            failure.identifier.as_deref().unwrap_or("?").yellow(),
            failure.kind,
            failure.message.dimmed()
        );
    }
}

fn print_fatal(message: &str) {
    eprintln!("{FAILURE}{}", message.red());
}

fn init_tracing(args: &Args) {
    // RUST_LOG wins over the verbosity flags
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(&args);
    debug!(?args, "CLI arguments parsed");

    if !args.quiet {
        println!(
            "\n{}{} {}\n",
            MICROPHONE,
            "podsync".bold().magenta(),
            "- Podcast Archiver".dimmed()
        );
    }

    let reporter: SharedProgressReporter = if args.quiet {
        NoopReporter::shared()
    } else {
        Arc::new(IndicatifReporter::new())
    };

    // Dropping the sync future on Ctrl-C discards the in-flight download;
    // nothing uncommitted reaches the ledger.
    let outcome = tokio::select! {
        outcome = sync_all(&args, reporter.clone()) => outcome,
        _ = tokio::signal::ctrl_c() => {
            drop(reporter);
            eprintln!("\n{FAILURE}{}", "Interrupted".red().bold());
            return ExitCode::from(EXIT_FATAL);
        }
    };
    drop(reporter);

    let totals = match outcome {
        Ok(totals) => totals,
        Err(e) => {
            print_fatal(&format!("{e:#}"));
            return ExitCode::from(EXIT_FATAL);
        }
    };

    if !args.quiet {
        println!(
            "\n{FOLDER}Output: {}\n",
            args.output_dir.display().to_string().cyan()
        );
    }

    if totals.fatal > 0 {
        ExitCode::from(EXIT_FATAL)
    } else if totals.failed > 0 && totals.succeeded == 0 {
        ExitCode::from(EXIT_ALL_FAILED)
    } else {
        ExitCode::SUCCESS
    }
}
