// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use colored::Colorize;
use std::io::IsTerminal;
use std::path::PathBuf;

use tubegrab::config::{self, Config};
use tubegrab::download::{
    null_sink, stdout_sink, DownloadManager, DownloadOptions, DownloadReport, HttpTransport, ReqwestTransport,
    TransferTarget,
};
use tubegrab::error::{download_report, metadata_report, postprocess_notice};
use tubegrab::postprocess;
use tubegrab::utils::{abbr, format_duration};
use tubegrab::video::{MetadataError, Video, VideoClient};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Exit codes following sysexits.h conventions
mod exit_codes {
    /// Success - operation completed successfully
    pub const SUCCESS: i32 = 0;
    /// General error - the transfer failed
    pub const ERROR: i32 = 1;
    /// Usage error - bad video id or unknown itag
    pub const USAGE: i32 = 64;
    /// Service unavailable - metadata could not be obtained
    pub const SERVICE_UNAVAILABLE: i32 = 69;
    /// Interrupted by Ctrl+C
    pub const INTERRUPTED: i32 = 130;
}

use exit_codes::*;

/// Spinner helpers for consistent progress indicators
mod spinner {
    use colored::Colorize;
    use indicatif::{ProgressBar, ProgressStyle};
    use std::time::Duration;

    /// Create a spinner with consistent styling
    pub fn create(message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner()
            .tick_chars("\u{28FB}\u{28F9}\u{28FC}\u{28F8}\u{28FE}\u{28F6}\u{28F7}\u{28E7}\u{28CF}\u{28DF} ")
            .template("{spinner:.cyan} {msg}")
        {
            spinner.set_style(style);
        }
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(80));
        spinner
    }

    pub fn finish_success(spinner: &ProgressBar, message: &str) {
        spinner.finish_and_clear();
        println!("{} {}", "[OK]".green(), message);
    }

    pub fn finish_error(spinner: &ProgressBar, message: &str) {
        spinner.finish_and_clear();
        eprintln!("{} {}", "[X]".red(), message);
    }
}

/// tubegrab - resumable video downloader
#[derive(Parser)]
#[command(name = "tubegrab")]
#[command(version = VERSION)]
#[command(about = "Resumable video downloader. Chunked range requests, crash-safe resume.")]
#[command(long_about = "tubegrab - resumable video downloader\n\n\
    Download a video:    tubegrab get VIDEO_ID\n\
    Pick a format:       tubegrab get VIDEO_ID --itag 18\n\
    Continue a failure:  tubegrab get VIDEO_ID --itag 18 --resume\n\
    Direct URL:          tubegrab fetch URL -o FILE\n\
    Show metadata:       tubegrab info VIDEO_ID\n\n\
    The output file is the checkpoint. Nothing else is stored between runs.")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Quiet mode: no progress or summary lines
    #[arg(short = 'q', long, global = true)]
    quiet: bool,

    /// Verbose mode: debug logging on stderr
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Bytes per range request (overrides config)
    #[arg(long, global = true, value_name = "BYTES")]
    chunk_size: Option<u64>,

    /// Attempts per chunk before giving up (overrides config)
    #[arg(long, global = true, value_name = "N")]
    retries: Option<u32>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch metadata, pick a format and download it
    ///
    /// Examples:
    ///   tubegrab get dQw4w9WgXcQ
    ///   tubegrab get "https://www.youtube.com/watch?v=dQw4w9WgXcQ" --itag 18
    ///   tubegrab get dQw4w9WgXcQ --itag 18 --resume --rename --mp3
    Get {
        /// Video id or watch URL
        video: String,
        /// Continue a failed or cancelled download
        #[arg(long)]
        resume: bool,
        /// Select the format by itag instead of prompting
        #[arg(long)]
        itag: Option<u32>,
        /// Rename the output file using the video title
        #[arg(long)]
        rename: bool,
        /// Extract the audio track to mp3 with ffmpeg
        #[arg(long)]
        mp3: bool,
        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Download a direct URL with the resumable engine
    ///
    /// Examples:
    ///   tubegrab fetch https://example.com/big.iso -o big.iso
    ///   tubegrab fetch https://example.com/big.iso -o big.iso --resume
    Fetch {
        url: String,
        /// Destination file
        #[arg(short, long)]
        output: PathBuf,
        /// Continue from the destination's current length
        #[arg(long)]
        resume: bool,
    },

    /// Show metadata and formats without downloading
    Info {
        /// Video id or watch URL
        video: String,
    },

    /// Inspect or create the config file
    ///
    /// Examples:
    ///   tubegrab config show
    ///   tubegrab config init
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Print the config file location
    Path,
    /// Write a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Presentation settings shared by the commands.
struct Ui {
    quiet: bool,
}

impl Ui {
    fn download_manager(&self, config: &Config) -> Result<DownloadManager<ReqwestTransport>> {
        let transport = ReqwestTransport::with_settings(&config.transport_settings())
            .context("Failed to create HTTP client")?;
        let sink = if self.quiet { null_sink() } else { stdout_sink() };
        let rewrite = std::io::stdout().is_terminal();
        Ok(DownloadManager::new(transport, config.download_config(sink, rewrite)))
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_video_meta(video: &Video) {
    println!();
    println!("  {:<8}: {}", "ID", video.id);
    println!("  {:<8}: {}", "Title", video.title.bold());
    println!("  {:<8}: {}", "Author", video.author);
    println!("  {:<8}: {}", "Views", video.view_count);
    println!("  {:<8}: {:.2}", "Rating", video.avg_rating);
    println!(
        "  {:<8}: {}",
        "Length",
        format_duration(std::time::Duration::from_secs(video.length_seconds))
    );
    if !video.keywords.is_empty() {
        println!("  {:<8}: {}", "Keywords", video.keywords.join(", "));
    }
    println!();
    println!("  {}", "Formats".bold());
    for (i, format) in video.formats.iter().enumerate() {
        println!(
            "  {:>3}  {:>4}-{:<8} {}",
            i, format.itag, format.quality, format.video_type.dimmed()
        );
    }
    println!();
}

fn format_label(video: &Video, index: usize) -> String {
    match video.format(index) {
        Some(f) => format!("{:>3}  itag {:<4} {:<8} {}", index, f.itag, f.quality, f.video_type),
        None => index.to_string(),
    }
}

/// Interactive format choice. `None` when there is nobody to ask.
fn pick_format(video: &Video) -> Result<Option<usize>> {
    if !std::io::stdin().is_terminal() {
        return Ok(None);
    }
    let options: Vec<String> = (0..video.formats.len()).map(|i| format_label(video, i)).collect();
    let choice = inquire::Select::new("Pick a format:", options)
        .with_help_message("↑↓ to move, enter to select")
        .raw_prompt()
        .context("Format selection cancelled")?;
    Ok(Some(choice.index))
}

fn metadata_exit_code(err: &MetadataError) -> i32 {
    match err {
        MetadataError::InvalidId(_) => USAGE,
        _ => SERVICE_UNAVAILABLE,
    }
}

async fn fetch_video(config: &Config, input: &str, quiet: bool) -> Result<std::result::Result<Video, i32>> {
    let transport = ReqwestTransport::with_settings(&config.transport_settings())
        .context("Failed to create HTTP client")?;
    let client = VideoClient::new(transport.client().clone());

    let spinner = (!quiet).then(|| spinner::create("Hold on ..."));
    match client.fetch(input).await {
        Ok(video) => {
            if let Some(sp) = &spinner {
                spinner::finish_success(sp, &format!("{} formats for {}", video.formats.len(), video.id));
            }
            Ok(Ok(video))
        }
        Err(e) => {
            if let Some(sp) = &spinner {
                spinner::finish_error(sp, "Unable to fetch video metadata");
            }
            eprintln!("{}", metadata_report(&e));
            Ok(Err(metadata_exit_code(&e)))
        }
    }
}

/// Run a transfer, racing it against Ctrl+C. On failure the exit code is
/// returned and the partial file stays in place.
async fn run_download<T: HttpTransport>(
    manager: &DownloadManager<T>,
    target: &TransferTarget,
    resume_hint: &str,
) -> std::result::Result<DownloadReport, i32> {
    tokio::select! {
        result = manager.download(target) => match result {
            Ok(report) => Ok(report),
            Err(e) => {
                tracing::debug!(kind = e.kind(), "download failed");
                eprintln!("{}", download_report(&e, resume_hint));
                Err(ERROR)
            }
        },
        _ = tokio::signal::ctrl_c() => {
            eprintln!();
            eprintln!(
                "{} Interrupted. Partial file kept at {}",
                "[!]".yellow(),
                target.destination.display()
            );
            eprintln!("    Continue with: {}", resume_hint);
            Err(INTERRUPTED)
        }
    }
}

async fn handle_get(ui: &Ui, config: &Config, video: &str, itag: Option<u32>, output: Option<PathBuf>, options: DownloadOptions) -> Result<i32> {
    let video = match fetch_video(config, video, ui.quiet).await? {
        Ok(video) => video,
        Err(code) => return Ok(code),
    };
    print_video_meta(&video);

    if video.formats.is_empty() {
        eprintln!("{} No downloadable formats for {}", "[X]".red(), video.id);
        return Ok(SERVICE_UNAVAILABLE);
    }

    let index = match itag {
        Some(itag) => match video.index_by_itag(itag) {
            Some(index) => index,
            None => {
                eprintln!("{} Unknown itag number: {}", "[X]".red(), itag);
                return Ok(USAGE);
            }
        },
        None => match pick_format(&video)? {
            Some(index) => index,
            None => {
                eprintln!("{} No --itag given and no terminal to ask on", "[X]".red());
                return Ok(USAGE);
            }
        },
    };
    let Some(format) = video.format(index) else {
        return Ok(USAGE);
    };

    let dir = output.unwrap_or_else(|| config.output_dir());
    let destination = dir.join(video.default_filename(index));
    println!("Downloading to {} ... This could take a while", destination.display());

    let manager = ui.download_manager(config)?;
    let target = TransferTarget::new(format.url.clone(), &destination).with_resume(options.resume);
    let resume_hint = format!("tubegrab get {} --itag {} --resume", video.id, format.itag);

    let report = match run_download(&manager, &target, &resume_hint).await {
        Ok(report) => report,
        Err(code) => {
            eprintln!("Unable to download video content.");
            return Ok(code);
        }
    };

    let mut path = report.path.clone();
    if options.rename {
        match postprocess::rename_by_title(&path, &video.title).await {
            Ok(renamed) => path = renamed,
            Err(e) => println!("{} Failed to rename output file: {}", "[!]".yellow(), e),
        }
    }

    if options.extract_audio {
        println!("Extracting audio ..");
        match postprocess::extract_audio(&path).await {
            Ok(mp3) => println!("Extracted audio: {}", mp3.display()),
            Err(e) => println!("{} {}", "[!]".yellow(), postprocess_notice(&e)),
        }
    }

    println!("{} Downloaded {}", "[✓]".green(), path.display());
    Ok(SUCCESS)
}

async fn handle_fetch(ui: &Ui, config: &Config, url: String, output: PathBuf, resume: bool) -> Result<i32> {
    let manager = ui.download_manager(config)?;
    let resume_hint = format!("tubegrab fetch {} -o {} --resume", url, output.display());
    let target = TransferTarget::new(url, output).with_resume(resume);

    match run_download(&manager, &target, &resume_hint).await {
        Ok(report) => {
            println!(
                "{} Downloaded {} ({})",
                "[✓]".green(),
                report.path.display(),
                abbr(report.total_length)
            );
            Ok(SUCCESS)
        }
        Err(code) => Ok(code),
    }
}

async fn handle_info(config: &Config, video: &str, quiet: bool) -> Result<i32> {
    match fetch_video(config, video, quiet).await? {
        Ok(video) => {
            print_video_meta(&video);
            Ok(SUCCESS)
        }
        Err(code) => Ok(code),
    }
}

fn handle_config(command: Option<ConfigCommands>, config: &Config) -> Result<i32> {
    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("{}", "=== tubegrab configuration ===".cyan().bold());
            println!();
            println!("  Chunk size:        {} ({} bytes)", abbr(config.chunk_size), config.chunk_size);
            println!("  Attempts/chunk:    {}", config.max_attempts);
            println!("  Retry delay:       {}ms", config.retry_delay_ms);
            println!("  Progress interval: {}ms", config.progress_interval_ms);
            println!("  Connect timeout:   {}s", config.connect_timeout_secs);
            println!(
                "  User agent:        {}",
                config.user_agent.as_deref().unwrap_or("(default)")
            );
            println!("  Output dir:        {}", config.output_dir().display());
            println!();
            if let Ok(path) = config::config_path() {
                println!("Config file: {}", path.display());
            }
            println!();
        }
        Some(ConfigCommands::Path) => {
            println!("{}", config::config_path()?.display());
        }
        Some(ConfigCommands::Init { force }) => {
            let path = config::config_path()?;
            if path.exists() && !force {
                println!("{} Config already exists at {} (use --force to overwrite)", "[!]".yellow(), path.display());
                return Ok(SUCCESS);
            }
            let path = config::save_config(&Config::default())?;
            println!("{} Wrote default config to {}", "[✓]".green(), path.display());
        }
    }
    Ok(SUCCESS)
}

fn run(cli: Cli) -> Result<i32> {
    let mut config = config::load_config()?;
    if let Some(chunk_size) = cli.chunk_size.filter(|&n| n > 0) {
        config.chunk_size = chunk_size;
    }
    if let Some(retries) = cli.retries.filter(|&n| n > 0) {
        config.max_attempts = retries;
    }
    let ui = Ui { quiet: cli.quiet };

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(SUCCESS);
    };

    if let Commands::Config { command } = command {
        return handle_config(command, &config);
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    runtime.block_on(async {
        match command {
            Commands::Get { video, resume, itag, rename, mp3, output } => {
                let options = DownloadOptions {
                    resume,
                    rename,
                    extract_audio: mp3,
                };
                handle_get(&ui, &config, &video, itag, output, options).await
            }
            Commands::Fetch { url, output, resume } => handle_fetch(&ui, &config, url, output, resume).await,
            Commands::Info { video } => handle_info(&config, &video, cli.quiet).await,
            Commands::Config { .. } => Ok(SUCCESS),
        }
    })
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "[X]".red(), e);
            ERROR
        }
    };
    std::process::exit(code);
}
