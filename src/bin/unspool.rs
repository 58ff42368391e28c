use std::{error::Error, path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use tracing_subscriber::EnvFilter;
use unspool::{
    AudioSink, CancellationToken, Demuxer, FfmpegDemuxer, FfmpegLogLevel, HeadlessSink, MediaKind,
    PixelFormat, PlaybackOptions, PlaybackPipeline, PresentationSink, ProgressCallback,
    ProgressInfo,
};

#[cfg(feature = "audio-output")]
use unspool::DeviceAudioSink;

#[cfg(feature = "window")]
use unspool::WindowSink;

const CLI_AFTER_HELP: &str = "Examples:\n  unspool input.mp4\n  unspool input.mp4 --no-audio --progress\n  unspool input.mkv --headless --pixel-format yuv420p --verbose\n  unspool input.mp4 --probe";

#[derive(Debug, Parser)]
#[command(
    name = "unspool",
    version,
    about = "Play a video file at its authored speed",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    /// Input media path.
    input: PathBuf,

    /// Decode and pace without opening a window.
    #[arg(long)]
    headless: bool,

    /// Do not open an audio device.
    #[arg(long)]
    no_audio: bool,

    /// Print the input's streams as JSON and exit.
    #[arg(long)]
    probe: bool,

    /// Show a progress bar.
    #[arg(long)]
    progress: bool,

    /// Show additional logging output.
    #[arg(long)]
    verbose: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long)]
    log_level: Option<String>,

    /// Decoded pixel format (yuv420p, rgb24, rgba). The window needs rgb24 or rgba.
    #[arg(long)]
    pixel_format: Option<String>,
}

fn warn(message: &str) {
    eprintln!("{} {}", "warning:".yellow().bold(), message.yellow());
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn parse_pixel_format(value: &str) -> Result<PixelFormat, Box<dyn Error>> {
    Ok(value
        .parse::<PixelFormat>()
        .map_err(|_| format!("unsupported --pixel-format: {value}"))?)
}

fn parse_log_level(value: &str) -> Result<FfmpegLogLevel, Box<dyn Error>> {
    Ok(value
        .parse::<FfmpegLogLevel>()
        .map_err(|_| format!("unsupported --log-level: {value}"))?)
}

fn probe(cli: &Cli) -> Result<(), Box<dyn Error>> {
    let demuxer = FfmpegDemuxer::open(&cli.input)?;
    let payload = json!({
        "path": cli.input.display().to_string(),
        "duration_seconds": demuxer.duration().map(|duration| duration.as_secs_f64()),
        "best_video": demuxer.best_stream(MediaKind::Video).map(|stream| stream.index),
        "best_audio": demuxer.best_stream(MediaKind::Audio).map(|stream| stream.index),
        "streams": demuxer.streams(),
    });
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn presentation_sink(
    cli: &Cli,
    cancellation: &CancellationToken,
) -> Result<Box<dyn PresentationSink>, Box<dyn Error>> {
    if cli.headless {
        return Ok(Box::new(HeadlessSink::new()));
    }

    #[cfg(feature = "window")]
    {
        let title = format!("unspool - {}", cli.input.display());
        Ok(Box::new(WindowSink::new(title, cancellation.clone())))
    }

    #[cfg(not(feature = "window"))]
    {
        let _ = cancellation;
        warn("window output requires building with the `window` feature; playing headless");
        Ok(Box::new(HeadlessSink::new()))
    }
}

fn audio_sink(cli: &Cli) -> Option<Box<dyn AudioSink>> {
    if cli.no_audio {
        return None;
    }

    #[cfg(feature = "audio-output")]
    {
        Some(Box::new(DeviceAudioSink::new()))
    }

    #[cfg(not(feature = "audio-output"))]
    {
        warn("audio output requires building with the `audio-output` feature; playing video only");
        None
    }
}

struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new() -> Result<Self, Box<dyn Error>> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {percent:>3}% {msg}",
        )?;
        bar.set_style(style.progress_chars("##-"));
        bar.enable_steady_tick(Duration::from_millis(120));
        Ok(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        if let Some(duration) = info.duration {
            self.bar.set_length(duration.as_millis() as u64);
        }
        self.bar.set_position(info.position.as_millis() as u64);
        self.bar
            .set_message(format!("{} frames", info.frames_presented));
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Some(level) = &cli.log_level {
        unspool::set_ffmpeg_log_level(parse_log_level(level)?);
    }

    if cli.probe {
        return probe(&cli);
    }

    let cancellation = CancellationToken::new();
    let handler_token = cancellation.clone();
    ctrlc::set_handler(move || handler_token.cancel())?;

    let mut options = PlaybackOptions::new().with_cancellation(cancellation.clone());
    if let Some(value) = &cli.pixel_format {
        let pixel_format = parse_pixel_format(value)?;
        if !cli.headless && cfg!(feature = "window") && pixel_format == PixelFormat::Yuv420p {
            return Err("--pixel-format yuv420p is only available with --headless".into());
        }
        options = options.with_pixel_format(pixel_format);
    }

    let progress = if cli.progress {
        let progress = Arc::new(TerminalProgress::new()?);
        options = options
            .with_progress(progress.clone())
            .with_progress_interval(1);
        Some(progress)
    } else {
        None
    };

    let presentation = presentation_sink(&cli, &cancellation)?;
    let audio = audio_sink(&cli);
    let mut pipeline = PlaybackPipeline::for_file(&cli.input, presentation, audio, options);
    let outcome = pipeline.run();

    if let Some(progress) = &progress {
        progress.finish();
    }
    let report = outcome?;

    if cli.verbose {
        eprintln!(
            "{} packets read, {} skipped, {} late frames, {} backpressure retries, \
             {} out-of-order, {} undecodable",
            report.packets_read,
            report.packets_skipped,
            report.late_frames,
            report.backpressure_retries,
            report.out_of_order_discards,
            report.undecodable_frames,
        );
    }
    println!(
        "{} {} video frames, {} audio frames{}",
        if report.cancelled { "stopped".yellow().bold() } else { "done".green().bold() },
        report.video_frames_presented,
        report.audio_frames_enqueued,
        if report.audio_degraded { " (video only)" } else { "" },
    );

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}
