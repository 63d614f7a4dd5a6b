use std::{
    fmt,
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::{Parser, Subcommand};
use ilda2wav_core::{
    config::{DEFAULT_CONFIG_FILE, DEFAULT_FPS, DEFAULT_ORDER, DEFAULT_PPS},
    playlist, read_animation, spawn, BatchConfig, ChannelLayout, ConversionEvent,
    ConversionParams, ConversionRequest, Ilda2WavError,
};
use tracing_subscriber::EnvFilter;

const LABEL_WIDTH: usize = 15;
const BAR_WIDTH: usize = 50;

fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Batch { config } => run_batch(&config),
        Commands::Convert {
            input,
            output,
            fps,
            pps,
            order,
        } => run_convert(input, output, fps, pps, order),
        Commands::Inspect { input, points } => run_inspect(&input, points),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            eprintln!("{failure}");
            ExitCode::from(failure.exit_code())
        }
    }
}

fn run_batch(config_path: &Path) -> Result<(), Failure> {
    tracing::info!(config = ?config_path, "starting batch conversion");

    let config = BatchConfig::load(config_path).map_err(Failure::config)?;
    let jobs = config.resolve().map_err(Failure::config)?;

    playlist::clear_dir(&config.target_dir).map_err(Failure::convert)?;

    for job in &jobs {
        let request = ConversionRequest {
            input: job.input.clone(),
            output: config.target_dir.join(playlist::wav_name(job)),
            params: job.params.clone(),
        };
        drain(request)?;
    }

    if config.gen_list {
        let path = config.target_dir.join(playlist::PLAYLIST_FILE);
        let file = File::create(&path).map_err(|err| Failure::playlist(err.into()))?;
        playlist::write_playlist(BufWriter::new(file), &jobs)
            .map_err(|err| Failure::playlist(err.into()))?;
        tracing::info!(?path, entries = jobs.len(), "wrote playlist");
    }

    Ok(())
}

fn run_convert(
    input: PathBuf,
    output: PathBuf,
    fps: u32,
    pps: u32,
    order: String,
) -> Result<(), Failure> {
    let layout = ChannelLayout::parse(&order).map_err(Failure::config)?;
    let params = ConversionParams::new(fps, pps, layout).map_err(Failure::config)?;
    drain(ConversionRequest {
        input,
        output,
        params,
    })
}

/// Runs one conversion to completion, redrawing its progress line.
fn drain(request: ConversionRequest) -> Result<(), Failure> {
    let label = progress_label(&request.input);
    let events = spawn(request).map_err(Failure::convert)?;

    for event in events {
        match event {
            ConversionEvent::Progress(percent) => print_progress(&label, percent),
            ConversionEvent::Failure(err) => {
                eprintln!();
                return Err(Failure::convert(err));
            }
        }
    }
    eprintln!();
    Ok(())
}

fn run_inspect(input: &Path, points: bool) -> Result<(), Failure> {
    let file = File::open(input).map_err(|err| Failure::convert(err.into()))?;
    let animation = read_animation(BufReader::new(file)).map_err(Failure::convert)?;

    println!("{animation}");
    for frame in animation.frames() {
        println!("{frame}");
        if points {
            for point in frame.points() {
                println!("{point}");
            }
        }
    }
    Ok(())
}

fn progress_label(input: &Path) -> String {
    let name = input.to_string_lossy();
    if name.chars().count() > LABEL_WIDTH {
        let head: String = name.chars().take(LABEL_WIDTH - 3).collect();
        format!("{head}...")
    } else {
        name.into_owned()
    }
}

fn print_progress(label: &str, percent: u8) {
    let filled = usize::from(percent) * BAR_WIDTH / 100;
    let mut stderr = std::io::stderr().lock();
    let _ = write!(
        stderr,
        "\r{label:>LABEL_WIDTH$} [{}{}] {percent:3}%",
        "-".repeat(filled),
        " ".repeat(BAR_WIDTH - filled)
    );
    let _ = stderr.flush();
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

/// Stage a failure happened in; determines the process exit code.
#[derive(Debug, Clone, Copy)]
enum Stage {
    Config,
    Convert,
    Playlist,
}

#[derive(Debug)]
struct Failure {
    stage: Stage,
    error: Ilda2WavError,
}

impl Failure {
    fn config(error: Ilda2WavError) -> Self {
        Self {
            stage: Stage::Config,
            error,
        }
    }

    fn convert(error: Ilda2WavError) -> Self {
        Self {
            stage: Stage::Convert,
            error,
        }
    }

    fn playlist(error: Ilda2WavError) -> Self {
        Self {
            stage: Stage::Playlist,
            error,
        }
    }

    fn exit_code(&self) -> u8 {
        match self.stage {
            Stage::Config => 1,
            Stage::Convert => 2,
            Stage::Playlist => 3,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.stage {
            Stage::Config => "unable to read options",
            Stage::Convert => "unable to convert file",
            Stage::Playlist => "unable to write playlist",
        };
        write!(f, "{what}: {}", self.error)
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Convert ILDA laser animations to multi-channel WAV", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert every file listed in a JSON configuration.
    Batch {
        /// Path to the configuration file.
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
    /// Convert a single animation.
    Convert {
        /// ILDA animation to read.
        input: PathBuf,
        /// WAV file to write.
        output: PathBuf,
        /// Animation frames per second of audio.
        #[arg(long, default_value_t = DEFAULT_FPS as u32)]
        fps: u32,
        /// Points (samples) per second.
        #[arg(long, default_value_t = DEFAULT_PPS as u32)]
        pps: u32,
        /// Channel layout, e.g. `Y|-1X|B|C`.
        #[arg(long, default_value = DEFAULT_ORDER, allow_hyphen_values = true)]
        order: String,
    },
    /// Print the frames (and optionally the points) of an animation.
    Inspect {
        input: PathBuf,
        /// Also list every point.
        #[arg(short, long)]
        points: bool,
    },
}
