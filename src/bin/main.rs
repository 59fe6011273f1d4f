use std::process::exit;

use cacophony::dsl::{dsl, ParseError};
use cacophony::midi::{write_smf, MidiSettings, Tempo};
use cacophony::rhythm::{build_polyrhythm_within, Limits, Rhythm, Slot, Times, DEFAULT_MAX_TICKS};

use clap::*;
use midly::num::u7;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "warn,cacophony=info";

#[derive(Debug, Parser)]
#[command(name = "cacophony")]
#[command(version = "0.1")]
#[command(about = "Turns rhythm notation into polyrhythmic MIDI", long_about = None)]
struct Cli {
    /// Rhythm score like "| x x'X - |". Repeat to layer rhythms; the first one is primary.
    #[arg(short = 'r', long = "rhythm")]
    rhythms: Vec<String>,

    /// Use a polyrhythm of plain beats in the given ratio (e.g. 7:11, 2:3:4) instead of scores.
    /// The first number is primary and sets the tempo.
    #[arg(short = 'p', long = "polyrhythm", conflicts_with = "rhythms")]
    polyrhythm: Option<String>,

    /// Tempo in beats per minute.
    #[arg(short = 't', default_value = "120", value_parser = value_parser!(u16).range(1..))]
    tempo: u16,

    /// MIDI key every beat is played on.
    #[arg(short = 'k', default_value = "69", value_parser = value_parser!(u8).range(0..128))]
    key: u8,

    /// How many times to play the rhythm through.
    #[arg(short = 'n', default_value = "3")]
    repeat: u16,

    /// Refuse to build tick grids longer than this.
    #[arg(long = "max-ticks", default_value_t = DEFAULT_MAX_TICKS)]
    max_ticks: u64,

    /// Print the canonical tick grid of the rhythm.
    #[arg(short = 'c', long = "canonical")]
    canonical: bool,

    #[arg(short = 'o', default_value = None)]
    output: Option<String>,
}

fn setup_logging() {
    let directives = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_owned());

    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::builder().parse_lossy(directives))
        .init();
}

fn parse_rhythms(cli: &Cli) -> Result<(Rhythm, Vec<Rhythm>), ParseError> {
    match &cli.polyrhythm {
        Some(ratio) => dsl::ratio(ratio),
        None => {
            let mut rhythms = cli
                .rhythms
                .iter()
                .map(|score| dsl::rhythm(score))
                .collect::<Result<Vec<_>, _>>()?
                .into_iter();
            match rhythms.next() {
                Some(primary) => Ok((primary, rhythms.collect())),
                None => Err(ParseError::EmptyScore),
            }
        }
    }
}

fn format_grid(grid: &[Slot]) -> String {
    grid.iter()
        .map(|slot| match slot {
            None => ".".to_string(),
            Some(amplitude) => format!("{:.2}", amplitude.0),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn main() {
    setup_logging();
    let cli = Cli::parse();

    if cli.rhythms.is_empty() && cli.polyrhythm.is_none() {
        println!("No rhythm was supplied, exiting...");
        exit(1)
    }

    let (primary, secondaries) = match parse_rhythms(&cli) {
        Ok(x) => x,
        Err(e) => {
            tracing::error!("Can't parse the rhythm: {}", e);
            exit(1)
        }
    };

    let limits = Limits {
        max_ticks: cli.max_ticks,
    };
    let rhythm = if secondaries.is_empty() {
        primary
    } else {
        match build_polyrhythm_within(primary, secondaries, &limits) {
            Ok(x) => x,
            Err(e) => {
                tracing::error!("Can't combine the rhythms: {}", e);
                exit(1)
            }
        }
    };
    tracing::info!(beats = rhythm.len(), duration = %rhythm.duration(), "rhythm ready");

    if cli.canonical {
        match rhythm.canonical_within(&limits) {
            Ok(grid) => println!("{}", format_grid(&grid)),
            Err(e) => {
                tracing::error!("Can't canonicalise the rhythm: {}", e);
                exit(1)
            }
        }
    }

    let settings = MidiSettings {
        tempo: Tempo(cli.tempo),
        key: u7::new(cli.key),
        ..MidiSettings::default()
    };
    let performance = rhythm.cycle(Times(cli.repeat));

    match cli.output {
        None => {
            println!("No output file path was supplied, running a dry run...");
            for beat in &rhythm {
                println!(
                    "{}\tstart delay {}\tsounding {}\tafter delay {}",
                    beat,
                    beat.start_delay(),
                    beat.sounding_time(),
                    beat.after_delay()
                );
            }
        }
        Some(path) => match write_smf(&performance, &settings, &path) {
            Ok(_) => {
                println!("{} was written successfully", path);
                exit(0)
            }
            Err(e) => {
                tracing::error!("Failed to write {}: {}", path, e);
                exit(1)
            }
        },
    }
}
