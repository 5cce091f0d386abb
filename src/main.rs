// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

use std::env;
use std::process;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use tempomap::{BbtTime, FramePos, MapFile, RoundMode, TempoMap, TransportClock};
use tracing::Level;

fn print_usage() {
    println!("tempomap - tempo and meter map tool");
    println!();
    println!("Usage: tempomap [-v] <COMMAND>");
    println!();
    println!("Commands:");
    println!("  --dump <FILE>                      Print every section of the map");
    println!("  --at <FILE> <FRAME>                Show tempo, meter and BBT at a frame");
    println!("  --frame <FILE> <BBT>               Frame of a bar|beat|tick position");
    println!("  --round <FILE> <FRAME>             Snap a frame to the nearest beat and bar");
    println!("  --grid <FILE> <START> <END> [MOD]  List beats (or every MOD-th bar) in a range");
    println!("  --resample <FILE> <RATE> <OUT>     Write the map at another sample rate");
    println!("  --play <FILE> <SECONDS> [BLOCK]    Run the transport and print beats");
    println!("  --help                             Show this help message");
    println!();
    println!("Map files are YAML (.yaml, .yml) or TOML (.toml).");
}

fn load_map(path: &str) -> Result<TempoMap> {
    MapFile::load(path)?.build()
}

fn parse_frame(arg: &str) -> Result<FramePos> {
    arg.parse()
        .map_err(|_| anyhow!("Invalid frame position: {}", arg))
}

/// Accepts `4|1|0`, `4:1:0` or `4.1.0`; beats and ticks may be omitted
fn parse_bbt(arg: &str) -> Result<BbtTime> {
    let fields: Vec<u32> = arg
        .split(|c| c == '|' || c == ':' || c == '.')
        .map(|f| f.trim().parse::<u32>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| anyhow!("Invalid BBT position: {}", arg))?;
    match fields.as_slice() {
        [bars] => Ok(BbtTime::new(*bars, 1, 0)),
        [bars, beats] => Ok(BbtTime::new(*bars, *beats, 0)),
        [bars, beats, ticks] => Ok(BbtTime::new(*bars, *beats, *ticks)),
        _ => bail!("Invalid BBT position: {}", arg),
    }
}

fn require(args: &[String], count: usize, usage: &str) {
    if args.len() < count {
        eprintln!("Error: {}", usage);
        process::exit(1);
    }
}

fn show_metric(map: &TempoMap, frame: FramePos) {
    let metric = map.metric_at(frame);
    println!("frame:        {}", metric.frame);
    println!("seconds:      {:.6}", metric.minute * 60.0);
    println!("bbt:          {}", metric.bbt);
    println!("quarter note: {:.6}", metric.quarter_note());
    println!("beat:         {:.6}", metric.beat);
    println!("tempo:        {}", metric.tempo);
    println!("meter:        {}", metric.meter);
}

fn show_grid(map: &TempoMap, start: FramePos, end: FramePos, bar_mod: u32) {
    for point in map.grid(start, end, bar_mod) {
        println!(
            "{:>12}  {}  {:8.3} bpm  {}",
            point.frame,
            point.bbt,
            point.tempo.note_types_per_minute(),
            point.meter
        );
    }
}

fn play(map: TempoMap, seconds: f64, block: u32) -> Result<()> {
    if block == 0 {
        bail!("Block size must be positive");
    }
    let total = (seconds * map.sample_rate() as f64) as FramePos;
    let mut clock = TransportClock::new(Arc::new(map));
    clock.start();

    while clock.position() < total {
        let Some(info) = clock.process(block) else {
            break;
        };
        for point in &info.beats {
            let marker = if point.is_bar() { "|" } else { " " };
            println!("{} {}  frame {}  {}", marker, point.bbt, point.frame, point.tempo);
        }
    }

    clock.stop();
    Ok(())
}

fn main() -> Result<()> {
    let mut args: Vec<String> = env::args().collect();
    let verbose = args.iter().any(|a| a == "-v" || a == "--verbose");
    args.retain(|a| a != "-v" && a != "--verbose");

    tracing_subscriber::fmt()
        .with_max_level(if verbose { Level::DEBUG } else { Level::WARN })
        .with_writer(std::io::stderr)
        .init();

    if args.len() < 2 {
        println!("tempomap - tempo and meter map tool");
        println!("Run with --help for usage information");
        return Ok(());
    }

    match args[1].as_str() {
        "--dump" => {
            require(&args, 3, "--dump requires a map file");
            print!("{}", load_map(&args[2])?);
        }
        "--at" => {
            require(&args, 4, "--at requires a map file and a frame");
            let map = load_map(&args[2])?;
            show_metric(&map, parse_frame(&args[3])?);
        }
        "--frame" => {
            require(&args, 4, "--frame requires a map file and a BBT position");
            let map = load_map(&args[2])?;
            let bbt = parse_bbt(&args[3])?;
            println!("{}", map.frame_at_bbt(&bbt));
        }
        "--round" => {
            require(&args, 4, "--round requires a map file and a frame");
            let map = load_map(&args[2])?;
            let frame = parse_frame(&args[3])?;
            println!("beat: {}", map.round_to_beat(frame, RoundMode::Nearest));
            println!("bar:  {}", map.round_to_bar(frame, RoundMode::Nearest));
        }
        "--grid" => {
            require(&args, 5, "--grid requires a map file, a start and an end frame");
            let map = load_map(&args[2])?;
            let start = parse_frame(&args[3])?;
            let end = parse_frame(&args[4])?;
            let bar_mod: u32 = match args.get(5) {
                Some(arg) => arg
                    .parse()
                    .map_err(|_| anyhow!("Invalid bar modulus: {}", arg))?,
                None => 0,
            };
            show_grid(&map, start, end, bar_mod);
        }
        "--resample" => {
            require(&args, 5, "--resample requires a map file, a sample rate and an output file");
            let map = load_map(&args[2])?;
            let rate: u32 = args[3]
                .parse()
                .map_err(|_| anyhow!("Invalid sample rate: {}", args[3]))?;
            let resampled = map.with_sample_rate(rate)?;
            MapFile::from_map(&resampled).save(&args[4])?;
            println!("Wrote {} at {} Hz", args[4], rate);
        }
        "--play" => {
            require(&args, 4, "--play requires a map file and a duration in seconds");
            let map = load_map(&args[2])?;
            let seconds: f64 = args[3]
                .parse()
                .map_err(|_| anyhow!("Invalid duration: {}", args[3]))?;
            let block: u32 = match args.get(4) {
                Some(arg) => arg
                    .parse()
                    .map_err(|_| anyhow!("Invalid block size: {}", arg))?,
                None => 512,
            };
            play(map, seconds, block)?;
        }
        "--help" | "-h" => {
            print_usage();
        }
        _ => {
            eprintln!("Unknown option: {}", args[1]);
            print_usage();
            process::exit(1);
        }
    }

    Ok(())
}
