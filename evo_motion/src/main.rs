//! # EVO Motion Simulator
//!
//! Loads a machine configuration, builds the motion core on the simulated
//! board, optionally homes, executes the requested moves and prints the
//! final status snapshot.
//!
//! ```text
//! evo_motion --config config/machine.toml --home --move 10,20,-5,600 --move 0,0,0
//! ```
//!
//! A move without a feed rate is a rapid.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use evo_common::config::{ConfigLoader, LogLevel};
use evo_common::motion::config::MotionConfig;
use evo_motion::config::load_config;
use evo_motion::machine::{LineRequest, Machine};
use evo_motion::sim::{SimBoard, SimRunner};
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

/// One `--move` argument.
#[derive(Debug, Clone, Copy, PartialEq)]
struct MoveArg {
    target: [f32; 3],
    feed: Option<f32>,
}

fn parse_move(value: &str) -> Result<MoveArg, String> {
    let fields = value
        .split(',')
        .map(|f| f.trim().parse::<f32>().map_err(|e| format!("'{f}': {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    match fields.as_slice() {
        [x, y, z] => Ok(MoveArg {
            target: [*x, *y, *z],
            feed: None,
        }),
        [x, y, z, f] => Ok(MoveArg {
            target: [*x, *y, *z],
            feed: Some(*f),
        }),
        _ => Err(format!("expected X,Y,Z[,F], got '{value}'")),
    }
}

/// Stepper motion core on a simulated board.
#[derive(Parser, Debug)]
#[command(name = "evo_motion")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Runs moves through the planner and step interpolator on a simulated board")]
struct Args {
    /// Path to the machine configuration TOML.
    #[arg(long, default_value = "config/machine.toml")]
    config: PathBuf,

    /// Move to X,Y,Z [mm] at feed F [mm/min]; rapid without F. Repeatable.
    #[arg(long = "move", value_name = "X,Y,Z[,F]", value_parser = parse_move)]
    moves: Vec<MoveArg>,

    /// Run the homing cycle first.
    #[arg(long)]
    home: bool,

    /// Simulated time limit [s].
    #[arg(long, default_value_t = 600.0)]
    max_seconds: f64,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs and the final snapshot in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    // An unreadable file is reported by run() once logging is up.
    let configured = MotionConfig::load(&args.config)
        .map(|config| config.shared.log_level)
        .unwrap_or_default();
    setup_tracing(&args, configured);

    info!("EVO Motion v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&args) {
        error!("FATAL: {e}");
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let settings = load_config(&args.config)?;
    let mut board = SimBoard::new(&settings);
    if args.home {
        let kinematics = evo_motion::kinematics::build(&settings);
        board.install_home_switches(kinematics.as_ref())?;
    }
    let mut sim = SimRunner::new(Machine::new(settings, board));

    if args.home {
        sim.machine.home()?;
        let seconds = sim.run_until(args.max_seconds, |m| m.is_idle())?;
        info!(seconds, position = ?sim.machine.position(), "Homed");
    }

    for (index, mv) in args.moves.iter().enumerate() {
        let request = match mv.feed {
            Some(feed) => LineRequest::feed(mv.target, feed),
            None => LineRequest::rapid(mv.target),
        }
        .with_line(index as u32 + 1);

        // Back-pressure: let the simulation drain the planner and retry.
        loop {
            match sim.machine.queue_line(request) {
                Ok(()) => break,
                Err(evo_motion::error::MotionError::Busy) => sim.run_for(0.05),
                Err(evo_motion::error::MotionError::Enqueue(e)) if e.is_backpressure() => {
                    sim.run_for(0.05)
                }
                Err(e) => return Err(e.into()),
            }
            if sim.elapsed() > args.max_seconds {
                warn!(line = index + 1, "Time limit reached while queueing");
                break;
            }
        }
    }

    let seconds = sim.run_until_idle(args.max_seconds)?;
    let snapshot = sim.machine.status_snapshot();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        info!(
            status = snapshot.status.label(),
            position = ?snapshot.position,
            steps = ?snapshot.steps,
            rejected_full = snapshot.buffers.rejected_full,
            underruns = snapshot.buffers.underruns,
            seconds,
            "Run complete"
        );
    }
    if let Some(alarm) = snapshot.alarm {
        return Err(format!("machine stopped with {alarm}").into());
    }
    Ok(())
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args, configured: LogLevel) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        configured.as_filter().parse().unwrap_or(Level::INFO)
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
