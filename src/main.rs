use anechoic_turntable::abort::AbortSignal;
use anechoic_turntable::config::Config;
use anechoic_turntable::transport::SimulatedTurntable;
use anechoic_turntable::turntable::{
    Coordinate, TelemetryLog, Turntable, TurntableError, TurntableSettings,
};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "turntable")]
#[command(about = "Anechoic chamber turntable control")]
struct Cli {
    /// YAML configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,
    /// Serial port, overrides the config file
    #[arg(long)]
    port: Option<String>,
    /// Drive an in-process simulated turntable instead of hardware
    #[arg(long)]
    simulate: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe serial ports and report the first responsive turntable
    Find,
    /// Print the current position
    Position {
        #[arg(long)]
        json: bool,
        /// Keep printing until interrupted
        #[arg(long)]
        watch: bool,
    },
    /// Zero both axes at the current pose
    Zero,
    /// Move to a position and wait for arrival
    Move {
        #[arg(long, allow_hyphen_values = true)]
        azimuth: f64,
        #[arg(long, allow_hyphen_values = true)]
        elevation: f64,
        #[arg(long, value_enum, default_value_t = Frame::Absolute)]
        frame: Frame,
        /// Zero at the current pose before moving
        #[arg(long)]
        zero: bool,
    },
    /// Stop all motion
    Stop,
    /// Raw move with no validation, for recovering a faulted table
    EmergencyMove {
        #[arg(long, allow_hyphen_values = true)]
        azimuth: f64,
        #[arg(long, allow_hyphen_values = true)]
        elevation: f64,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Frame {
    Absolute,
    Turntable,
    Antenna,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match Config::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error loading config {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => Config::default(),
    };

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    let settings = match config.turntable_settings() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Invalid config: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let abort = AbortSignal::new();
    let handler_abort = abort.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_abort.raise("interrupted")) {
        log::warn!("could not install Ctrl-C handler: {}", e);
    }

    let mut table = match connect(&cli, &config, settings) {
        Ok(table) => table,
        Err(e) => {
            eprintln!("Error connecting to turntable: {}", e);
            return ExitCode::FAILURE;
        }
    };
    table.set_abort_signal(abort);

    if let Some(path) = &config.telemetry_log.path {
        match TelemetryLog::create(path, config.telemetry_log.allow_clobber) {
            Ok(log) => table.set_telemetry_log(log),
            Err(e) => {
                eprintln!("Error opening telemetry log: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    let result = match cli.command {
        Commands::Find => report(&mut table, false),
        Commands::Position { json, watch } => {
            if watch {
                watch_position(&mut table, json)
            } else {
                report(&mut table, json)
            }
        }
        Commands::Zero => table.send_set_command(0.0, 0.0).map(|confirmed| {
            println!("Zeroed, reading {}", confirmed);
        }),
        Commands::Move {
            azimuth,
            elevation,
            frame,
            zero,
        } => move_table(&mut table, &config, azimuth, elevation, frame, zero),
        Commands::Stop => table.send_stop_command(),
        Commands::EmergencyMove { azimuth, elevation } => {
            table.send_emergency_move_command(azimuth, elevation)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn connect(
    cli: &Cli,
    config: &Config,
    settings: TurntableSettings,
) -> Result<Turntable, TurntableError> {
    if cli.simulate {
        log::info!("using simulated turntable");
        return Ok(Turntable::with_transport(
            "simulated",
            Box::new(SimulatedTurntable::new()),
            settings,
        ));
    }
    match cli.port.as_ref().or(config.serial.port.as_ref()) {
        Some(port) => Turntable::open(port, settings),
        None => Turntable::find(settings),
    }
}

fn report(table: &mut Turntable, json: bool) -> Result<(), TurntableError> {
    let position = table.wait_for_position()?;
    print_position(table.name(), &position, json);
    Ok(())
}

fn watch_position(table: &mut Turntable, json: bool) -> Result<(), TurntableError> {
    let interval = table.settings().poll_interval;
    loop {
        match table.wait_for_position() {
            Ok(position) => print_position(table.name(), &position, json),
            Err(TurntableError::Aborted(_)) => return Ok(()),
            Err(e) => return Err(e),
        }
        std::thread::sleep(interval);
    }
}

fn move_table(
    table: &mut Turntable,
    config: &Config,
    azimuth: f64,
    elevation: f64,
    frame: Frame,
    zero: bool,
) -> Result<(), TurntableError> {
    let neutral = table.settings().neutral_elevation_deg;
    let target = match frame {
        Frame::Absolute => Coordinate::from_absolute_turntable(azimuth, elevation, neutral),
        Frame::Turntable => Coordinate::from_turntable(azimuth, elevation, neutral),
        Frame::Antenna => Coordinate::from_antenna(azimuth, elevation, neutral),
    };

    match zero_then_move(table, &target, config, zero) {
        Ok(position) => {
            println!("Arrived at {}", position);
            Ok(())
        }
        Err(e) => {
            log::error!("move to {} failed: {}", target, e);
            if let Err(stop_err) = table.send_stop_command() {
                log::error!("stop after failed move also failed: {}", stop_err);
            }
            Err(e)
        }
    }
}

fn zero_then_move(
    table: &mut Turntable,
    target: &Coordinate,
    config: &Config,
    zero: bool,
) -> Result<Coordinate, TurntableError> {
    if zero {
        table.send_set_command(0.0, 0.0)?;
    }
    let poll_delay = table.settings().poll_interval;
    table.move_to_coordinate(target, config.margins(), poll_delay)
}

fn print_position(name: &str, position: &Coordinate, json: bool) {
    if json {
        match serde_json::to_string(position) {
            Ok(line) => println!("{}", line),
            Err(e) => eprintln!("Error encoding position: {}", e),
        }
    } else {
        println!(
            "{}: {} antenna=({:+.2}, {:+.2})",
            name,
            position,
            position.antenna_azimuth(),
            position.antenna_elevation()
        );
    }
}
