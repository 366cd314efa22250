use std::{ops::ControlFlow, process, sync::Arc};

use clap::{command, Parser, ValueHint};
use log::{debug, error, info, warn, LevelFilter};
use tokio::io::{AsyncBufReadExt, BufReader};
use url::Url;

use tuner::{
    config::{Config, ENV_CORS_PROXY},
    console::{Command, Summary},
    error::Result,
    http, output,
    player::Player,
    signal::Signals,
    sink::RodioOutput,
    station::Directory,
    store::clamp_volume,
    verify::Verifier,
};

/// Profile to display when not built in release mode.
#[cfg(debug_assertions)]
const BUILD_PROFILE: &str = "debug";
/// Profile to display when not built release mode.
#[cfg(not(debug_assertions))]
const BUILD_PROFILE: &str = "release";

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

/// Command line arguments as parsed by `clap`.
#[derive(Clone, Debug, Default, PartialEq, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Station directory
    ///
    /// A `.json` or `.toml` file, or an `http(s)` URL serving JSON.
    #[arg(short, long, value_name = "FILE|URL", value_hint = ValueHint::AnyPath, default_value_t = String::from("stations.json"))]
    stations: String,

    /// Configuration file
    ///
    /// Missing files are ignored and defaults are used.
    #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath, default_value_t = String::from("tuner.toml"))]
    config: String,

    /// Station to play on start, by id or name
    #[arg(short, long, value_name = "STATION")]
    play: Option<String>,

    /// Initial volume from 0.0 to 1.0
    #[arg(long)]
    volume: Option<f32>,

    /// Skip probing streams before playing them
    #[arg(long, default_value_t = false)]
    no_verify: bool,

    /// CORS proxy prefix
    ///
    /// Stream URLs on untrusted hosts are appended to this prefix.
    #[arg(long, value_name = "URL", env = ENV_CORS_PROXY)]
    cors_proxy: Option<String>,

    /// Suppresses all output except warnings and errors.
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING)]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Specify twice for trace logging.
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,
}

/// Initializes the logger facade.
///
/// The logging level is determined as follows, in order of precedence from
/// highest to lowest:
/// 1. Command line arguments
/// 2. `RUST_LOG` environment variable
/// 3. Hard coded default
///
/// # Panics
///
/// Panics when a logger facade is already initialized.
fn init_logger(config: &Args) {
    let mut logger = env_logger::Builder::from_env(
        // Note: if you change the default logging level here, then you should
        // probably also change the verbosity levels below.
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if config.quiet || config.verbose > 0 {
        let level = match config.verbose {
            // Quiet and verbose are mutually exclusive.
            0 => LevelFilter::Warn,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Filter log messages of external crates.
        logger.filter_module(module_path!(), level);
    }

    logger.init();
}

/// Loads the station directory from a file or, for `http(s)` URLs, from the
/// network.
async fn load_directory(client: &http::Client, source: &str) -> Result<Directory> {
    match Url::parse(source) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {
            let directory = Directory::fetch(client, url).await?;
            info!("loaded {} stations from {source}", directory.len());
            Ok(directory)
        }
        _ => Directory::from_file(source),
    }
}

fn play(player: &Player, directory: &Directory, needle: &str) -> Result<()> {
    match directory.find(needle) {
        Some(station) => player.play(station),
        None => {
            warn!("no station matches \"{needle}\"");
            Ok(())
        }
    }
}

/// Executes one line typed on the console.
fn execute(player: &Player, directory: &Directory, line: &str) -> Result<ControlFlow<()>> {
    let command = match line.parse::<Command>() {
        Ok(command) => command,
        Err(e) => {
            warn!("{e}");
            return Ok(ControlFlow::Continue(()));
        }
    };

    match command {
        Command::Play(needle) => play(player, directory, &needle)?,
        Command::Toggle => player.toggle_play()?,
        Command::Pause => player.pause()?,
        Command::Resume => player.resume()?,
        Command::Stop => player.stop()?,
        Command::Volume(volume) => player.set_volume(volume)?,
        Command::List(query) => {
            let query = query.unwrap_or_default();
            for station in directory.search(&query) {
                println!("{:<40} {}", station.id, station.name);
            }
        }
        Command::Status => println!("{}", Summary(&player.session())),
        Command::Help => println!("{}", Command::HELP),
        Command::Quit => return Ok(ControlFlow::Break(())),
    }

    Ok(ControlFlow::Continue(()))
}

/// Main application loop.
///
/// Reads commands from standard input and logs playback changes until the
/// user quits or a shutdown signal arrives.
async fn run(args: Args) -> Result<()> {
    let mut config = Config::load(&args.config)?;
    if let Some(proxy) = &args.cors_proxy {
        config.set_cors_proxy(proxy)?;
    }
    if args.no_verify {
        config.verify_streams = false;
    }
    if let Some(volume) = args.volume.and_then(clamp_volume) {
        config.volume = volume;
    }
    debug!("{config:#?}");

    let client = Arc::new(http::Client::new(&config)?);
    let mut directory = load_directory(&client, &args.stations).await?;

    let (events, media) = output::event_channel();
    let output = RodioOutput::new(client.unlimited.clone(), events)?;

    let mut builder = Player::builder(output, media).config(&config);
    if config.verify_streams {
        builder = builder.verifier(Arc::new(Verifier::new(
            Arc::clone(&client),
            config.verify_timeout,
        )));
    }
    let (player, engine) = builder.spawn();

    if let Some(needle) = &args.play {
        play(&player, &directory, needle)?;
    }

    let mut signals = Signals::new()?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut session = player.subscribe();
    let mut last_summary = String::new();

    loop {
        tokio::select! {
            // Prioritize signals.
            biased;

            signal = signals.recv() => {
                if signal.is_shutdown() {
                    info!("received {signal}, shutting down gracefully");
                    break;
                }

                info!("received {signal}, reloading stations");
                match load_directory(&client, &args.stations).await {
                    Ok(reloaded) => directory = reloaded,
                    Err(e) => error!("unable to reload stations: {e}"),
                }
            }

            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if execute(&player, &directory, &line)?.is_break() {
                        break;
                    }
                }
                Ok(None) => {
                    debug!("end of input");
                    stdin_open = false;
                }
                Err(e) => {
                    error!("unable to read input: {e}");
                    stdin_open = false;
                }
            },

            changed = session.changed() => {
                if changed.is_err() {
                    error!("playback engine stopped");
                    break;
                }

                let summary = Summary(&session.borrow_and_update()).to_string();
                if summary != last_summary {
                    info!("{summary}");
                    last_summary = summary;
                }
            }
        }
    }

    // The engine may already be gone, in which case there is nothing to stop.
    let _ = player.dispose();
    engine.await?;
    Ok(())
}

/// Main entry point of the application.
///
/// This function initializes the logger facade, parses the command line
/// arguments, and starts the main application loop.
#[tokio::main]
async fn main() {
    // `clap` handles our command line arguments and help text.
    let args = Args::parse();
    init_logger(&args);

    // Dump command line arguments before we do anything more.
    // This aids in debugging of whatever comes next.
    debug!("Command {args:#?}");

    let cmd = command!();
    let name = cmd.get_name().to_string();
    let version = cmd.get_version().unwrap_or("UNKNOWN").to_string();

    info!("starting {name}/{version}; {BUILD_PROFILE}");

    if let Err(e) = run(args).await {
        error!("{e}");
        process::exit(1);
    }
}
