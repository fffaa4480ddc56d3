use clap::{Arg, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use std::path::PathBuf;
use std::sync::mpsc;

use libeqsans_unfold::config::Config;
use libeqsans_unfold::process::process;
use libeqsans_unfold::worker_status::WorkerStatus;

fn main() {
    // Create a cli
    let matches = Command::new("eqsans_unfold_cli")
        .about("Unfold the time of flight of EQSANS neutron events")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .required(true)
                .global(true)
                .help("Path to the configuration file"),
        )
        .get_matches();

    // Initialize feedback
    let logger = simplelog::TermLogger::new(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let pb_manager = MultiProgress::new();

    LogWrapper::new(pb_manager.clone(), logger)
        .try_init()
        .expect("Could not create logging/progress!");

    // Parse the cli
    let config_path = PathBuf::from(matches.get_one::<String>("path").expect("We require args"));

    if let Some(("new", _)) = matches.subcommand() {
        log::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );
        match Config::default().write_config_file(&config_path) {
            Ok(()) => log::info!("Done."),
            Err(e) => log::error!("{e}"),
        }
        return;
    }

    // Load our config
    log::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = match Config::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    log::info!("Config successfully loaded.");
    log::info!("Run Path: {}", config.run_path.to_string_lossy());
    log::info!("Event Path: {}", config.event_path.to_string_lossy());
    log::info!("Output Path: {}", config.output_path.to_string_lossy());
    log::info!(
        "Low TOF cut: {} us High TOF cut: {} us",
        config.low_tof_cut,
        config.high_tof_cut
    );
    log::info!("Flight path correction: {}", config.flight_path_correction);
    log::info!("Strategy: {:?}", config.strategy);
    log::info!("Number of threads: {}", config.n_threads);

    // Setup the progress bar
    let pb = pb_manager.add(ProgressBar::new(100));
    if let Ok(style) = ProgressStyle::with_template("{msg:>10} [{bar:40}] {pos:>3}%") {
        pb.set_style(style.progress_chars("=> "));
    }
    let (tx, rx) = mpsc::channel::<WorkerStatus>();
    // Spawn the task!
    let handle = std::thread::spawn(move || process(config, tx));

    // The channel closes once the worker is done
    for status in rx.iter() {
        pb.set_message(format!("{:?}", status.stage));
        pb.set_position((status.progress * 100.0) as u64);
    }
    pb.finish();

    match handle.join() {
        Ok(Ok(summary)) => {
            log::info!("Successfully unfolded events!");
            match serde_yaml::to_string(&summary) {
                Ok(yaml) => log::info!("Summary:\n{yaml}"),
                Err(e) => log::error!("Could not format summary: {e}"),
            }
        }
        Ok(Err(e)) => log::error!("Unfolding failed with error: {e}"),
        Err(_) => log::error!("Failed to join processing task!"),
    }

    log::info!("Done.");
}
