use trickplay::cli::Args;
use trickplay::config::{CONFIG_FILE_NAME, TrickPlayConfig};
use trickplay::core::clock::SystemTimeSource;
use trickplay::core::controller::TrickPlayController;
use trickplay::core::engine::PlaybackEngine;
use trickplay::core::event_bus::TrickPlayEvent;
use trickplay::core::load_control::DefaultLoadControl;
use trickplay::paths::{self, PathConfig};
use trickplay::sim::{self, SimConfig, SimTrackSelector, SimulatedEngine};

use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use std::sync::Arc;

fn init_logging(args: &Args, path_config: &PathConfig) -> anyhow::Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .clone()
            .unwrap_or_else(|| paths::config_file("trickplay.log", path_config));
        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();
        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Respects RUST_LOG if set
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level.as_str()))
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if std::env::args_os().len() <= 1 {
        use clap::CommandFactory;
        let _ = Args::command().print_help();
        println!("\n");
    }

    let path_config = PathConfig::from_env_and_cli(args.config_dir.clone());
    if let Err(e) = paths::ensure_config_dir(&path_config) {
        eprintln!("Warning: Failed to create config directory: {}", e);
    }
    init_logging(&args, &path_config)?;

    let config_path = paths::config_file(CONFIG_FILE_NAME, &path_config);
    let config = TrickPlayConfig::load(&config_path).context("Loading trick-play config")?;

    let steps = match &args.script {
        Some(text) => sim::parse_script(text)?,
        None => sim::parse_script("ff1@500,ff@2500,normal@4500,fr1@5500,normal@7000")?,
    };

    let sim_config = SimConfig {
        duration_ms: args.duration_ms,
        start_ms: args.start_ms,
        live: args.live,
        iframe_track: args.iframe != 0,
        ..SimConfig::default()
    };
    let time = Arc::new(SystemTimeSource::new());
    let engine = SimulatedEngine::new(sim_config, time.clone())?;
    let controller =
        TrickPlayController::with_time_source(Arc::new(SimTrackSelector::new(&engine)), config, time);
    controller.set_player(engine.clone());
    engine.install_frame_gate(controller.create_frame_gate());
    engine.install_load_control(Box::new(controller.create_load_control(DefaultLoadControl::default())));
    engine.install_format_filter(controller.create_format_filter());

    controller.add_event_listener(Arc::new(|event: &TrickPlayEvent| match event {
        TrickPlayEvent::ModeChanged { new_mode, prev_mode } => println!("mode {} -> {}", prev_mode, new_mode),
        TrickPlayEvent::MetadataValid(valid) => info!("Metadata valid: {}", valid),
        TrickPlayEvent::FrameRendered { .. } => {}
    }));

    engine.prepare();
    engine.set_play_when_ready(true);

    let run_ms = steps.last().map_or(args.run_ms, |s| args.run_ms.max(s.at_ms + 500));
    let report = sim::run_script(&controller, &engine, &steps, run_ms);

    for outcome in &report.outcomes {
        match &outcome.mode_result {
            Some(Err(e)) => warn!("t={} {:?}: {}", outcome.step.at_ms, outcome.step.command, e),
            _ => println!(
                "t={:>6} {:<28} position {} ms",
                outcome.step.at_ms,
                format!("{:?}", outcome.step.command),
                outcome.position_ms
            ),
        }
    }
    println!(
        "final mode {} ({:?}), position {} ms, {} frames rendered",
        report.final_mode, report.final_state, report.final_position_ms, report.frames_rendered
    );
    println!(
        "video format {}, {} rebuffers, {} seeks served from buffer",
        report.video_format.as_deref().unwrap_or("-"),
        report.rebuffers,
        report.seek_buffer_hits
    );
    if !report.played_frames_ms.is_empty() {
        println!("last played frames (ms): {:?}", report.played_frames_ms);
    }

    controller.remove_player_reference();
    Ok(())
}
