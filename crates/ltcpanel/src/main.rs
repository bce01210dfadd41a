use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use clap::Parser;
use ltcpanel_core::config::DEFAULT_CONFIG_FILE;
use ltcpanel_core::{
    probe_program, ConfigManager, ControlEvent, ControlFacade, DisplayId, FrameRate, LtcError,
    Settings, SimulatedDecoder, SimulatedEncoder,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

mod commands;
mod terminal;

use commands::{parse_command, Command, HELP};
use terminal::TerminalMirror;

const TOOL_CHECK_TIMEOUT: Duration = Duration::from_secs(3);
const INSTALL_HINT: &str = "sudo apt-get install ltc-tools";

/// Read incoming LTC and generate outgoing LTC from the terminal.
#[derive(Parser, Debug)]
#[command(name = "ltcpanel")]
#[command(about = "LTC timecode reader/generator control panel")]
struct Args {
    /// Settings file, created with defaults if missing
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Frame rate (24, 25, 29.97 or 30)
    #[arg(long, value_parser = parse_frame_rate)]
    frame_rate: Option<FrameRate>,

    /// LTC decoder program (default: ltcdump)
    #[arg(long)]
    decoder: Option<String>,

    /// LTC encoder program (default: ltcgen)
    #[arg(long)]
    encoder: Option<String>,

    /// Show the timecode mirror at startup
    #[arg(long)]
    display: bool,

    /// Run against in-process tools; generated timecode loops back as input
    #[arg(long)]
    simulate: bool,

    /// Skip checking that the decoder and encoder are installed
    #[arg(long)]
    skip_tool_check: bool,

    /// Write the overridden settings back to the settings file
    #[arg(long)]
    save: bool,
}

fn parse_frame_rate(s: &str) -> Result<FrameRate, String> {
    FrameRate::parse(s).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let settings = load_settings(&args)?;

    let engine = if args.simulate {
        log::info!("Running with simulated LTC tools");
        let encoder = SimulatedEncoder::new();
        let decoder = SimulatedDecoder::new();
        let engine = ControlFacade::init(&settings, Arc::new(encoder), Arc::new(decoder.clone()));
        spawn_loopback(&engine, decoder);
        engine
    } else {
        if !args.skip_tool_check {
            check_tools(&settings).await?;
        }
        ControlFacade::with_system_tools(&settings)
    };

    spawn_status_printer(&engine);

    println!("ltcpanel at {}. Type 'help' for commands.", settings.frame_rate);

    let mut mirror = None;
    if settings.display_enabled {
        mirror = Some(open_mirror(&engine).await?);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match parse_command(&line, engine.frame_rate()) {
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(command)) => execute(&engine, command, &mut mirror).await?,
                    Ok(None) => {}
                    Err(e) => println!("{}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    if let Some((_, mirror)) = mirror.take() {
        mirror.close();
    }
    engine.shutdown().await?;
    Ok(())
}

fn load_settings(args: &Args) -> Result<Settings, anyhow::Error> {
    let mut config = ConfigManager::new(Some(args.config.clone()));
    let mut settings = config.load()?;
    log::info!("Loaded settings from {}", config.config_path().display());

    if let Some(frame_rate) = args.frame_rate {
        settings.frame_rate = frame_rate;
    }
    if let Some(decoder) = &args.decoder {
        settings.decoder_program = decoder.clone();
    }
    if let Some(encoder) = &args.encoder {
        settings.encoder_program = encoder.clone();
    }
    if args.display {
        settings.display_enabled = true;
    }

    if args.save {
        config.update_settings(settings.clone())?;
        log::info!("Saved settings to {}", config.config_path().display());
    } else {
        ConfigManager::validate_settings(&settings)
            .map_err(|errors| anyhow!("Invalid settings: {}", errors.join(", ")))?;
    }
    Ok(settings)
}

async fn check_tools(settings: &Settings) -> Result<(), anyhow::Error> {
    let mut missing = Vec::new();
    for program in [&settings.decoder_program, &settings.encoder_program] {
        if !probe_program(program, TOOL_CHECK_TIMEOUT).await {
            missing.push(program.as_str());
        }
    }

    if missing.is_empty() {
        return Ok(());
    }

    eprintln!("Missing LTC tools: {}", missing.join(", "));
    eprintln!("Install them with: {}", INSTALL_HINT);
    Err(anyhow!("required programs not found: {}", missing.join(", ")))
}

async fn execute(
    engine: &ControlFacade,
    command: Command,
    mirror: &mut Option<(DisplayId, TerminalMirror)>,
) -> Result<(), anyhow::Error> {
    let result = match command {
        Command::StartNow => engine.request_start_current_clock().await.map(drop),
        Command::StartZero => engine.request_start_from_zero().await.map(drop),
        Command::StartAt(at) => engine.request_start_custom(&at.to_string()).await.map(drop),
        Command::Pause => engine.request_pause().await.map(drop),
        Command::Resume => engine.request_resume().await.map(drop),
        Command::Stop => engine.request_stop().await,
        Command::ToggleDisplay => {
            match mirror.take() {
                Some((id, open)) => {
                    engine.detach_display(id).await?;
                    open.close();
                }
                None => *mirror = Some(open_mirror(engine).await?),
            }
            Ok(())
        }
        Command::Status => {
            let snapshot = engine.snapshot().await?;
            let incoming = snapshot
                .reader
                .last_timecode
                .map(|tc| tc.to_string())
                .unwrap_or_else(|| "none".to_string());
            println!(
                "Incoming: {} ({}) | Decoder: {} | Generator: {}{}",
                incoming,
                if snapshot.reader.signal_present { "signal" } else { "no signal" },
                if snapshot.decoder_running { "running" } else { "stopped" },
                snapshot.generator,
                snapshot
                    .generated_timecode
                    .or(snapshot.paused_timecode)
                    .map(|tc| format!(" at {}", tc))
                    .unwrap_or_default(),
            );
            Ok(())
        }
        Command::Help => {
            println!("{}", HELP);
            Ok(())
        }
        // handled by the input loop
        Command::Quit => Ok(()),
    };

    match result {
        Ok(()) => Ok(()),
        Err(LtcError::EngineClosed) => Err(LtcError::EngineClosed.into()),
        Err(e) if e.is_ignorable() => {
            log::debug!("{}", e);
            Ok(())
        }
        // already reported through the event stream
        Err(_) => Ok(()),
    }
}

async fn open_mirror(engine: &ControlFacade) -> Result<(DisplayId, TerminalMirror), LtcError> {
    let mirror = TerminalMirror::spawn();
    let id = engine.attach_display(mirror.sink()).await?;
    Ok((id, mirror))
}

fn spawn_status_printer(engine: &ControlFacade) {
    let mut events = engine.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(text) = event.status_text() {
                        println!("{}", text);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    log::debug!("Status printer skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// Feed generated timecode back into the simulated decoder, as if the
/// encoder output were patched into the decoder input.
fn spawn_loopback(engine: &ControlFacade, decoder: SimulatedDecoder) {
    let mut events = engine.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ControlEvent::GeneratedTimecode(tc)) => {
                    decoder.send_line(&tc.to_string());
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(config: &std::path::Path, extra: &[&str]) -> Args {
        let config = config.to_string_lossy().into_owned();
        let mut argv = vec!["ltcpanel", "--config", config.as_str()];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_overrides_are_saved_on_request() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ltcpanel.json");

        let settings = load_settings(&args(&path, &["--frame-rate", "30", "--save"])).unwrap();
        assert_eq!(settings.frame_rate, FrameRate::Fps30);

        let mut reloaded = ConfigManager::new(Some(path.clone()));
        assert_eq!(reloaded.load().unwrap().frame_rate, FrameRate::Fps30);

        let settings = load_settings(&args(&path, &["--frame-rate", "24"])).unwrap();
        assert_eq!(settings.frame_rate, FrameRate::Fps24);
        assert_eq!(reloaded.load().unwrap().frame_rate, FrameRate::Fps30);
    }

    #[test]
    fn test_invalid_override_is_not_saved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ltcpanel.json");

        assert!(load_settings(&args(&path, &["--decoder", "", "--save"])).is_err());

        let mut reloaded = ConfigManager::new(Some(path));
        assert_eq!(reloaded.load().unwrap(), Settings::default());
    }
}
