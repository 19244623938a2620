pub mod pit_window;
pub mod settings;
mod utils;

use anyhow::Context;
use log::{error, info, warn};
use pit_window::{
    commands::{execute, parse_command, HELP_TEXT},
    PitWindowController, PitWindowEvent,
};
use settings::SettingsStore;
use tokio::io::{AsyncBufReadExt, BufReader};

pub(crate) struct AppState {
    pub(crate) controller: PitWindowController,
    pub(crate) settings: SettingsStore,
}

pub fn run() {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("PitStopper starting up...");

    if let Err(err) = run_console() {
        error!("{:#}", err);
        std::process::exit(1);
    }
}

fn run_console() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;

    runtime.block_on(async {
        let settings = SettingsStore::new(SettingsStore::default_path())?;
        if !settings.has_settings() {
            warn!(
                "No saved pit window settings in {}; using defaults",
                settings.path().display()
            );
        }

        let controller = PitWindowController::new(&settings.pit_window())?;
        let state = AppState {
            controller,
            settings,
        };

        let display = tokio::spawn(print_alerts(state.controller.subscribe()));
        state.controller.start().await;
        println!("{}", HELP_TEXT);

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line.context("Failed to read console input")? else {
                        break;
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    match parse_command(&line) {
                        Ok(command) => match execute(&state, command).await {
                            Ok(Some(output)) => println!("{}", output),
                            Ok(None) => break,
                            Err(e) => println!("error: {}", e),
                        },
                        Err(e) => println!("error: {}", e),
                    }
                }
                _ = &mut ctrl_c => {
                    info!("Interrupted, shutting down");
                    break;
                }
            }
        }

        state.controller.stop().await;
        display.abort();
        Ok::<(), anyhow::Error>(())
    })
}

/// Prints the events a driver needs to see; ticks only go to the log.
async fn print_alerts(mut events: tokio::sync::broadcast::Receiver<PitWindowEvent>) {
    use tokio::sync::broadcast::error::RecvError;

    loop {
        match events.recv().await {
            Ok(PitWindowEvent::StateChanged { snapshot, .. }) => {
                let banner = match snapshot.state {
                    pit_window::AlertState::OnAlert => ">>> PIT WINDOW OPEN <<<",
                    pit_window::AlertState::Idle => "--- pit window idle ---",
                };
                println!("{} {}", banner, snapshot.summary());
            }
            Ok(PitWindowEvent::Acknowledged { window, .. }) => {
                println!("pit window #{} silenced until it closes", window + 1);
            }
            Ok(PitWindowEvent::Reconfigured(settings)) => {
                println!("schedule updated, race start {}", settings.race_start_formatted());
            }
            Ok(PitWindowEvent::Tick(_)) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => break,
        }
    }
}
