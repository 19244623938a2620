use crate::{
    pit_window::{PitWindowController, PitWindowSnapshot},
    settings::{PitWindowSettings, SettingsStore},
    AppState,
};

pub const HELP_TEXT: &str = "\
commands:
  ack | a                      acknowledge the alerting pit window
  status | s                   show the current dashboard line
  json                         current snapshot as JSON
  config | c                   show pit window settings
  set HH:MM OPENS DURATION     save new settings (race start, minutes until first window, window minutes)
  help | h                     this text
  quit | q                     exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Acknowledge,
    Status,
    Json,
    ShowConfig,
    SetConfig(PitWindowSettings),
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<ConsoleCommand, String> {
    let mut parts = line.split_whitespace();
    let Some(keyword) = parts.next() else {
        return Err("empty command".into());
    };

    let command = match keyword.to_ascii_lowercase().as_str() {
        "ack" | "a" => ConsoleCommand::Acknowledge,
        "status" | "s" => ConsoleCommand::Status,
        "json" => ConsoleCommand::Json,
        "config" | "c" => ConsoleCommand::ShowConfig,
        "help" | "h" | "?" => ConsoleCommand::Help,
        "quit" | "q" | "exit" => ConsoleCommand::Quit,
        "set" => {
            let args: Vec<&str> = parts.by_ref().collect();
            let [race_start, opens_after, duration] = args.as_slice() else {
                return Err("usage: set HH:MM OPENS DURATION".into());
            };
            let (race_start_hour, race_start_minute) = parse_race_start(race_start)?;
            ConsoleCommand::SetConfig(PitWindowSettings {
                race_start_hour,
                race_start_minute,
                pit_window_opens_after: parse_minutes("OPENS", opens_after)?,
                pit_window_duration: parse_minutes("DURATION", duration)?,
            })
        }
        other => return Err(format!("unknown command '{}', try 'help'", other)),
    };

    if parts.next().is_some() {
        return Err(format!("unexpected arguments after '{}'", keyword));
    }
    Ok(command)
}

fn parse_race_start(value: &str) -> Result<(u32, u32), String> {
    let (hour, minute) = value
        .split_once(':')
        .ok_or_else(|| format!("race start '{}' is not HH:MM", value))?;
    let hour = hour
        .parse()
        .map_err(|_| format!("race start hour '{}' is not a number", hour))?;
    let minute = minute
        .parse()
        .map_err(|_| format!("race start minute '{}' is not a number", minute))?;
    Ok((hour, minute))
}

fn parse_minutes(name: &str, value: &str) -> Result<u32, String> {
    value
        .parse()
        .map_err(|_| format!("{} '{}' is not a whole number of minutes", name, value))
}

pub async fn get_pit_window_state(
    controller: &PitWindowController,
) -> Result<PitWindowSnapshot, String> {
    Ok(controller.snapshot().await)
}

pub async fn acknowledge_alert(
    controller: &PitWindowController,
) -> Result<PitWindowSnapshot, String> {
    Ok(controller.acknowledge().await)
}

pub fn get_pit_window_settings(settings: &SettingsStore) -> Result<PitWindowSettings, String> {
    Ok(settings.pit_window())
}

pub async fn set_pit_window_settings(
    controller: &PitWindowController,
    store: &SettingsStore,
    settings: PitWindowSettings,
) -> Result<(), String> {
    store
        .update_pit_window(settings)
        .map_err(|e| format!("{:#}", e))?;
    controller
        .reconfigure(&settings)
        .await
        .map_err(|e| format!("{:#}", e))
}

/// Runs one console command. `Ok(None)` means the console should exit.
pub(crate) async fn execute(
    state: &AppState,
    command: ConsoleCommand,
) -> Result<Option<String>, String> {
    let output = match command {
        ConsoleCommand::Acknowledge => {
            let snapshot = acknowledge_alert(&state.controller).await?;
            format!("acknowledged | {}", snapshot.summary())
        }
        ConsoleCommand::Status => get_pit_window_state(&state.controller).await?.summary(),
        ConsoleCommand::Json => {
            let snapshot = get_pit_window_state(&state.controller).await?;
            serde_json::to_string_pretty(&snapshot).map_err(|e| e.to_string())?
        }
        ConsoleCommand::ShowConfig => {
            describe_settings(&get_pit_window_settings(&state.settings)?)
        }
        ConsoleCommand::SetConfig(settings) => {
            set_pit_window_settings(&state.controller, &state.settings, settings).await?;
            format!("saved | {}", describe_settings(&settings))
        }
        ConsoleCommand::Help => HELP_TEXT.to_string(),
        ConsoleCommand::Quit => return Ok(None),
    };
    Ok(Some(output))
}

fn describe_settings(settings: &PitWindowSettings) -> String {
    let cycle = settings
        .build_scheduler()
        .map(|scheduler| format!("every {} min", scheduler.cycle_minutes()))
        .unwrap_or_else(|e| e.to_string());
    format!(
        "race start {}, first window after {} min, {} min windows, {}",
        settings.race_start_formatted(),
        settings.pit_window_opens_after,
        settings.pit_window_duration,
        cycle
    )
}
