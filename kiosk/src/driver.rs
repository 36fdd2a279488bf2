//! Headless line-oriented driver
//!
//! Reads one command per line from stdin and drives the kiosk with it.
//! Anything that is not a built-in command is treated as a flow event name,
//! so `start`, `setup_complete`, `capture-complete` all work.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::booth::{BoothConfig, BoothMode};
use crate::flow::{ContextUpdate, MachineMode};
use crate::idle::{IdleEvent, IdleWatcher};
use crate::kiosk::Kiosk;
use crate::settings::{FlowSettings, GlobalSettings, KioskSettings, SettingsManager};
use crate::sync::{BoothSync, SimulatedBackend};
use crate::utils::error::{AppError, AppResult};

/// Parsed driver command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the kiosk status as JSON
    Status,
    /// Reset the flow to IDLE
    Reset,
    /// Force the flow into ERROR with a message
    Error(String),
    /// Switch machine mode in the flow context
    Mode(MachineMode),
    /// Toggle the QR screen
    Qr(bool),
    /// Select the active grid template
    Grid(String),
    /// List grid templates, optionally by still count
    Grids(Option<u32>),
    /// Queue a config on the simulated backend, as an admin would
    PushConfig {
        grid_id: String,
        mode: BoothMode,
        price: Option<u32>,
    },
    /// Register user activity
    Touch,
    Help,
    Quit,
    /// Any other word is sent as a flow event
    Event(String),
}

impl Command {
    /// Parse one input line, `None` for blank lines
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Ok(None);
        };
        let rest: Vec<&str> = words.collect();

        let command = match head.to_ascii_lowercase().as_str() {
            "status" => Self::Status,
            "reset" => Self::Reset,
            "error" => Self::Error(if rest.is_empty() {
                "operator error".to_string()
            } else {
                rest.join(" ")
            }),
            "mode" => Self::Mode(match rest.first().copied() {
                Some(m) if m.eq_ignore_ascii_case("event") => MachineMode::Event,
                Some(m) if m.eq_ignore_ascii_case("normal") => MachineMode::Normal,
                _ => return Err("usage: mode normal|event".to_string()),
            }),
            "qr" => Self::Qr(match rest.first().copied() {
                Some("on") => true,
                Some("off") => false,
                _ => return Err("usage: qr on|off".to_string()),
            }),
            "grid" => match rest.first() {
                Some(id) => Self::Grid(id.to_string()),
                None => return Err("usage: grid <template-id>".to_string()),
            },
            "grids" => Self::Grids(match rest.first() {
                Some(n) => Some(n.parse().map_err(|_| format!("invalid still count: {n}"))?),
                None => None,
            }),
            "push-config" => {
                let Some(grid_id) = rest.first() else {
                    return Err("usage: push-config <grid> [normal|event] [price]".to_string());
                };
                let mode = match rest.get(1).copied() {
                    Some(m) if m.eq_ignore_ascii_case("event") => BoothMode::Event,
                    _ => BoothMode::Normal,
                };
                let price = match rest.get(2) {
                    Some(p) => Some(p.parse().map_err(|_| format!("invalid price: {p}"))?),
                    None => None,
                };
                Self::PushConfig {
                    grid_id: grid_id.to_string(),
                    mode,
                    price,
                }
            }
            "touch" => Self::Touch,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            _ => Self::Event(head.to_string()),
        };
        Ok(Some(command))
    }
}

const HELP: &str = "\
commands:
  <event>                       start, setup_complete, capture_complete, payment_complete,
                                printing_complete, qr_complete, skip_qr, thank_you_complete, cancel
  error [message]               force ERROR
  reset                         back to IDLE
  mode normal|event             change machine mode (saved to settings)
  qr on|off                     toggle QR screen (saved to settings)
  grid <id>                     select grid template
  grids [stills]                list grid templates
  push-config <grid> [mode] [price]
                                simulate an admin config push
  status | touch | help | quit";

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => warn!(error = %e, "Failed to render output"),
    }
}

/// Executes commands against a kiosk
struct Driver {
    kiosk: Arc<Kiosk>,
    backend: Arc<SimulatedBackend>,
    idle: Option<IdleWatcher>,
    settings: GlobalSettings,
    settings_path: PathBuf,
}

impl Driver {
    /// Returns `false` when the driver should exit
    fn execute(&self, command: Command) -> bool {
        if let Some(idle) = &self.idle {
            idle.touch();
        }

        match command {
            Command::Status => print_json(&self.kiosk.status()),
            Command::Reset => {
                self.kiosk.reset();
                println!("{}", self.kiosk.flow().state());
            }
            Command::Error(message) => {
                self.report(self.kiosk.dispatch("error", Some(message)).map_err(AppError::from));
            }
            Command::Mode(mode) => {
                match self.set_flow(ContextUpdate::mode(mode), |flow| flow.mode = mode) {
                    Ok(_) => println!("mode {mode:?}"),
                    Err(e) => self.print_error(&e),
                }
            }
            Command::Qr(enabled) => {
                match self.set_flow(ContextUpdate::qr_enabled(enabled), |flow| {
                    flow.qr_enabled = enabled
                }) {
                    Ok(_) => println!("qr {}", if enabled { "on" } else { "off" }),
                    Err(e) => self.print_error(&e),
                }
            }
            Command::Grid(id) => match self.kiosk.grid().set_active(&id) {
                Ok(decision) => println!("{decision:?}"),
                Err(e) => self.print_error(&AppError::from(e)),
            },
            Command::Grids(still_count) => {
                let templates = match still_count {
                    Some(n) => self.kiosk.grid().templates_for_still_count(n),
                    None => self.kiosk.grid().templates(),
                };
                let active = self.kiosk.grid().active_id();
                for t in templates {
                    let marker = if active.as_deref() == Some(t.id.as_str()) { "*" } else { " " };
                    println!(
                        "{marker} {:<20} {:<20} stills={} price={}{}",
                        t.id,
                        t.name,
                        t.still_count,
                        t.price,
                        if t.is_enabled { "" } else { " (disabled)" }
                    );
                }
            }
            Command::PushConfig {
                grid_id,
                mode,
                price,
            } => match self.kiosk.booth().booth_id() {
                Some(booth_id) => {
                    let mut config = BoothConfig::default_for(booth_id);
                    config.active_grid_id = grid_id;
                    config.mode = mode;
                    if let Some(price) = price {
                        config.price = price;
                    }
                    config.updated_by = Some("console".to_string());
                    self.backend.push_config(config);
                    println!("config queued on backend");
                }
                None => println!("booth not registered"),
            },
            Command::Touch => {}
            Command::Help => println!("{HELP}"),
            Command::Quit => return false,
            Command::Event(name) => {
                self.report(self.kiosk.dispatch(&name, None).map_err(AppError::from));
            }
        }
        true
    }

    /// Change the live flow context and persist it as the startup default
    ///
    /// Rejected while a customer is in session; nothing is saved then.
    fn set_flow(
        &self,
        update: ContextUpdate,
        edit: impl FnOnce(&mut FlowSettings),
    ) -> AppResult<bool> {
        let changed = self.kiosk.update_context(update)?;
        self.settings.modify(|settings| edit(&mut settings.flow));
        SettingsManager::save_to(&self.settings_path, &self.settings.get())?;
        Ok(changed)
    }

    fn report(&self, result: AppResult<crate::flow::MachineState>) {
        match result {
            Ok(state) => println!("{state}"),
            Err(e) => self.print_error(&e),
        }
    }

    fn print_error(&self, error: &AppError) {
        let ctx = error.context();
        match ctx.recovery_hint {
            Some(hint) => println!("! {} ({})", ctx.message, hint),
            None => println!("! {}", ctx.message),
        }
    }

    fn on_idle(&self, event: IdleEvent) {
        match event {
            IdleEvent::Warning { seconds_left } => println!("idle: {seconds_left}s left"),
            IdleEvent::Active => println!("idle: activity detected"),
            IdleEvent::TimedOut => {
                if let Some(state) = self.kiosk.handle_idle_timeout() {
                    println!("idle timeout -> {state}");
                }
            }
        }
    }
}

/// Run the kiosk until stdin closes or `quit` is entered
///
/// # Errors
/// Fails if the kiosk storage cannot be opened or the configured identity is invalid.
pub async fn run(settings: KioskSettings, settings_path: PathBuf) -> AppResult<()> {
    let kiosk = Arc::new(Kiosk::open(&settings)?);
    let backend = Arc::new(SimulatedBackend::new());

    let sync = settings
        .sync
        .enabled
        .then(|| BoothSync::start(Arc::clone(&backend), Arc::clone(&kiosk), settings.sync.options()));

    let (idle, mut idle_rx) = if settings.idle.enabled {
        let (watcher, rx) = IdleWatcher::start(settings.idle.options());
        watcher.set_enabled(!kiosk.flow().state().is_idle());
        (Some(watcher), Some(rx))
    } else {
        (None, None)
    };

    let (flow_sub, mut flow_rx) = kiosk.flow().subscribe_channel();
    let driver = Driver {
        kiosk: Arc::clone(&kiosk),
        backend,
        idle,
        settings: GlobalSettings::new(settings),
        settings_path,
    };

    info!(state = %kiosk.flow().state(), "Kiosk driver running, type 'help' for commands");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "Failed to read stdin");
                        break;
                    }
                };
                match Command::parse(&line) {
                    Ok(Some(command)) => {
                        if !driver.execute(command) {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(usage) => println!("{usage}"),
                }
            }
            Some(change) = flow_rx.recv() => {
                if let (Some(idle), Some(entered)) = (&driver.idle, change.entered()) {
                    idle.set_enabled(!entered.is_idle());
                }
            }
            Some(event) = async { match idle_rx.as_mut() {
                Some(rx) => rx.recv().await,
                None => std::future::pending().await,
            } } => {
                driver.on_idle(event);
            }
        }
    }

    kiosk.flow().unsubscribe(flow_sub);
    if let Some(sync) = sync {
        sync.shutdown().await;
    }
    info!("Kiosk driver stopped");
    Ok(())
}
