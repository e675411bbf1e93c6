//! REPL – Read-Eval-Print Loop for the Inforoute 65 shell.
//!
//! Supported slash-commands:
//!   /status       – coordinator state
//!   /list         – every entity with its current state
//!   /refresh      – press the refresh button
//!   /options      – change the scan interval (options flow)
//!   /help         – show this list
//!   /quit | /exit – unload the entry and exit

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use inforoute_integration::{EntityView, EntryOptions, Integration, MIN_SCAN_INTERVAL, Projection};
use inforoute_runtime::RefreshOutcome;
use tokio::runtime::Handle;

use crate::config::{self, Config};

/// A parsed shell line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Status,
    List,
    Refresh,
    Options,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            "" => Command::Empty,
            "/status" => Command::Status,
            "/list" => Command::List,
            "/refresh" => Command::Refresh,
            "/options" => Command::Options,
            "/help" => Command::Help,
            "/quit" | "/exit" => Command::Quit,
            other => Command::Unknown(other.to_string()),
        }
    }
}

/// The loaded entry, shared between the shell and the Ctrl-C handler.
///
/// The shell runs on a plain thread; every async call goes through
/// [`Handle::block_on`].
pub struct Session {
    handle: Handle,
    integration: tokio::sync::Mutex<Option<Integration>>,
}

impl Session {
    pub fn new(integration: Integration, handle: Handle) -> Self {
        Self {
            handle,
            integration: tokio::sync::Mutex::new(Some(integration)),
        }
    }

    /// Run `f` against the loaded entry.  `None` once unloaded.
    fn with<R>(&self, f: impl FnOnce(&mut Integration) -> R) -> Option<R> {
        self.handle
            .block_on(async { self.integration.lock().await.as_mut().map(f) })
    }

    fn press_refresh(&self) -> Option<RefreshOutcome> {
        self.handle.block_on(async {
            let guard = self.integration.lock().await;
            match guard.as_ref() {
                Some(integration) => Some(integration.button().press().await),
                None => None,
            }
        })
    }

    /// Unload the entry.  Returns `false` when it was already unloaded or the
    /// timer did not stop cleanly.
    pub fn unload(&self) -> bool {
        self.handle.block_on(async {
            let taken = self.integration.lock().await.take();
            match taken {
                Some(integration) => integration.unload_entry().await,
                None => false,
            }
        })
    }
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(session: &Session, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "inforoute65>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        match Command::parse(&line) {
            Command::Empty => continue,
            Command::Status => cmd_status(session),
            Command::List => cmd_list(session),
            Command::Refresh => cmd_refresh(session),
            Command::Options => cmd_options(session),
            Command::Help => cmd_help(),
            Command::Quit => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            Command::Unknown(other) => {
                println!(
                    "{} '{}'. Type {} for available commands.",
                    "Unknown command:".red(),
                    other.yellow(),
                    "/help".bold()
                );
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "Inforoute 65 Commands".bold().underline());
    println!("  {}   – coordinator state", "/status".bold().cyan());
    println!("  {}     – entities and their states", "/list".bold().cyan());
    println!("  {}  – refresh now", "/refresh".bold().cyan());
    println!("  {}  – change the scan interval", "/options".bold().cyan());
    println!("  {}  – exit the CLI", "/quit  /exit".bold().cyan());
    println!();
}

fn cmd_status(session: &Session) {
    let shown = session.with(|integration| {
        let coordinator = integration.coordinator();
        let state = coordinator.state();

        println!("{}", "Coordinator".bold().underline());
        println!("  Name           : {}", coordinator.name().bold());
        println!(
            "  Scan interval  : {} min",
            integration.entry().options.scan_interval().to_string().yellow()
        );
        println!("  Road items     : {}", state.last_result.len());
        match state.last_update {
            Some(at) => println!(
                "  Last update    : {}",
                at.with_timezone(&chrono::Local)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
                    .green()
            ),
            None => println!("  Last update    : {}", "never".dimmed()),
        }
        match &state.last_error {
            Some(e) => println!("  Last error     : {}", e.to_string().red()),
            None => println!("  Last error     : {}", "none".green()),
        }
        println!(
            "  Refreshing     : {}",
            if state.refresh_in_flight { "yes".yellow() } else { "no".normal() }
        );
        println!("  Entities       : {}", integration.platform().len() + 1);
        println!("  Listeners      : {}", coordinator.listener_count());
        println!("  Coalesced      : {}", coordinator.coalesced_requests());
    });
    if shown.is_none() {
        println!("{}", "Entry is not loaded.".red());
    }
}

fn cmd_list(session: &Session) {
    let shown = session.with(|integration| {
        let platform = integration.platform();
        println!("{}", "Entities".bold().underline());

        let button = integration.button().render();
        println!("  {} {}", button.name.bold(), button.unique_id.dimmed());

        for device in platform.devices() {
            println!("  {} {}", "▸".cyan(), device.name.bold());
            for sensor in platform.sensors_for_device(device.id()) {
                let marker = if sensor.is_stale() {
                    " (stale)".yellow().to_string()
                } else {
                    String::new()
                };
                println!("      {}{}", describe_view(&sensor.render()), marker);
            }
        }
    });
    if shown.is_none() {
        println!("{}", "Entry is not loaded.".red());
    }
}

fn cmd_refresh(session: &Session) {
    print!("  Refreshing … ");
    io::stdout().flush().ok();
    match session.press_refresh() {
        Some(RefreshOutcome::Refreshed { items }) => {
            println!("{} ({} road item(s))", "OK".green(), items);
        }
        Some(RefreshOutcome::Coalesced) => {
            println!("{}", "joined the refresh already running".green());
        }
        Some(RefreshOutcome::Failed(e)) => {
            println!("{}: {}", "FAILED".red(), e);
            println!("  {}", "Previous data is still shown.".dimmed());
        }
        None => println!("{}", "entry is not loaded".red()),
    }
}

fn cmd_options(session: &Session) {
    println!("{}", "Options".bold().underline());
    let Some((current, entry_id)) = session.with(|integration| {
        let entry = integration.entry();
        (entry.options.scan_interval(), entry.entry_id.clone())
    }) else {
        println!("{}", "Entry is not loaded.".red());
        return;
    };
    let Some(options) = prompt_scan_interval(current) else {
        return;
    };

    if session
        .with(|integration| integration.update_options(options))
        .is_none()
    {
        println!("{}", "Entry is not loaded.".red());
        return;
    }

    // Start from the file so environment overrides are not persisted.
    let mut stored = match config::load() {
        Ok(Some(stored)) => stored,
        Ok(None) => Config {
            entry_id,
            ..Config::default()
        },
        Err(e) => {
            println!("{}: {}", "Error reading config".red(), e);
            return;
        }
    };
    stored.scan_interval = options.scan_interval();
    match config::save(&stored) {
        Ok(()) => println!(
            "{} {}",
            "✓ Options saved to".green(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// One `/list` line: `name = state`, with the icon when there is one.
fn describe_view(view: &EntityView) -> String {
    let state = view.state.as_deref().unwrap_or("unknown");
    match view.icon {
        Some(icon) => format!("{} = {} {}", view.name, state.green(), icon.dimmed()),
        None => format!("{} = {}", view.name, state.green()),
    }
}

/// Prompt for a scan interval until it validates.  An empty answer keeps
/// `current`; `None` means stdin closed.
pub fn prompt_scan_interval(current: u32) -> Option<EntryOptions> {
    loop {
        let raw = prompt_str(
            &format!("  Scan interval in minutes, at least {MIN_SCAN_INTERVAL} [{current}]: "),
            &current.to_string(),
        )?;
        let minutes = match raw.parse::<u32>() {
            Ok(minutes) => minutes,
            Err(_) => {
                println!("  {} '{}' is not a number of minutes", "Warning:".yellow(), raw);
                continue;
            }
        };
        match EntryOptions::new(minutes) {
            Ok(options) => return Some(options),
            Err(e) => println!("  {} {}", "Warning:".yellow(), e),
        }
    }
}

/// Prompt for a string value.  Returns `default` when the user presses Enter
/// and `None` on end of input.
pub fn prompt_str(msg: &str, default: &str) -> Option<String> {
    print!("{}", msg);
    io::stdout().flush().ok();

    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => {
            let trimmed = line.trim().to_string();
            if trimmed.is_empty() {
                Some(default.to_string())
            } else {
                Some(trimmed)
            }
        }
    }
}
