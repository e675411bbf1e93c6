//! `inforoute-cli` – Inforoute 65 command line host.
//!
//! This binary hosts one config entry of the integration.  It:
//!
//! 1. Checks for `~/.inforoute65/config.toml`; runs a **First-Run Wizard**
//!    when the file is absent.
//! 2. Sets the entry up: first fetch of the road feed, sensors, refresh
//!    button, interval timer.
//! 3. Prints refresh and lifecycle events from the event bus as they happen.
//! 4. Drops the user into an **interactive REPL** with slash-commands
//!    (`/status`, `/list`, `/refresh`, `/options`, `/help`).
//! 5. Intercepts **Ctrl-C** to unload the entry and exit.

mod config;
mod repl;

use colored::Colorize;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, warn};

use inforoute_integration::{EntityLayout, Integration};
use inforoute_middleware::{EventBus, Topic, TopicReceiver};
use inforoute_runtime::telemetry::init_tracing;
use inforoute_types::{Event, EventPayload};

fn main() -> ExitCode {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG (default "info"), INFOROUTE_LOG_FORMAT=json, and OTLP export
    // when OTEL_EXPORTER_OTLP_ENDPOINT is set.  User-facing output still
    // uses println!.
    let _telemetry = init_tracing("inforoute65");

    print_banner();

    // ── Configuration / First-Run Wizard ──────────────────────────────────
    let mut cfg = match config::load() {
        Ok(None) => match run_first_run_wizard() {
            Some(cfg) => cfg,
            None => return ExitCode::FAILURE,
        },
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };
    // Entry id persistence and INFOROUTE_* overrides, whatever the source.
    if let Err(e) = config::finalize(&mut cfg) {
        println!("{}: {}", "Error saving config".red(), e);
    }

    let entry = match cfg.entry() {
        Ok(entry) => entry,
        Err(e) => {
            println!("{}: {}", "Invalid configuration".red(), e);
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to start the Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    // ── Event printer ─────────────────────────────────────────────────────
    // Subscribed before setup so the EntryLoaded event is seen.
    let bus = EventBus::default();
    runtime.spawn(print_events(
        bus.subscribe_to(Topic::Refresh),
        bus.subscribe_to(Topic::Lifecycle),
    ));

    // ── Entry setup ───────────────────────────────────────────────────────
    println!(
        "\n  Fetching road conditions from {} …",
        entry.api_url.dimmed()
    );
    let integration = match runtime.block_on(Integration::setup_entry(entry, bus)) {
        Ok(integration) => integration,
        Err(e) => {
            println!("  {}: {}", "Setup failed".red().bold(), e);
            println!("  Check your network connection and try again.");
            return ExitCode::FAILURE;
        }
    };
    println!(
        "  {} {} road section(s), refreshed every {} min",
        "✓".green().bold(),
        integration.platform().devices().len(),
        integration.entry().options.scan_interval()
    );

    let session = Arc::new(repl::Session::new(integration, runtime.handle().clone()));

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    let session_ctrlc = session.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – unloading entry …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
        if session_ctrlc.unload() {
            println!("{}", "  ✓ Entry unloaded.".green());
        }
        println!("{}", "  ✓ Exiting Inforoute 65.".green());
        std::process::exit(0);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    // ── Interactive REPL ──────────────────────────────────────────────────
    repl::run(&session, shutdown);

    session.unload();
    ExitCode::SUCCESS
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> Option<config::Config> {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║    Inforoute 65 First-Run Wizard     ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up Inforoute 65.\n");

    let mut cfg = config::Config::default();

    let options = repl::prompt_scan_interval(cfg.scan_interval)?;
    cfg.scan_interval = options.scan_interval();

    println!("  Which entities would you like per road section?");
    println!("    1) Circulation, location and diagnostics sensors  (default)");
    println!("    2) One combined section sensor");
    let choice = repl::prompt_str("  Enter choice [1]: ", "1")?;
    cfg.layout = match choice.trim() {
        "2" => EntityLayout::Combined,
        _ => EntityLayout::Specialized,
    };

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    Some(cfg)
}

// ─────────────────────────────────────────────────────────────────────────────
// Event printer
// ─────────────────────────────────────────────────────────────────────────────

async fn print_events(mut refresh: TopicReceiver, mut lifecycle: TopicReceiver) {
    loop {
        let received = tokio::select! {
            event = refresh.recv() => event,
            event = lifecycle.recv() => event,
        };
        match received {
            Ok(event) => println!("\n  {} {}", "·".dimmed(), describe(&event).dimmed()),
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "event printer lagged");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn describe(event: &Event) -> String {
    let at = event.timestamp.with_timezone(&chrono::Local).format("%H:%M:%S");
    match &event.payload {
        EventPayload::RefreshSucceeded { items } => {
            format!("[{at}] road feed refreshed: {items} item(s)")
        }
        EventPayload::RefreshFailed { cause, stale } => {
            if *stale {
                format!("[{at}] refresh failed ({cause}); keeping previous data")
            } else {
                format!("[{at}] refresh failed ({cause})")
            }
        }
        EventPayload::EntryLoaded { entry_id, entities } => {
            format!("[{at}] entry {entry_id} loaded with {entities} entities")
        }
        EventPayload::EntryUnloaded { entry_id } => format!("[{at}] entry {entry_id} unloaded"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   ____       __                        __         ____ ____"#.bold().cyan());
    println!("{}", r#"  /  _/___   / _/___  ____ ___  __ __ / /_ ___   / __// __/"#.bold().cyan());
    println!("{}", r#" _/ / / _ \ / _// _ \/ __// _ \/ // // __// -_) / _ \/__ \ "#.bold().cyan());
    println!("{}", r#"/___//_//_//_/  \___/_/   \___/\_,_/ \__/ \__/  \___/____/ "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Inforoute 65".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Road conditions of the Hautes-Pyrénées");
    println!();
}
