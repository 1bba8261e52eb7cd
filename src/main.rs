use anyhow::Context;
use clap::Parser;
use slot_watcher::core::dispatch::Dispatcher;
use slot_watcher::core::intro::plan_introductions;
use slot_watcher::core::messages;
use slot_watcher::domain::ports::Notifier;
use slot_watcher::server::{self, AppState, LaunchFuture, Launcher};
use slot_watcher::utils::{logger, monitor::SystemMonitor, validation::Validate};
use slot_watcher::{
    CliConfig, LoopSettings, PollingLoop, PortalSession, QueryRegistry, TwilioNotifier,
    WatchConfig,
};
use std::sync::Arc;

const CONFIG_EXIT_CODE: i32 = 2;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliConfig::parse();

    if args.json_logs {
        logger::init_json_logger(args.verbose);
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("🚀 Starting slot watcher");
    tracing::info!("📁 Loading configuration from: {}", args.config);

    let config = match WatchConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 {}", e.recovery_suggestion());
            std::process::exit(CONFIG_EXIT_CODE);
        }
    };

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        eprintln!("❌ {}", e);
        eprintln!("💡 {}", e.recovery_suggestion());
        std::process::exit(CONFIG_EXIT_CODE);
    }

    tracing::info!("✅ Configuration loaded and validated successfully");
    display_config_summary(&config)?;

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - nobody will be contacted");
        perform_dry_run(&config)?;
        return Ok(());
    }

    let timeout = config.loop_settings()?.operation_timeout;
    let notifier: Arc<dyn Notifier> = Arc::new(
        TwilioNotifier::new(config.twilio.clone(), timeout).context("building Twilio client")?,
    );
    let config = Arc::new(config);
    let launcher = make_launcher(Arc::clone(&config), notifier, args.monitor);

    if args.serve {
        let port = args.port.unwrap_or_else(|| config.server_port());
        let state = AppState::new(launcher, config.voice_message());
        server::serve(state, port)
            .await
            .with_context(|| format!("serving on port {}", port))?;
    } else {
        launcher().await;
    }

    Ok(())
}

/// The launcher never returns normally: the loop only ends on a fatal error,
/// which terminates the process.
fn make_launcher(config: Arc<WatchConfig>, notifier: Arc<dyn Notifier>, monitor: bool) -> Launcher {
    Arc::new(move || -> LaunchFuture {
        let config = Arc::clone(&config);
        let notifier = Arc::clone(&notifier);
        let run: LaunchFuture = Box::pin(async move {
            let (registry, settings, session) = match assemble(&config) {
                Ok(parts) => parts,
                Err(e) => {
                    tracing::error!("❌ Could not assemble watcher: {:#}", e);
                    std::process::exit(CONFIG_EXIT_CODE);
                }
            };

            introduce_contacts(&config, &registry, &settings, Arc::clone(&notifier)).await;

            let watcher = PollingLoop::new(session, registry, notifier, settings)
                .with_monitor(SystemMonitor::new(monitor));
            let fatal = watcher.run().await;

            tracing::error!(
                "❌ Watcher stopped: {} (Severity: {:?})",
                fatal,
                fatal.severity()
            );
            eprintln!("❌ {}", fatal.user_friendly_message());
            std::process::exit(fatal.exit_code());
        });
        run
    })
}

fn assemble(config: &WatchConfig) -> anyhow::Result<(QueryRegistry, LoopSettings, PortalSession)> {
    let registry = QueryRegistry::new(config.queries(chrono::Utc::now())?);
    let settings = config.loop_settings()?;
    let session = PortalSession::new(config.portal.clone(), settings.operation_timeout)
        .context("building portal client")?;
    Ok((registry, settings, session))
}

/// Texts every contact that has not heard from the watcher before.
async fn introduce_contacts(
    config: &WatchConfig,
    registry: &QueryRegistry,
    settings: &LoopSettings,
    notifier: Arc<dyn Notifier>,
) {
    let already = match config.introduced_contacts() {
        Ok(set) => set,
        Err(e) => {
            tracing::warn!("Skipping introductions: {}", e);
            return;
        }
    };
    tracing::info!("Introduced contacts at start: {}", already.len());

    let (plan, introduced) = plan_introductions(registry.all_queries(), already);
    if plan.is_empty() {
        return;
    }

    let mut dispatcher = Dispatcher::new(notifier);
    let text = messages::introduction(&settings.name);
    for intro in &plan {
        tracing::info!("Introducing {} ({:?})", intro.contact, intro.kind);
        dispatcher.text(&intro.contact, text.clone());
    }
    dispatcher.flush(settings.shutdown_grace).await;

    let updated: Vec<&str> = introduced.iter().map(|p| p.as_str()).collect();
    tracing::info!("Introduced contacts at end: {:?}", updated);
    tracing::warn!("*** Remember to update watcher.introduced_contacts in the config ***");
}

fn display_config_summary(config: &WatchConfig) -> anyhow::Result<()> {
    let settings = config.loop_settings()?;
    tracing::info!("📋 Configuration Summary:");
    tracing::info!("  Name: {}", settings.name);
    tracing::info!("  Master contact: {}", settings.master_contact);
    tracing::info!(
        "  Poll interval: {:?}, cooldown: {}s, liveness every {} cycles",
        settings.poll_interval,
        settings.cooldown_secs,
        settings.liveness_every
    );
    tracing::info!("  Failure policy: {:?}", settings.failure.mode);
    tracing::info!("  Queries: {}", config.queries.len());
    Ok(())
}

fn perform_dry_run(config: &WatchConfig) -> anyhow::Result<()> {
    let queries = config.queries(chrono::Utc::now())?;
    for (i, query) in queries.iter().enumerate() {
        println!(
            "{}. {} | centers {:?} | text {} | call {}",
            i + 1,
            query.label(),
            query.center_indices,
            query.text_contacts.len(),
            query.call_contacts.len()
        );
    }

    let (plan, _) = plan_introductions(&queries, config.introduced_contacts()?);
    if plan.is_empty() {
        println!("No pending introductions.");
    }
    for intro in plan {
        println!("Would introduce {} ({:?})", intro.contact, intro.kind);
    }
    Ok(())
}
