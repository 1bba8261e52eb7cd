use crate::core::dispatch::Dispatcher;
use crate::core::messages;
use crate::core::policy::{FailureMode, FailureOutcome, FailurePolicy, QueryHealth};
use crate::core::registry::QueryRegistry;
use crate::core::scanner::AvailabilityScanner;
use crate::core::throttle::{NotificationThrottle, DEFAULT_COOLDOWN_SECS};
use crate::domain::model::{PhoneNumber, Query};
use crate::domain::ports::{Notifier, Session};
use crate::utils::error::{AuthError, FatalError, ScanError, SearchError};
use crate::utils::monitor::SystemMonitor;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_LIVENESS_EVERY: u64 = 2_000;
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(600);
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct LoopSettings {
    /// Name the watcher signs its texts with.
    pub name: String,
    pub master_contact: PhoneNumber,
    /// Delay between the end of one cycle and the start of the next.
    pub poll_interval: Duration,
    pub cooldown_secs: i64,
    pub liveness_every: u64,
    /// Bound on every session call.
    pub operation_timeout: Duration,
    /// How long fatal paths wait for outstanding notifications.
    pub shutdown_grace: Duration,
    pub failure: FailurePolicy,
}

impl LoopSettings {
    pub fn new(name: impl Into<String>, master_contact: PhoneNumber) -> Self {
        Self {
            name: name.into(),
            master_contact,
            poll_interval: DEFAULT_POLL_INTERVAL,
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
            liveness_every: DEFAULT_LIVENESS_EVERY,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            failure: FailurePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Authenticating,
    Ready,
    Scanning(usize),
    Notifying(usize),
    Terminated,
}

/// What happened during one pass over the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle: u64,
    /// `(query position, center index)` for every alert dispatched.
    pub notified: Vec<(usize, usize)>,
    /// Queries skipped because their cooldown was active.
    pub suppressed: Vec<usize>,
    /// Queries skipped because they are degraded or waiting out a backoff.
    pub deferred: Vec<usize>,
    /// Queries that failed and were isolated instead of stopping the loop.
    pub failed: Vec<usize>,
    pub liveness_ping: bool,
}

pub fn is_liveness_cycle(cycle: u64, every: u64) -> bool {
    every > 0 && cycle % every == 0
}

/// Single worker that owns the portal session and polls every query in turn.
pub struct PollingLoop<S: Session> {
    session: S,
    registry: QueryRegistry,
    dispatcher: Dispatcher,
    throttle: NotificationThrottle,
    scanner: AvailabilityScanner,
    health: Vec<QueryHealth>,
    settings: LoopSettings,
    monitor: SystemMonitor,
    cycle: u64,
    state: LoopState,
}

impl<S: Session> PollingLoop<S> {
    pub fn new(
        session: S,
        registry: QueryRegistry,
        notifier: Arc<dyn Notifier>,
        settings: LoopSettings,
    ) -> Self {
        Self {
            session,
            health: vec![QueryHealth::default(); registry.len()],
            registry,
            dispatcher: Dispatcher::new(notifier),
            throttle: NotificationThrottle::new(settings.cooldown_secs),
            scanner: AvailabilityScanner::new(settings.operation_timeout),
            settings,
            monitor: SystemMonitor::default(),
            cycle: 0,
            state: LoopState::Idle,
        }
    }

    pub fn with_monitor(mut self, monitor: SystemMonitor) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn registry(&self) -> &QueryRegistry {
        &self.registry
    }

    pub fn health(&self, position: usize) -> Option<&QueryHealth> {
        self.health.get(position)
    }

    /// Waits for notifications dispatched so far, bounded by the shutdown grace.
    pub async fn flush_notifications(&mut self) {
        self.dispatcher.flush(self.settings.shutdown_grace).await;
    }

    /// One-time startup: confirm to the master contact, then authenticate.
    /// Any failure here is fatal and the session is released.
    pub async fn start(&mut self) -> Result<(), FatalError> {
        tracing::info!("{} started running", self.settings.name);
        let master = self.settings.master_contact.clone();
        self.dispatcher.text(&master, messages::started(&self.settings.name));

        self.state = LoopState::Authenticating;
        let timeout = self.settings.operation_timeout;
        let auth = tokio::time::timeout(timeout, self.session.authenticate())
            .await
            .unwrap_or(Err(AuthError::Timeout(timeout)));

        if let Err(e) = auth {
            let fatal = FatalError::Auth(e);
            tracing::error!("❌ Startup failed: {}", fatal);
            self.terminate(&fatal, [master]).await;
            return Err(fatal);
        }

        self.state = LoopState::Ready;
        tracing::info!("✅ Session ready, watching {} queries", self.registry.len());
        Ok(())
    }

    /// One pass over every query in registry order, followed by the liveness check.
    /// The cycle counter advances only when the pass completes.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleReport, FatalError> {
        tracing::debug!("Loop iteration: {}", self.cycle);
        let mut report = CycleReport {
            cycle: self.cycle,
            ..Default::default()
        };

        for position in 0..self.registry.len() {
            if self.settings.failure.mode == FailureMode::Isolate
                && !self.health[position].is_due(now)
            {
                report.deferred.push(position);
                continue;
            }

            let query = &self.registry.all_queries()[position];
            if !self.throttle.should_notify(query, now) {
                tracing::debug!("Cooldown active for {}", query.label());
                report.suppressed.push(position);
                continue;
            }

            self.state = LoopState::Scanning(position);
            match self.search_and_scan(position).await {
                Ok(Some(center)) => {
                    self.state = LoopState::Notifying(position);
                    self.health[position].record_success();
                    let query = &self.registry.all_queries()[position];
                    tracing::info!("🎯 Spot found for {} at center {}", query.label(), center + 1);
                    let dispatched =
                        notify_found(&mut self.dispatcher, &self.settings.name, query, center);
                    if dispatched == 0 {
                        tracing::warn!("No contacts to alert for {}", query.label());
                    } else {
                        if let Some(query) = self.registry.query_mut(position) {
                            self.throttle.mark_notified(query, now);
                        }
                        report.notified.push((position, center));
                    }
                }
                Ok(None) => {
                    self.health[position].record_success();
                }
                Err(e) => {
                    self.handle_failure(position, e, now).await?;
                    report.failed.push(position);
                }
            }
            self.state = LoopState::Ready;
        }

        if is_liveness_cycle(self.cycle, self.settings.liveness_every) {
            self.liveness_ping();
            report.liveness_ping = true;
        }

        self.cycle += 1;
        Ok(report)
    }

    /// Runs until a fatal error. The returned error is the reason the loop stopped;
    /// the session is already released and contacts alerted when this returns.
    pub async fn run(mut self) -> FatalError {
        if let Err(fatal) = self.start().await {
            return fatal;
        }

        loop {
            match self.run_cycle(Utc::now()).await {
                Ok(report) => {
                    if !report.notified.is_empty() || !report.failed.is_empty() {
                        tracing::info!(
                            "Cycle {}: {} alert(s), {} failure(s)",
                            report.cycle,
                            report.notified.len(),
                            report.failed.len()
                        );
                    }
                }
                Err(fatal) => return fatal,
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }

    async fn search_and_scan(&mut self, position: usize) -> Result<Option<usize>, ScanError> {
        let query = &self.registry.all_queries()[position];
        let timeout = self.settings.operation_timeout;

        let view = tokio::time::timeout(timeout, self.session.search_query(query))
            .await
            .unwrap_or(Err(SearchError::Timeout(timeout)))?;
        tracing::debug!("{} result rows for {}", view.rows, query.label());

        self.scanner.scan(&mut self.session, query).await
    }

    async fn handle_failure(
        &mut self,
        position: usize,
        error: ScanError,
        now: DateTime<Utc>,
    ) -> Result<(), FatalError> {
        let query = &self.registry.all_queries()[position];

        match self.settings.failure.mode {
            FailureMode::Shutdown => {
                let contacts: Vec<PhoneNumber> = query.text_contacts.iter().cloned().collect();
                let fatal = FatalError::Query {
                    label: query.label(),
                    source: error,
                };
                tracing::error!("❌ Error during loop search: {}", fatal);
                self.terminate(&fatal, contacts).await;
                Err(fatal)
            }
            FailureMode::Isolate => {
                let label = query.label();
                match self.health[position].record_failure(&self.settings.failure, now) {
                    FailureOutcome::RetryAt(at) => {
                        tracing::warn!("Search for {} failed, retrying at {}: {}", label, at, error);
                    }
                    FailureOutcome::Degraded => {
                        tracing::error!("Giving up on {}: {}", label, error);
                        let text = messages::degraded(&self.settings.name, query, &error.to_string());
                        for contact in &query.text_contacts {
                            self.dispatcher.text(contact, text.clone());
                        }
                    }
                }
                Ok(())
            }
        }
    }

    fn liveness_ping(&mut self) {
        let text = messages::still_running(&self.settings.name, self.cycle);
        tracing::info!("Liveness ping after {} cycles", self.cycle);
        self.monitor.log_stats("liveness");
        for contact in self.registry.all_contacts() {
            self.dispatcher.text(&contact, text.clone());
        }
    }

    async fn terminate<I>(&mut self, fatal: &FatalError, contacts: I)
    where
        I: IntoIterator<Item = PhoneNumber>,
    {
        let summary = fatal.user_friendly_message();
        for contact in contacts {
            self.dispatcher.text(&contact, summary.clone());
        }
        self.session.close().await;
        self.dispatcher.flush(self.settings.shutdown_grace).await;
        self.monitor.log_final_stats();
        self.state = LoopState::Terminated;
    }
}

/// Returns how many texts and calls were dispatched.
fn notify_found(dispatcher: &mut Dispatcher, name: &str, query: &Query, center: usize) -> usize {
    let text = messages::spot_found(name, query, center);
    for contact in &query.text_contacts {
        dispatcher.text(contact, text.clone());
    }
    for contact in &query.call_contacts {
        dispatcher.call(contact);
    }
    query.text_contacts.len() + query.call_contacts.len()
}
