use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use slot_watcher::core::policy::{FailureMode, FailurePolicy};
use slot_watcher::domain::model::{CallId, MessageId, Month, PhoneNumber, Query, ResultsView, RowState};
use slot_watcher::domain::ports::{Notifier, Session};
use slot_watcher::utils::error::{
    AuthError, FatalError, InspectError, NotifyError, ScanError, SearchError,
};
use slot_watcher::{LoopSettings, LoopState, PollingLoop, QueryRegistry};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const MASTER: &str = "+15550000000";
const ALICE: &str = "+15550000001";
const BOB: &str = "+15550000002";
const CAROL: &str = "+15550000003";

fn phone(s: &str) -> PhoneNumber {
    PhoneNumber::parse(s).unwrap()
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 1, 8, 0, 0).unwrap()
}

fn query(address: &str, created_at: DateTime<Utc>) -> Query {
    Query::new(
        address,
        Month::September,
        "14",
        vec![0, 1, 2],
        [phone(ALICE), phone(BOB)],
        [phone(CAROL)],
        created_at,
    )
}

#[derive(Default)]
struct SessionLog {
    authenticated: bool,
    searches: Vec<String>,
    search_started: Vec<tokio::time::Instant>,
    inspections: Vec<usize>,
    closed: bool,
}

#[derive(Clone, Default)]
struct FakeSession {
    log: Arc<Mutex<SessionLog>>,
    open_rows: Arc<Mutex<HashSet<usize>>>,
    failing_addresses: Arc<Mutex<HashSet<String>>>,
    fail_auth: bool,
    stall_search: bool,
    search_delay: Option<Duration>,
    fail_on_search: Option<usize>,
}

impl FakeSession {
    fn with_open_rows(rows: &[usize]) -> Self {
        let session = Self::default();
        session.open_rows.lock().unwrap().extend(rows.iter().copied());
        session
    }

    fn fail_search_for(&self, address: &str) {
        self.failing_addresses
            .lock()
            .unwrap()
            .insert(address.to_string());
    }

    fn searches(&self) -> usize {
        self.log.lock().unwrap().searches.len()
    }

    fn inspections(&self) -> Vec<usize> {
        self.log.lock().unwrap().inspections.clone()
    }

    fn closed(&self) -> bool {
        self.log.lock().unwrap().closed
    }

    fn search_started(&self) -> Vec<tokio::time::Instant> {
        self.log.lock().unwrap().search_started.clone()
    }
}

#[async_trait]
impl Session for FakeSession {
    async fn authenticate(&mut self) -> Result<(), AuthError> {
        if self.fail_auth {
            return Err(AuthError::NotReady {
                message: "dashboard never loaded".to_string(),
            });
        }
        self.log.lock().unwrap().authenticated = true;
        Ok(())
    }

    async fn search_query(&mut self, query: &Query) -> Result<ResultsView, SearchError> {
        if self.stall_search {
            std::future::pending::<()>().await;
        }
        self.log
            .lock()
            .unwrap()
            .search_started
            .push(tokio::time::Instant::now());
        if let Some(delay) = self.search_delay {
            tokio::time::sleep(delay).await;
        }
        let searches = {
            let mut log = self.log.lock().unwrap();
            log.searches.push(query.address.clone());
            log.searches.len()
        };
        if self.fail_on_search == Some(searches)
            || self.failing_addresses.lock().unwrap().contains(&query.address)
        {
            return Err(SearchError::Refused {
                address: query.address.clone(),
                message: "calendar widget missing".to_string(),
            });
        }
        Ok(ResultsView { rows: 12 })
    }

    async fn inspect_row(&mut self, index: usize) -> Result<RowState, InspectError> {
        self.log.lock().unwrap().inspections.push(index);
        if self.open_rows.lock().unwrap().contains(&index) {
            Ok(RowState::new(["label", "hour_0800"]))
        } else {
            Ok(RowState::new(["label", "full"]))
        }
    }

    async fn close(&mut self) {
        self.log.lock().unwrap().closed = true;
    }
}

#[derive(Default)]
struct RecordingNotifier {
    texts: Mutex<Vec<(String, String)>>,
    calls: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    fn texts_containing(&self, needle: &str) -> Vec<String> {
        self.texts
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, m)| m.contains(needle))
            .map(|(to, _)| to.clone())
            .collect()
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_text(
        &self,
        message: &str,
        contact: &PhoneNumber,
    ) -> Result<MessageId, NotifyError> {
        self.texts
            .lock()
            .unwrap()
            .push((contact.to_string(), message.to_string()));
        Ok(MessageId(format!("SM{}", self.texts.lock().unwrap().len())))
    }

    async fn place_call(&self, contact: &PhoneNumber) -> Result<CallId, NotifyError> {
        self.calls.lock().unwrap().push(contact.to_string());
        Ok(CallId("CA1".to_string()))
    }
}

fn settings() -> LoopSettings {
    let mut settings = LoopSettings::new("Watcher", phone(MASTER));
    settings.shutdown_grace = Duration::from_secs(1);
    settings.operation_timeout = Duration::from_secs(5);
    settings
}

fn watcher(
    session: &FakeSession,
    notifier: &Arc<RecordingNotifier>,
    queries: Vec<Query>,
    settings: LoopSettings,
) -> PollingLoop<FakeSession> {
    PollingLoop::new(
        session.clone(),
        QueryRegistry::new(queries),
        notifier.clone(),
        settings,
    )
}

#[tokio::test]
async fn test_spot_found_notifies_each_contact_once() {
    let session = FakeSession::with_open_rows(&[1]);
    let notifier = Arc::new(RecordingNotifier::default());
    let mut watcher = watcher(&session, &notifier, vec![query("152 Forecastle Rd", t0())], settings());

    watcher.start().await.unwrap();
    assert_eq!(watcher.state(), LoopState::Ready);
    assert!(session.log.lock().unwrap().authenticated);

    let now = t0() + ChronoDuration::seconds(60);
    let report = watcher.run_cycle(now).await.unwrap();
    watcher.flush_notifications().await;

    assert_eq!(report.notified, vec![(0, 1)]);
    assert_eq!(session.inspections(), vec![0, 1]);

    let mut alerted = notifier.texts_containing("SPOT FOUND");
    alerted.sort();
    assert_eq!(alerted, vec![ALICE.to_string(), BOB.to_string()]);
    assert_eq!(notifier.calls(), vec![CAROL.to_string()]);
    assert_eq!(notifier.texts_containing("test center 2.").len(), 2);

    assert_eq!(watcher.registry().all_queries()[0].last_notified_at, now);
    assert_eq!(watcher.state(), LoopState::Ready);
}

#[tokio::test]
async fn test_cooldown_suppresses_then_realerts() {
    let session = FakeSession::with_open_rows(&[1]);
    let notifier = Arc::new(RecordingNotifier::default());
    let mut watcher = watcher(&session, &notifier, vec![query("152 Forecastle Rd", t0())], settings());
    watcher.start().await.unwrap();

    let first = t0() + ChronoDuration::seconds(60);
    watcher.run_cycle(first).await.unwrap();

    // Ten seconds later the slot is still open but the cooldown holds.
    let report = watcher.run_cycle(first + ChronoDuration::seconds(10)).await.unwrap();
    watcher.flush_notifications().await;
    assert_eq!(report.suppressed, vec![0]);
    assert!(report.notified.is_empty());
    assert_eq!(session.searches(), 1);
    assert_eq!(notifier.texts_containing("SPOT FOUND").len(), 2);
    assert_eq!(notifier.calls().len(), 1);
    assert_eq!(watcher.registry().all_queries()[0].last_notified_at, first);

    // 61 seconds after the first alert it fires again.
    let later = first + ChronoDuration::seconds(61);
    let report = watcher.run_cycle(later).await.unwrap();
    watcher.flush_notifications().await;
    assert_eq!(report.notified, vec![(0, 1)]);
    assert_eq!(session.searches(), 2);
    assert_eq!(notifier.texts_containing("SPOT FOUND").len(), 4);
    assert_eq!(notifier.calls().len(), 2);
    assert_eq!(watcher.registry().all_queries()[0].last_notified_at, later);
}

#[tokio::test]
async fn test_no_opening_leaves_timestamp_alone() {
    let session = FakeSession::with_open_rows(&[]);
    let notifier = Arc::new(RecordingNotifier::default());
    let mut watcher = watcher(&session, &notifier, vec![query("152 Forecastle Rd", t0())], settings());
    watcher.start().await.unwrap();

    let report = watcher.run_cycle(t0() + ChronoDuration::seconds(90)).await.unwrap();
    watcher.flush_notifications().await;

    assert!(report.notified.is_empty());
    assert_eq!(session.inspections(), vec![0, 1, 2]);
    assert_eq!(watcher.registry().all_queries()[0].last_notified_at, t0());
    assert!(notifier.texts_containing("SPOT FOUND").is_empty());
    assert!(notifier.calls().is_empty());
}

#[tokio::test]
async fn test_opening_without_contacts_is_not_marked_notified() {
    let session = FakeSession::with_open_rows(&[1]);
    let notifier = Arc::new(RecordingNotifier::default());
    let silent = Query::new(
        "152 Forecastle Rd",
        Month::September,
        "14",
        vec![0, 1, 2],
        Vec::<PhoneNumber>::new(),
        Vec::<PhoneNumber>::new(),
        t0(),
    );
    let mut watcher = watcher(&session, &notifier, vec![silent], settings());
    watcher.start().await.unwrap();

    let report = watcher.run_cycle(t0() + ChronoDuration::seconds(60)).await.unwrap();
    watcher.flush_notifications().await;

    assert!(report.notified.is_empty());
    assert_eq!(session.inspections(), vec![0, 1]);
    assert!(notifier.texts_containing("SPOT FOUND").is_empty());
    assert!(notifier.calls().is_empty());
    assert_eq!(watcher.registry().all_queries()[0].last_notified_at, t0());
    assert_eq!(watcher.state(), LoopState::Ready);
}

#[tokio::test]
async fn test_search_error_is_fatal_and_alerts_query_contacts() {
    let session = FakeSession::with_open_rows(&[1]);
    session.fail_search_for("152 Forecastle Rd");
    let notifier = Arc::new(RecordingNotifier::default());
    let other = Query::new(
        "9 Other Ave",
        Month::May,
        "02",
        vec![0],
        [phone(CAROL)],
        Vec::<PhoneNumber>::new(),
        t0(),
    );
    let mut watcher = watcher(
        &session,
        &notifier,
        vec![query("152 Forecastle Rd", t0()), other],
        settings(),
    );
    watcher.start().await.unwrap();

    let err = watcher
        .run_cycle(t0() + ChronoDuration::seconds(60))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        FatalError::Query {
            source: ScanError::Search(SearchError::Refused { .. }),
            ..
        }
    ));
    assert_eq!(err.exit_code(), 1);
    assert_eq!(watcher.state(), LoopState::Terminated);
    assert!(session.closed());
    // The second query is never reached.
    assert_eq!(session.searches(), 1);

    let mut alerted = notifier.texts_containing("Stopped while searching");
    alerted.sort();
    assert_eq!(alerted, vec![ALICE.to_string(), BOB.to_string()]);
    assert!(notifier.calls().is_empty());
}

#[tokio::test]
async fn test_run_stops_after_fatal_search() {
    let session = FakeSession::with_open_rows(&[]);
    session.fail_search_for("152 Forecastle Rd");
    let notifier = Arc::new(RecordingNotifier::default());
    let created = Utc::now() - ChronoDuration::seconds(120);
    let watcher = watcher(&session, &notifier, vec![query("152 Forecastle Rd", created)], settings());

    let fatal = watcher.run().await;

    assert!(matches!(fatal, FatalError::Query { .. }));
    assert_eq!(session.searches(), 1);
    assert!(session.closed());
    assert_eq!(notifier.texts_containing("has started running").len(), 1);
    assert_eq!(notifier.texts_containing("Stopped while searching").len(), 2);
}

#[tokio::test]
async fn test_auth_failure_is_fatal_and_alerts_master() {
    let session = FakeSession {
        fail_auth: true,
        ..Default::default()
    };
    let notifier = Arc::new(RecordingNotifier::default());
    let mut watcher = watcher(&session, &notifier, vec![query("152 Forecastle Rd", t0())], settings());

    let err = watcher.start().await.unwrap_err();

    assert!(matches!(err, FatalError::Auth(AuthError::NotReady { .. })));
    assert_eq!(err.exit_code(), 3);
    assert_eq!(watcher.state(), LoopState::Terminated);
    assert!(session.closed());
    assert_eq!(session.searches(), 0);
    assert_eq!(notifier.texts_containing("has started running"), vec![MASTER.to_string()]);
    assert_eq!(notifier.texts_containing("dashboard never loaded"), vec![MASTER.to_string()]);
}

#[tokio::test]
async fn test_liveness_ping_on_multiples_of_interval() {
    let session = FakeSession::with_open_rows(&[]);
    let notifier = Arc::new(RecordingNotifier::default());
    let second = Query::new(
        "9 Other Ave",
        Month::May,
        "02",
        vec![0],
        [phone(BOB), phone(CAROL)],
        [phone(MASTER)],
        t0(),
    );
    let mut settings = settings();
    settings.liveness_every = 3;
    let mut watcher = watcher(
        &session,
        &notifier,
        vec![query("152 Forecastle Rd", t0()), second],
        settings,
    );
    watcher.start().await.unwrap();

    let mut pinged = Vec::new();
    for _ in 0..7 {
        // Inside every query's cooldown, so only the ping can send anything.
        let report = watcher.run_cycle(t0()).await.unwrap();
        if report.liveness_ping {
            pinged.push(report.cycle);
        }
    }
    watcher.flush_notifications().await;

    assert_eq!(pinged, vec![0, 3, 6]);
    assert_eq!(watcher.cycle(), 7);
    assert_eq!(session.searches(), 0);

    let mut first_round = notifier.texts_containing("searched 0 times");
    first_round.sort();
    assert_eq!(
        first_round,
        vec![ALICE.to_string(), BOB.to_string(), CAROL.to_string()]
    );
    assert_eq!(notifier.texts_containing("searched 3 times").len(), 3);
    assert!(notifier.texts_containing("searched 1 times").is_empty());
}

#[tokio::test]
async fn test_isolate_policy_backs_off_then_degrades() {
    let session = FakeSession::with_open_rows(&[0]);
    session.fail_search_for("Broken St");
    let notifier = Arc::new(RecordingNotifier::default());
    let broken = Query::new(
        "Broken St",
        Month::June,
        "10",
        vec![0],
        [phone(CAROL)],
        Vec::<PhoneNumber>::new(),
        t0(),
    );
    let mut settings = settings();
    settings.failure = FailurePolicy {
        mode: FailureMode::Isolate,
        max_consecutive_failures: 2,
        backoff_secs: 30,
        max_backoff_secs: 600,
    };
    let mut watcher = watcher(
        &session,
        &notifier,
        vec![broken, query("152 Forecastle Rd", t0())],
        settings,
    );
    watcher.start().await.unwrap();

    let first = t0() + ChronoDuration::seconds(60);
    let report = watcher.run_cycle(first).await.unwrap();
    assert_eq!(report.failed, vec![0]);
    assert_eq!(report.notified, vec![(1, 0)]);
    assert_eq!(watcher.state(), LoopState::Ready);
    assert_eq!(watcher.health(0).unwrap().consecutive_failures(), 1);

    let report = watcher.run_cycle(first + ChronoDuration::seconds(10)).await.unwrap();
    assert_eq!(report.deferred, vec![0]);

    let report = watcher.run_cycle(first + ChronoDuration::seconds(30)).await.unwrap();
    assert_eq!(report.failed, vec![0]);
    assert!(watcher.health(0).unwrap().is_degraded());

    let report = watcher.run_cycle(first + ChronoDuration::days(1)).await.unwrap();
    watcher.flush_notifications().await;
    assert_eq!(report.deferred, vec![0]);
    assert_eq!(report.notified, vec![(1, 0)]);
    assert!(!session.closed());

    assert_eq!(notifier.texts_containing("stopped watching"), vec![CAROL.to_string()]);
    assert!(notifier.texts_containing("Stopped while searching").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stalled_search_times_out_as_fatal() {
    let session = FakeSession {
        stall_search: true,
        ..Default::default()
    };
    let notifier = Arc::new(RecordingNotifier::default());
    let mut watcher = watcher(&session, &notifier, vec![query("152 Forecastle Rd", t0())], settings());
    watcher.start().await.unwrap();

    let err = watcher
        .run_cycle(t0() + ChronoDuration::seconds(60))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        FatalError::Query {
            source: ScanError::Search(SearchError::Timeout(_)),
            ..
        }
    ));
    assert!(session.closed());
}

#[tokio::test(start_paused = true)]
async fn test_next_cycle_waits_poll_interval_after_previous_ends() {
    let search_time = Duration::from_millis(300);
    let session = FakeSession {
        search_delay: Some(search_time),
        fail_on_search: Some(3),
        ..Default::default()
    };
    let notifier = Arc::new(RecordingNotifier::default());
    let settings = settings();
    let poll_interval = settings.poll_interval;
    // Outside the cooldown on the wall clock, so every cycle searches.
    let created = Utc::now() - ChronoDuration::seconds(120);
    let watcher = watcher(&session, &notifier, vec![query("152 Forecastle Rd", created)], settings);

    let fatal = watcher.run().await;
    assert!(matches!(fatal, FatalError::Query { .. }));

    let started = session.search_started();
    assert_eq!(started.len(), 3);
    let expected = search_time + poll_interval;
    for pair in started.windows(2) {
        let gap = pair[1] - pair[0];
        assert!(
            gap >= expected && gap < expected + Duration::from_millis(10),
            "cycle gap {:?}, expected {:?}",
            gap,
            expected
        );
    }
}
