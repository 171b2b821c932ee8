use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use watchkeeper::state::keys;
use watchkeeper::{
    BoxService, Event, EventKind, MemoryStorage, RestartPolicy, RuntimeError, Service,
    ServiceContext, ServiceDescriptor, ServiceError, ServiceState, Settings, SharedState,
    ShutdownEscalation, StateError, Storage, Supervisor, SupervisorConfig,
};

/// Fails (or panics, or exits) for the first `bad_generations` instances, then behaves.
struct Faulty {
    generation: u32,
    bad_generations: u32,
    mode: Mode,
}

#[derive(Clone, Copy)]
enum Mode {
    Fail,
    Panic,
    Exit,
    /// Ignores cancellation for a long time.
    Hang,
    /// Blocks its thread for a long time, ignoring cancellation.
    Wedge,
}

#[async_trait]
impl Service for Faulty {
    fn name(&self) -> &str {
        "faulty"
    }

    async fn iterate(&mut self, _ctx: &CancellationToken) -> Result<(), ServiceError> {
        if self.generation > self.bad_generations {
            return Ok(());
        }
        match self.mode {
            Mode::Fail => Err(ServiceError::fault("simulated fault")),
            Mode::Panic => panic!("simulated panic"),
            Mode::Exit => Err(ServiceError::Canceled),
            Mode::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            }
            Mode::Wedge => {
                std::thread::sleep(Duration::from_secs(3));
                Ok(())
            }
        }
    }

    fn idle_interval(&self) -> Duration {
        Duration::from_millis(5)
    }
}

/// Descriptor whose factory counts builds and hands the count to each instance.
fn faulty(id: &str, mode: Mode, bad_generations: u32) -> (ServiceDescriptor, Arc<AtomicU32>) {
    let builds = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&builds);
    let factory = move |_: &ServiceContext| -> Result<BoxService, ServiceError> {
        let generation = counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Box::new(Faulty {
            generation,
            bad_generations,
            mode,
        }))
    };
    (ServiceDescriptor::new(id, factory, Settings::empty()), builds)
}

fn healthy(id: &str) -> ServiceDescriptor {
    faulty(id, Mode::Fail, 0).0
}

fn config() -> SupervisorConfig {
    SupervisorConfig {
        health_threshold: 3,
        grace: Duration::from_secs(2),
        restart_join_timeout: Duration::from_millis(500),
        ..SupervisorConfig::default()
    }
}

fn state() -> Arc<SharedState> {
    Arc::new(SharedState::bootstrap(MemoryStorage::new()).unwrap())
}

async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sick_service_is_replaced_by_a_fresh_instance() {
    let sup = Supervisor::builder(config(), state()).build();
    let mut events = sup.bus().subscribe();
    let (desc, builds) = faulty("test.flaky", Mode::Fail, 1);
    sup.start(vec![desc]);

    wait_until("restart", || {
        sup.restart_count("flaky") == Some(1) && sup.state_of("flaky") == Some(ServiceState::Running)
    })
    .await;

    assert_eq!(builds.load(Ordering::SeqCst), 2);
    assert_eq!(sup.consecutive_errors("flaky"), Some(0));

    let mut kinds = Vec::new();
    while let Ok(ev) = events.try_recv() {
        kinds.push(ev.kind);
    }
    let requested = kinds.iter().position(|k| *k == EventKind::RestartRequested);
    let restarted = kinds.iter().position(|k| *k == EventKind::ServiceRestarted);
    assert!(requested.is_some() && restarted.is_some());
    assert!(requested < restarted);

    sup.shutdown().await.unwrap();
    assert_eq!(sup.state_of("flaky"), Some(ServiceState::Stopped));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn errors_below_threshold_never_restart() {
    let sup = Supervisor::builder(config(), state()).build();
    let (desc, builds) = faulty("test.steady", Mode::Fail, 0);
    sup.start(vec![desc]);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(sup.restart_count("steady"), Some(0));
    assert_eq!(builds.load(Ordering::SeqCst), 1);
    sup.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn panicking_iterations_count_as_errors() {
    let sup = Supervisor::builder(config(), state()).build();
    let (desc, builds) = faulty("test.crashy", Mode::Panic, 1);
    sup.start(vec![desc]);

    wait_until("restart after panics", || sup.restart_count("crashy") == Some(1)).await;
    wait_until("replacement", || builds.load(Ordering::SeqCst) == 2).await;
    sup.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn loop_that_exits_on_its_own_is_restarted() {
    let sup = Supervisor::builder(config(), state()).build();
    let mut events = sup.bus().subscribe();
    let (desc, builds) = faulty("test.quitter", Mode::Exit, 1);
    sup.start(vec![desc]);

    wait_until("restart after exit", || builds.load(Ordering::SeqCst) == 2).await;
    assert_eq!(sup.restart_count("quitter"), Some(1));

    let mut saw_exit = false;
    while let Ok(ev) = events.try_recv() {
        saw_exit |= ev.kind == EventKind::ServiceExited;
    }
    assert!(saw_exit);
    sup.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn factory_failure_only_kills_its_own_slot() {
    let sup = Supervisor::builder(config(), state()).build();
    let broken = ServiceDescriptor::new(
        "hw.camera",
        |_: &ServiceContext| -> Result<BoxService, ServiceError> {
            Err(ServiceError::build("camera not connected"))
        },
        Settings::empty(),
    );
    sup.start(vec![healthy("test.left"), broken, healthy("test.right")]);

    wait_until("dead slot", || sup.state_of("camera") == Some(ServiceState::Dead)).await;
    tokio::time::sleep(Duration::from_millis(30)).await;

    let states = sup.states();
    assert_eq!(
        states,
        vec![
            ("left".to_string(), ServiceState::Running),
            ("camera".to_string(), ServiceState::Dead),
            ("right".to_string(), ServiceState::Running),
        ]
    );
    sup.shutdown().await.unwrap();
    assert_eq!(sup.state_of("camera"), Some(ServiceState::Dead));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn duplicate_names_are_skipped() {
    let sup = Supervisor::builder(config(), state()).build();
    let started = sup.start(vec![healthy("a.worker"), healthy("b.worker")]);
    assert_eq!(started, 1);
    assert_eq!(sup.names(), vec!["worker".to_string()]);
    sup.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shutdown_reports_the_stuck_service_and_returns() {
    let cfg = SupervisorConfig {
        grace: Duration::from_millis(200),
        ..config()
    };
    let sup = Supervisor::builder(cfg, state()).build();
    let (stuck, _) = faulty("test.stuck", Mode::Hang, u32::MAX);
    sup.start(vec![healthy("test.one"), stuck, healthy("test.two")]);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    let err = sup.shutdown().await.unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(2));

    match err {
        RuntimeError::GraceExceeded { grace, stuck } => {
            assert_eq!(grace, Duration::from_millis(200));
            assert_eq!(stuck, vec!["stuck".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(sup.state_of("one"), Some(ServiceState::Stopped));
    assert_eq!(sup.state_of("two"), Some(ServiceState::Stopped));
}

/// Memory storage that counts flushes.
#[derive(Clone, Default)]
struct CountingStorage {
    inner: MemoryStorage,
    stores: Arc<AtomicUsize>,
}

impl Storage for CountingStorage {
    fn load(&self) -> Result<Option<String>, StateError> {
        self.inner.load()
    }

    fn store(&self, contents: &str) -> Result<(), StateError> {
        self.stores.fetch_add(1, Ordering::SeqCst);
        self.inner.store(contents)
    }

    fn describe(&self) -> String {
        "counting".to_string()
    }
}

fn counter(state: &SharedState, get: fn(&SharedState, &str) -> Option<watchkeeper::Value>, key: &str) -> i64 {
    get(state, key).and_then(|v| v.as_i64()).unwrap_or(0)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn broken_service_escalates_once_not_on_every_restart() {
    let storage = CountingStorage::default();
    let shared = Arc::new(SharedState::bootstrap(storage.clone()).unwrap());
    let writes_after_boot = storage.stores.load(Ordering::SeqCst);

    let cfg = SupervisorConfig {
        health_threshold: 1,
        restart: RestartPolicy::capped(1),
        ..config()
    };
    let sup = Supervisor::builder(cfg, Arc::clone(&shared)).build();
    let mut events = sup.bus().subscribe();
    let (desc, _) = faulty("test.doomed", Mode::Fail, u32::MAX);
    sup.start(vec![desc]);

    wait_until("many restarts", || sup.restart_count("doomed").unwrap_or(0) >= 10).await;
    sup.shutdown().await.unwrap();

    assert_eq!(counter(&shared, SharedState::get_resilience, keys::REBOOT_ERROR_COUNT), 1);
    assert_eq!(counter(&shared, SharedState::get_metric, keys::TOTAL_SYSTEM_RESTARTS), 1);
    assert_eq!(storage.stores.load(Ordering::SeqCst) - writes_after_boot, 2);

    let mut escalations: Vec<Event> = Vec::new();
    while let Ok(ev) = events.try_recv() {
        if ev.kind == EventKind::Escalated {
            escalations.push(ev);
        }
    }
    assert_eq!(escalations.len(), 1);
    assert_eq!(escalations[0].restarts, Some(2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn escalation_rearms_after_an_instance_stays_up() {
    let shared = state();
    let cfg = SupervisorConfig {
        health_threshold: 1,
        restart: RestartPolicy::capped(1),
        escalation_reset: Duration::ZERO,
        ..config()
    };
    let sup = Supervisor::builder(cfg, Arc::clone(&shared)).build();
    let (desc, _) = faulty("test.doomed", Mode::Fail, u32::MAX);
    sup.start(vec![desc]);

    wait_until("a few restarts", || sup.restart_count("doomed").unwrap_or(0) >= 4).await;
    sup.shutdown().await.unwrap();

    let reboots = counter(&shared, SharedState::get_resilience, keys::REBOOT_ERROR_COUNT);
    assert!(reboots >= 3, "reboot_error_count = {reboots}");
    assert_eq!(
        reboots,
        counter(&shared, SharedState::get_metric, keys::TOTAL_SYSTEM_RESTARTS)
    );
}

/// Blocks its thread on every iteration, like a synchronous driver call.
struct Blocker;

#[async_trait]
impl Service for Blocker {
    fn name(&self) -> &str {
        "blocker"
    }

    async fn iterate(&mut self, _ctx: &CancellationToken) -> Result<(), ServiceError> {
        std::thread::sleep(Duration::from_millis(400));
        Ok(())
    }

    fn idle_interval(&self) -> Duration {
        Duration::from_millis(1)
    }
}

/// Counts its iterations.
struct Ticker {
    ticks: Arc<AtomicU32>,
}

#[async_trait]
impl Service for Ticker {
    fn name(&self) -> &str {
        "ticker"
    }

    async fn iterate(&mut self, _ctx: &CancellationToken) -> Result<(), ServiceError> {
        self.ticks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn idle_interval(&self) -> Duration {
        Duration::from_millis(5)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn blocking_services_do_not_starve_the_others() {
    let sup = Supervisor::builder(config(), state()).build();
    let ticks = Arc::new(AtomicU32::new(0));

    let blocker = |id: &str| {
        ServiceDescriptor::new(
            id,
            |_: &ServiceContext| -> Result<BoxService, ServiceError> { Ok(Box::new(Blocker)) },
            Settings::empty(),
        )
    };
    let ticker = {
        let ticks = Arc::clone(&ticks);
        ServiceDescriptor::new(
            "test.ticker",
            move |_: &ServiceContext| -> Result<BoxService, ServiceError> {
                Ok(Box::new(Ticker {
                    ticks: Arc::clone(&ticks),
                }))
            },
            Settings::empty(),
        )
    };
    sup.start(vec![blocker("hw.left"), blocker("hw.right"), ticker]);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    let seen = ticks.load(Ordering::SeqCst);
    assert!(seen >= 50, "ticker ran {seen} times alongside two blocking services");

    sup.shutdown().await.unwrap();
    assert_eq!(sup.state_of("ticker"), Some(ServiceState::Stopped));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_abandons_a_service_wedged_in_a_blocking_call() {
    let cfg = SupervisorConfig {
        grace: Duration::from_millis(200),
        ..config()
    };
    let sup = Supervisor::builder(cfg, state()).build();
    let (wedged, _) = faulty("hw.wedged", Mode::Wedge, u32::MAX);
    sup.start(vec![healthy("test.one"), wedged, healthy("test.two")]);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    let err = sup.shutdown().await.unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(1));

    match err {
        RuntimeError::GraceExceeded { stuck, .. } => assert_eq!(stuck, vec!["wedged".to_string()]),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(sup.state_of("one"), Some(ServiceState::Stopped));
    assert_eq!(sup.state_of("two"), Some(ServiceState::Stopped));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shutdown_escalation_ends_run() {
    let cfg = SupervisorConfig {
        health_threshold: 1,
        restart: RestartPolicy::capped(0),
        ..config()
    };
    let sup = Supervisor::builder(cfg, state())
        .with_escalation(ShutdownEscalation)
        .build();
    let (desc, _) = faulty("test.doomed", Mode::Fail, u32::MAX);

    tokio::time::timeout(Duration::from_secs(5), sup.run(vec![desc, healthy("test.bystander")]))
        .await
        .expect("run should return after escalation")
        .unwrap();

    assert!(sup.shutdown_token().is_cancelled());
    assert_eq!(sup.state_of("bystander"), Some(ServiceState::Stopped));
}
