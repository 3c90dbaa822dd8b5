//! End-to-end: ingestion queue → dispatcher → handlers writing to a TTL cache.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use conflux_cache::CacheManager;
use conflux_core::{
    handler_fn, CacheConfig, DispatcherConfig, ErrorSink, Event, HandlerFailure, Topic,
    WorkerState,
};
use conflux_events::{EventBus, EventProcessor};
use parking_lot::Mutex;
use serde_json::{json, Value};

#[derive(Default)]
struct CountingSink {
    failures: Mutex<Vec<String>>,
}

impl ErrorSink for CountingSink {
    fn report(&self, failure: HandlerFailure) {
        self.failures.lock().push(failure.handler);
    }
}

struct Pipeline {
    cache: Arc<CacheManager<String, Value>>,
    bus: Arc<EventBus>,
    processor: EventProcessor,
    errors: Arc<CountingSink>,
}

fn pipeline(workers: usize) -> Pipeline {
    let cache = Arc::new(CacheManager::new(&CacheConfig::default()).unwrap());
    let errors = Arc::new(CountingSink::default());
    let bus = Arc::new(
        EventBus::new(&DispatcherConfig::with_workers(workers))
            .unwrap()
            .with_error_sink(errors.clone()),
    );
    let processor = EventProcessor::new(bus.clone());
    Pipeline {
        cache,
        bus,
        processor,
        errors,
    }
}

impl Pipeline {
    /// Shuts every stage down in dependency order and returns how long it took.
    fn shutdown(&self) -> Duration {
        let started = Instant::now();
        assert!(self.processor.shutdown());
        self.bus.shutdown();
        assert!(self.bus.await_termination(Duration::from_secs(5)));
        assert!(self.cache.shutdown());
        started.elapsed()
    }
}

#[test]
fn test_login_and_logout_drive_session_cache() {
    let p = pipeline(4);

    let sessions = p.cache.clone();
    p.bus.subscribe(
        Topic::UserLogin,
        handler_fn("session-writer", move |event| {
            let user = event
                .get_str("username")
                .ok_or_else(|| anyhow::anyhow!("login without username"))?;
            sessions.put(format!("session:{user}"), json!({ "ip": event.get("ip") }));
            Ok(())
        }),
    );

    let sessions = p.cache.clone();
    p.bus.subscribe(
        Topic::UserLogout,
        handler_fn("session-remover", move |event| {
            let user = event.get_str("username").unwrap_or_default();
            sessions.remove(format!("session:{user}").as_str());
            Ok(())
        }),
    );

    p.processor.start().unwrap();
    p.processor
        .submit(
            Event::new(Topic::UserLogin, "AuthService")
                .with("username", "john_doe")
                .with("ip", "192.168.1.100"),
        )
        .unwrap();
    p.processor
        .submit(Event::new(Topic::UserLogin, "AuthService").with("username", "jane_doe"))
        .unwrap();

    // Logout for john only once his login has been handled.
    let deadline = Instant::now() + Duration::from_secs(2);
    while p.cache.get("session:john_doe").is_none() {
        assert!(Instant::now() < deadline, "login was never handled");
        std::thread::sleep(Duration::from_millis(5));
    }
    p.processor
        .submit(Event::new(Topic::UserLogout, "AuthService").with("username", "john_doe"))
        .unwrap();

    p.shutdown();

    assert!(p.cache.get("session:john_doe").is_none());
    assert_eq!(
        p.cache.get("session:jane_doe"),
        Some(json!({ "ip": null }))
    );
    assert!(p.errors.failures.lock().is_empty());
}

#[test]
fn test_failing_subscriber_does_not_affect_siblings() {
    let p = pipeline(3);
    let handled = Arc::new(AtomicUsize::new(0));

    for name in ["inventory", "billing"] {
        let handled = Arc::clone(&handled);
        p.bus.subscribe(
            Topic::OrderCreated,
            handler_fn(name, move |_| {
                handled.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
    }
    p.bus.subscribe(
        Topic::OrderCreated,
        handler_fn("flaky-notifier", |event| {
            anyhow::bail!("notification service unavailable for {}", event.id())
        }),
    );

    p.processor.start().unwrap();
    for n in 0..10 {
        p.processor
            .submit(Event::new(Topic::OrderCreated, "OrderService").with("order", n))
            .unwrap();
    }

    let elapsed = p.shutdown();

    assert!(elapsed < Duration::from_secs(6));
    assert_eq!(handled.load(Ordering::SeqCst), 20);
    let failures = p.errors.failures.lock();
    assert_eq!(failures.len(), 10);
    assert!(failures.iter().all(|name| name == "flaky-notifier"));
}

#[test]
fn test_unsubscribed_topics_are_dropped_quietly() {
    let p = pipeline(1);
    p.processor.start().unwrap();

    p.processor
        .submit(Event::new(Topic::NotificationSent, "Mailer"))
        .unwrap();
    p.shutdown();

    assert_eq!(p.processor.state(), WorkerState::Stopped);
    assert!(p.errors.failures.lock().is_empty());
}

#[test]
fn test_computed_values_are_shared_across_handlers() {
    let p = pipeline(4);
    let computations = Arc::new(AtomicUsize::new(0));

    for i in 0..4 {
        let cache = p.cache.clone();
        let computations = Arc::clone(&computations);
        p.bus.subscribe(
            Topic::PaymentProcessed,
            handler_fn(format!("reader-{i}"), move |_| {
                cache.get_or_compute("exchange:rate".to_string(), |_| {
                    computations.fetch_add(1, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(10));
                    json!(1.08)
                });
                Ok(())
            }),
        );
    }

    p.processor.start().unwrap();
    p.processor
        .submit(Event::new(Topic::PaymentProcessed, "Billing"))
        .unwrap();
    p.shutdown();

    assert_eq!(computations.load(Ordering::SeqCst), 1);
    assert_eq!(p.cache.get_as::<f64, _>("exchange:rate"), Some(1.08));
}
