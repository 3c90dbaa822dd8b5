//! Conflux CLI
//!
//! Runs the cache and event pipeline end to end: caches a few values, pushes
//! events through the ingestion queue to subscribed handlers, then shuts every
//! component down in dependency order.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use conflux_cache::CacheManager;
use conflux_core::{handler_fn, ConfluxConfig, Event, Topic};
use conflux_events::{EventBus, EventProcessor};
use conflux_log::AsyncSink;

type SessionCache = CacheManager<String, Value>;

/// How long a login session stays cached.
const SESSION_TTL: Duration = Duration::from_secs(30 * 60);

/// Conflux - concurrent TTL cache and event pipeline demo
#[derive(Parser)]
#[command(name = "conflux")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Default cache TTL in seconds (overrides CONFLUX_DEFAULT_TTL_MS)
    #[arg(long)]
    default_ttl_secs: Option<u64>,

    /// Cache sweep interval in seconds (overrides CONFLUX_SWEEP_INTERVAL_MS)
    #[arg(long)]
    sweep_interval_secs: Option<u64>,

    /// Handler worker threads (overrides CONFLUX_WORKERS)
    #[arg(short, long)]
    workers: Option<usize>,
}

impl Cli {
    /// Environment first, then command-line overrides.
    fn config(&self) -> Result<ConfluxConfig> {
        let mut config = ConfluxConfig::from_env().context("Invalid CONFLUX_* environment")?;

        if let Some(secs) = self.default_ttl_secs {
            config.cache = config.cache.default_ttl(Duration::from_secs(secs));
        }
        if let Some(secs) = self.sweep_interval_secs {
            config.cache = config.cache.sweep_interval(Duration::from_secs(secs));
        }
        if let Some(workers) = self.workers {
            config.dispatcher.workers = workers;
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = cli.config()?;

    let sink = AsyncSink::new(&config.queue).context("Failed to start log sink")?;
    init_tracing(&sink, cli.verbose);

    println!(
        "{}",
        "🚀 Starting multi-threaded caching and event system...".cyan().bold()
    );
    info!(
        workers = config.dispatcher.workers,
        default_ttl_ms = config.cache.default_ttl_ms,
        sweep_interval_ms = config.cache.sweep_interval_ms,
        "Configuration loaded"
    );

    let cache = Arc::new(SessionCache::new(&config.cache).context("Failed to start cache")?);
    let bus = Arc::new(
        EventBus::new(&config.dispatcher)
            .context("Failed to start event bus")?
            .with_error_sink(Arc::new(sink.clone())),
    );
    let processor = EventProcessor::with_config(bus.clone(), &config.queue);

    subscribe_handlers(&bus, &cache, &sink);
    processor.start().context("Failed to start event processor")?;

    demonstrate_caching(&cache, &sink);
    demonstrate_events(&processor, &sink)?;

    shutdown(&cache, &bus, &processor, &sink);
    Ok(())
}

/// Routes `tracing` output through the sink's writer thread.
fn init_tracing(sink: &AsyncSink, verbose: bool) {
    let filter = if verbose {
        "conflux=debug,info"
    } else {
        "conflux=info,warn"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(sink.clone())
                .with_ansi(false)
                .with_thread_names(true),
        )
        .init();
}

fn subscribe_handlers(bus: &EventBus, cache: &Arc<SessionCache>, sink: &AsyncSink) {
    let sessions = Arc::clone(cache);
    let log = sink.clone();
    bus.subscribe(
        Topic::UserLogin,
        handler_fn("session-tracker", move |event| {
            let user = event
                .get_str("username")
                .context("login event without username")?;
            log.info(format!("User logged in: {user}"));
            sessions.put_with_ttl(
                format!("session:{user}"),
                json!({
                    "ip": event.get("ip"),
                    "source": event.source(),
                    "since": event.timestamp().to_rfc3339(),
                }),
                SESSION_TTL,
            );
            Ok(())
        }),
    );

    let sessions = Arc::clone(cache);
    let log = sink.clone();
    bus.subscribe(
        Topic::UserLogout,
        handler_fn("session-cleaner", move |event| {
            let user = event
                .get_str("username")
                .context("logout event without username")?;
            log.info(format!("User logged out: {user}"));
            sessions.remove(format!("session:{user}").as_str());
            Ok(())
        }),
    );

    let log = sink.clone();
    bus.subscribe(
        Topic::OrderCreated,
        handler_fn("order-audit", move |event| {
            log.log_fmt(
                tracing::Level::INFO,
                format_args!(
                    "Order created: {} with amount: {}",
                    event.get("orderId").unwrap_or(&Value::Null),
                    event.get("amount").unwrap_or(&Value::Null),
                ),
            );
            Ok(())
        }),
    );

    let log = sink.clone();
    bus.subscribe(
        Topic::SystemError,
        handler_fn("error-alerts", move |event| {
            log.error(format!(
                "System error: {} from {}",
                event.get_str("error").unwrap_or("unknown"),
                event.source()
            ));
            Ok(())
        }),
    );
}

fn demonstrate_caching(cache: &SessionCache, sink: &AsyncSink) {
    sink.info("=== Caching Demonstration ===");

    cache.put_with_ttl("user:123".into(), json!("John Doe"), Duration::from_secs(2 * 60));
    cache.put_with_ttl("config:timeout".into(), json!(5000), Duration::from_secs(10 * 60));

    let user: Option<String> = cache.get_as("user:123");
    let timeout: Option<u64> = cache.get_as("config:timeout");
    sink.info(format!("Cached user: {}", user.as_deref().unwrap_or("<missing>")));
    sink.info(format!(
        "Cached timeout: {}",
        timeout.map_or_else(|| "<missing>".to_string(), |t| t.to_string())
    ));

    let computed = cache.get_or_compute_with_ttl(
        "computed:key".into(),
        |_| {
            sink.info("Value computed and cached");
            json!("Computed Value")
        },
        Duration::from_secs(5 * 60),
    );
    sink.info(format!("Computed value: {computed}"));
}

fn demonstrate_events(processor: &EventProcessor, sink: &AsyncSink) -> Result<()> {
    sink.info("=== Event System Demonstration ===");

    let events = [
        Event::new(Topic::UserLogin, "AuthService")
            .with("username", "john_doe")
            .with("ip", "192.168.1.100"),
        Event::new(Topic::OrderCreated, "OrderService")
            .with("orderId", "ORD-12345")
            .with("amount", 99.99)
            .with("currency", "USD"),
        Event::new(Topic::SystemError, "DatabaseService")
            .with("error", "Connection timeout")
            .with("retryCount", 3),
        // No subscribers: dropped without error.
        Event::new(Topic::PaymentProcessed, "BillingService").with("orderId", "ORD-12345"),
    ];

    for event in events {
        processor.submit(event).context("Failed to submit event")?;
    }

    sink.info("Events submitted for processing");
    Ok(())
}

fn shutdown(cache: &SessionCache, bus: &EventBus, processor: &EventProcessor, sink: &AsyncSink) {
    sink.info("Shutting down system...");

    let drained = processor.shutdown();
    bus.shutdown();
    let idle = bus.await_termination(Duration::from_secs(5));
    let swept = cache.shutdown();

    let stats = cache.cache().stats();
    sink.info(format!(
        "Cache at shutdown: {} entries ({} valid, {} expired)",
        stats.total_entries, stats.valid_entries, stats.expired_entries
    ));
    let flushed = sink.shutdown();

    if drained && idle && swept && flushed {
        println!("{}", "✅ System shutdown completed.".green().bold());
    } else {
        println!(
            "{} processor drained: {}, handlers idle: {}, sweeper stopped: {}, log flushed: {}",
            "⚠️  Shutdown timed out:".yellow().bold(),
            drained,
            idle,
            swept,
            flushed
        );
    }
}
