use anyhow::Context;
use chrono::{Duration, Utc};
use colored::Colorize;
use futures_util::future::join_all;
use std::sync::Arc;
use tokio::runtime::Handle;

use chartfeed::cache::{CachingClient, JsonFileStore, QuoteChartCache};
use chartfeed::cli::{Cli, Commands, normalize_symbols};
use chartfeed::config::Config;
use chartfeed::iex::{IexRestClient, MarketDataClient, MockMarketDataClient};
use chartfeed::init_logging;
use chartfeed::model::Range;
use chartfeed::refresh::{
    ChartWidget, ConsumeStats, PendingQueue, RefreshCoordinator, UpdateConsumer, WidgetState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();

    // Load configuration
    let config = Config::load_or_default(&cli.config_file);

    // Initialize logging
    let _log_guard = init_logging(&cli.effective_log_level(), config.log.file_path.as_deref())?;

    tracing::info!("Chartfeed starting...");
    tracing::debug!("CLI arguments: {:?}", cli);

    match cli.command {
        Commands::Config { action } => Config::handle_command(&action, &cli.config_file),
        Commands::Refresh {
            symbols,
            range,
            mock,
        } => run_refresh(config, normalize_symbols(&symbols), range, mock).await,
    }
}

/// Refresh every tracked chart once and print the result
async fn run_refresh(
    config: Config,
    symbols: Vec<String>,
    range: Option<Range>,
    mock: bool,
) -> anyhow::Result<()> {
    let queue = PendingQueue::new();
    let mut consumer = UpdateConsumer::new(
        queue.clone(),
        range.unwrap_or(config.chart.chart_range),
        range.unwrap_or(config.chart.thumb_range),
    );

    // Command line symbols replace the configured ones: first is the main chart
    let (current, sidebar) = match symbols.split_first() {
        Some((first, rest)) => (Some(first.clone()), rest.to_vec()),
        None => (config.current_symbol.clone(), config.symbols.clone()),
    };
    if let Some(symbol) = &current {
        consumer.set_current(symbol)?;
    }
    for symbol in &sidebar {
        consumer.add_sidebar(symbol)?;
    }

    let tracked: Vec<String> = current.into_iter().chain(sidebar).collect();
    let (client, cache) = build_client(&config, &tracked, mock)?;

    let coordinator = RefreshCoordinator::new(
        client,
        config.chart_settings(),
        queue.clone(),
        Handle::current(),
    );

    let requests = consumer.full_requests()?;
    consumer.mark_refresh_started(&requests);
    let handles = coordinator.refresh(requests)?;

    // Wake the consumer one last time once every fetch task has finished
    let reaper_queue = queue.clone();
    let reaper = tokio::spawn(async move {
        let results = join_all(handles).await;
        reaper_queue.wake();
        results.into_iter().filter(|r| r.is_err()).count()
    });

    let mut stats = ConsumeStats::default();
    while !consumer.is_settled() && !reaper.is_finished() {
        stats += consumer.next_batch().await;
    }
    stats += consumer.process_pending();

    let failed_tasks = reaper.await.context("Fetch reaper panicked")?;
    if failed_tasks > 0 {
        tracing::error!("{} fetch tasks did not complete", failed_tasks);
    }

    print_summary(&consumer, &stats);

    let (p50, p95, p99) = coordinator.latency().percentiles();
    println!(
        "{} p50={}ms p95={}ms p99={}ms",
        "Fetch latency:".bold(),
        p50,
        p95,
        p99
    );
    if let Some(cache) = cache {
        let snapshot = cache.stats();
        println!(
            "{} {} entries, {} hits / {} misses ({:.0}% hit ratio)",
            "Cache:".bold(),
            cache.len(),
            snapshot.hits,
            snapshot.misses,
            snapshot.hit_ratio() * 100.0
        );
    }

    Ok(())
}

/// Provider client, wrapped in the cache when it is enabled
fn build_client(
    config: &Config,
    symbols: &[String],
    mock: bool,
) -> anyhow::Result<(Arc<dyn MarketDataClient>, Option<Arc<QuoteChartCache>>)> {
    let cache = config.cache.enabled.then(|| {
        let store = Arc::new(JsonFileStore::new(&config.cache.path));
        Arc::new(QuoteChartCache::load(store))
    });

    let client = if mock {
        let refs: Vec<&str> = symbols.iter().map(String::as_str).collect();
        let last_day = Utc::now().date_naive() - Duration::days(1);
        with_cache(MockMarketDataClient::generated(&refs, last_day), &cache)
    } else {
        let inner = IexRestClient::new(
            config.provider.base_url.clone(),
            config.provider.token.clone(),
            config.provider_timeout(),
        )?;
        with_cache(inner, &cache)
    };

    Ok((client, cache))
}

fn with_cache<C: MarketDataClient + 'static>(
    inner: C,
    cache: &Option<Arc<QuoteChartCache>>,
) -> Arc<dyn MarketDataClient> {
    match cache {
        Some(cache) => Arc::new(CachingClient::new(inner, Arc::clone(cache))),
        None => Arc::new(inner),
    }
}

fn print_summary(consumer: &UpdateConsumer, stats: &ConsumeStats) {
    println!(
        "{} {} updates: {} applied, {} errors, {} ignored",
        "Refresh complete:".bold(),
        stats.taken,
        stats.applied.to_string().green(),
        stats.errored.to_string().red(),
        stats.ignored
    );

    if let Some(main) = consumer.main_widget() {
        print_widget("chart", main);
    }
    for thumb in consumer.thumbs() {
        print_widget("thumb", thumb);
    }
}

fn print_widget(kind: &str, widget: &ChartWidget) {
    let label = format!("{:<6} {:<6} {:<8}", kind, widget.symbol, widget.range.label());

    match widget.state {
        WidgetState::Loaded => {
            let Some(chart) = widget.data.as_ref().and_then(|d| d.chart.as_ref()) else {
                println!("{} {}", label, "no chart".yellow());
                return;
            };
            let change = chart.quote.as_ref().map(|q| q.change).unwrap_or_default();
            let change = if change >= 0.0 {
                format!("{:+.2}", change).green()
            } else {
                format!("{:+.2}", change).red()
            };
            let last = chart
                .last_session()
                .map(|s| s.date.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            println!(
                "{} {:>10.2} {} {} sessions, last {}",
                label,
                chart.price(),
                change,
                chart.trading_sessions.len(),
                last
            );
        }
        WidgetState::Errored => {
            let error = widget
                .error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_default();
            println!("{} {}", label, error.red());
        }
        WidgetState::Loading => println!("{} {}", label, "still loading".yellow()),
    }
}
