//! Concurrent refresh tests: overlapping fetch tasks against one consumer

use chartfeed::aggregator::ChartSettings;
use chartfeed::error::ChartError;
use chartfeed::iex::{MarketDataClient, MockMarketDataClient};
use chartfeed::model::Range;
use chartfeed::refresh::{
    ConsumeStats, PendingQueue, RefreshCoordinator, RefreshRequest, RequestBuilder,
    UpdateConsumer, WidgetState,
};
use chrono::NaiveDate;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

const SYMBOLS: [&str; 6] = ["AAPL", "MSFT", "GOOG", "AMZN", "SPY", "QQQ"];

fn last_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
}

fn coordinator(client: MockMarketDataClient, queue: &PendingQueue) -> RefreshCoordinator {
    let client: Arc<dyn MarketDataClient> = Arc::new(client);
    RefreshCoordinator::new(
        client,
        ChartSettings::default(),
        queue.clone(),
        Handle::current(),
    )
}

/// Overlapping symbol windows over both ranges
fn overlapping_requests(count: usize) -> Vec<RefreshRequest> {
    (0..count)
        .flat_map(|i| {
            let symbols: Vec<&str> = (0..3).map(|j| SYMBOLS[(i + j) % SYMBOLS.len()]).collect();
            let range = if i % 2 == 0 { Range::OneDay } else { Range::OneYear };
            let mut builder = RequestBuilder::new();
            builder.add(&symbols, range).unwrap();
            builder.build()
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overlapping_refreshes_lose_nothing() {
    let queue = PendingQueue::new();
    let client = MockMarketDataClient::generated(&SYMBOLS, last_day())
        .with_latency(Duration::from_millis(5));
    let coordinator = coordinator(client, &queue);

    let requests = overlapping_requests(40);
    let emitted: usize = requests.iter().map(|r| r.symbols.len()).sum();

    let mut consumer = UpdateConsumer::new(queue.clone(), Range::OneYear, Range::OneDay);
    for symbol in SYMBOLS {
        consumer.add_sidebar(symbol).unwrap();
    }

    let handles = coordinator.refresh(requests).unwrap();

    // Drain while producers are still running
    let mut consumed = ConsumeStats::default();
    let all_done = join_all(handles);
    tokio::pin!(all_done);
    loop {
        tokio::select! {
            results = &mut all_done => {
                assert!(results.iter().all(|r| r.is_ok()));
                break;
            }
            _ = tokio::time::sleep(Duration::from_millis(1)) => {
                consumed += consumer.process_pending();
            }
        }
    }
    consumed += consumer.process_pending();

    assert_eq!(consumed.taken, emitted);
    assert_eq!(consumed.applied + consumed.errored + consumed.ignored, emitted);
    assert_eq!(consumed.errored, 0);
    assert!(queue.is_empty());

    for thumb in consumer.thumbs() {
        assert_eq!(thumb.state, WidgetState::Loaded, "{} not loaded", thumb.symbol);
    }
}

#[tokio::test]
async fn test_failed_group_only_degrades_its_symbols() {
    let queue = PendingQueue::new();
    let client = MockMarketDataClient::generated(&SYMBOLS, last_day()).with_failure("GOOG");
    let coordinator = coordinator(client, &queue);

    let mut consumer = UpdateConsumer::new(queue.clone(), Range::OneYear, Range::OneDay);
    for symbol in ["AAPL", "GOOG", "SPY", "QQQ"] {
        consumer.add_sidebar(symbol).unwrap();
    }

    let mut failing = RequestBuilder::new();
    failing.add(&["AAPL", "GOOG"], Range::OneDay).unwrap();
    let mut healthy = RequestBuilder::new();
    healthy.add(&["SPY", "QQQ"], Range::OneDay).unwrap();
    let requests: Vec<RefreshRequest> = failing.build().into_iter().chain(healthy.build()).collect();

    consumer.mark_refresh_started(&requests);
    for handle in coordinator.refresh(requests).unwrap() {
        handle.await.unwrap();
    }
    let stats = consumer.process_pending();

    assert_eq!(stats.errored, 2);
    assert_eq!(stats.applied, 2);
    for symbol in ["AAPL", "GOOG"] {
        let thumb = consumer.thumb(symbol).unwrap();
        assert_eq!(thumb.state, WidgetState::Errored);
        assert!(matches!(thumb.error, Some(ChartError::Remote { .. })));
    }
    for symbol in ["SPY", "QQQ"] {
        assert_eq!(consumer.thumb(symbol).unwrap().state, WidgetState::Loaded);
    }
}

#[tokio::test]
async fn test_missing_symbol_surfaces_no_data() {
    let queue = PendingQueue::new();
    let coordinator = coordinator(MockMarketDataClient::generated(&["AAPL"], last_day()), &queue);

    let mut consumer = UpdateConsumer::new(queue.clone(), Range::OneYear, Range::OneDay);
    consumer.set_current("ZZZZ").unwrap();

    let requests = consumer.current_requests().unwrap();
    for handle in coordinator.refresh(requests).unwrap() {
        handle.await.unwrap();
    }
    consumer.process_pending();

    let main = consumer.main_widget().unwrap();
    assert_eq!(main.state, WidgetState::Errored);
    assert_eq!(main.error, Some(ChartError::no_data("ZZZZ")));
}

#[tokio::test]
async fn test_result_for_removed_symbol_is_discarded() {
    let queue = PendingQueue::new();
    let client = MockMarketDataClient::generated(&["AAPL", "MSFT"], last_day())
        .with_latency(Duration::from_millis(20));
    let coordinator = coordinator(client, &queue);

    let mut consumer = UpdateConsumer::new(queue.clone(), Range::OneYear, Range::OneDay);
    consumer.add_sidebar("AAPL").unwrap();
    consumer.add_sidebar("MSFT").unwrap();

    let handles = coordinator.refresh(consumer.sidebar_requests().unwrap()).unwrap();
    consumer.remove_sidebar("MSFT").unwrap();
    for handle in handles {
        handle.await.unwrap();
    }

    let stats = consumer.process_pending();
    assert_eq!(stats.taken, 2);
    assert_eq!(stats.applied, 1);
    assert_eq!(stats.ignored, 1);
    assert!(consumer.thumb("MSFT").is_none());
    assert!(consumer.model().stock("MSFT").is_none());
}

#[tokio::test]
async fn test_consumer_wakes_on_each_batch() {
    let queue = PendingQueue::new();
    let coordinator = coordinator(MockMarketDataClient::generated(&SYMBOLS, last_day()), &queue);

    let mut consumer = UpdateConsumer::new(queue.clone(), Range::OneYear, Range::OneDay);
    consumer.set_current("SPY").unwrap();
    consumer.add_sidebar("AAPL").unwrap();

    let requests = consumer.full_requests().unwrap();
    assert_eq!(requests.len(), 2);
    let _handles = coordinator.refresh(requests).unwrap();

    let mut total = ConsumeStats::default();
    tokio::time::timeout(Duration::from_secs(5), async {
        while !consumer.is_settled() {
            total += consumer.next_batch().await;
        }
    })
    .await
    .expect("consumer never settled");

    assert_eq!(total.applied, 2);
    let main = consumer.main_widget().unwrap();
    let chart = main.data.as_ref().unwrap().chart.as_ref().unwrap();
    assert_eq!(chart.range, Range::OneYear);
    assert_eq!(chart.moving_averages.len(), 3);
}
