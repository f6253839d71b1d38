//! REST client tests against a mocked provider

use chartfeed::error::ChartError;
use chartfeed::iex::{IexRestClient, MarketDataClient, ProviderRange};
use chartfeed::model::Source;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn symbols(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn client(server: &MockServer) -> IexRestClient {
    IexRestClient::new(server.uri(), Some("test-token".to_string()), Some(Duration::from_secs(5)))
        .unwrap()
}

#[tokio::test]
async fn test_get_stocks_parses_batch() {
    let server = MockServer::start().await;
    let body = json!({
        "AAPL": {
            "quote": {
                "symbol": "AAPL",
                "companyName": "Apple Inc.",
                "latestPrice": 218.24,
                "latestSource": "IEX real time price",
                "latestUpdate": 1537301820000i64,
                "latestVolume": 1200000,
                "change": 0.36,
                "changePercent": 0.00165
            },
            "chart": [
                {"date": "2018-09-17", "open": 220.0, "high": 222.0, "low": 217.0, "close": 217.88, "volume": 37195133, "change": -5.96, "changePercent": -2.663},
                {"date": "2018-09-18", "open": 217.79, "high": 221.85, "low": 217.12, "close": 218.24, "volume": 31571712, "change": 0.36, "changePercent": 0.165}
            ]
        }
    });

    Mock::given(method("GET"))
        .and(path("/stock/market/batch"))
        .and(query_param("symbols", "AAPL,MSFT"))
        .and(query_param("types", "quote,chart"))
        .and(query_param("range", "2y"))
        .and(query_param("token", "test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(&server)
        .await;

    let stocks = client(&server)
        .get_stocks(&symbols(&["AAPL", "MSFT"]), ProviderRange::TwoYears)
        .await
        .unwrap();

    // MSFT is absent from the response and left for the caller to report
    assert_eq!(stocks.len(), 1);
    let aapl = &stocks[0];
    assert_eq!(aapl.symbol, "AAPL");
    assert_eq!(aapl.chart.len(), 2);
    assert_eq!(aapl.chart[1].close, 218.24);
    let quote = aapl.quote.as_ref().unwrap();
    assert_eq!(quote.latest_source, Source::RealTime);
    assert!(!quote.has_ohlc());
}

#[tokio::test]
async fn test_intraday_skips_empty_minutes() {
    let server = MockServer::start().await;
    let body = json!({
        "SPY": {
            "chart": [
                {"date": "20180918", "minute": "09:30", "open": 289.0, "high": 289.2, "low": 288.9, "close": 289.1, "volume": 1000},
                {"date": "20180918", "minute": "09:31", "open": null, "high": null, "low": null, "close": null, "volume": 0},
                {"date": "20180918", "minute": "09:32", "open": 289.1, "high": 289.3, "low": 289.0, "close": 289.2, "volume": 800}
            ]
        }
    });

    Mock::given(method("GET"))
        .and(path("/stock/market/batch"))
        .and(query_param("range", "1d"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let stocks = client(&server)
        .get_stocks(&symbols(&["SPY"]), ProviderRange::OneDay)
        .await
        .unwrap();

    assert_eq!(stocks[0].chart.len(), 2);
    assert!(stocks[0].quote.is_none());
    assert_eq!(
        stocks[0].chart[1].date.format("%H:%M").to_string(),
        "09:32"
    );
}

#[tokio::test]
async fn test_get_quotes_in_request_order() {
    let server = MockServer::start().await;
    let body = json!({
        "MSFT": {"quote": {"symbol": "MSFT", "latestPrice": 113.21, "latestSource": "Close"}},
        "AAPL": {"quote": {"symbol": "AAPL", "latestPrice": 218.24, "latestSource": "Previous close"}}
    });

    Mock::given(method("GET"))
        .and(path("/stock/market/batch"))
        .and(query_param("types", "quote"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let quotes = client(&server)
        .get_quotes(&symbols(&["AAPL", "MSFT"]))
        .await
        .unwrap();

    let order: Vec<&str> = quotes.iter().map(|q| q.symbol.as_str()).collect();
    assert_eq!(order, vec!["AAPL", "MSFT"]);
    assert_eq!(quotes[1].latest_source, Source::Close);
}

#[tokio::test]
async fn test_http_error_is_remote_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/stock/market/batch"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Forbidden"))
        .mount(&server)
        .await;

    let err = client(&server)
        .get_stocks(&symbols(&["AAPL", "MSFT"]), ProviderRange::OneDay)
        .await
        .unwrap_err();

    match err {
        ChartError::Remote { symbols, message } => {
            assert_eq!(symbols, "AAPL,MSFT");
            assert!(message.contains("403"));
            assert!(message.contains("Forbidden"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_quote_source_is_validation_error() {
    let server = MockServer::start().await;
    let body = json!({"AAPL": {"quote": {"symbol": "AAPL", "latestSource": "carrier pigeon"}}});

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let result = client(&server).get_quotes(&symbols(&["AAPL"])).await;
    assert!(matches!(result, Err(ChartError::Validation(_))));
}

#[tokio::test]
async fn test_empty_request_makes_no_call() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let stocks = client(&server)
        .get_stocks(&[], ProviderRange::OneDay)
        .await
        .unwrap();
    assert!(stocks.is_empty());
}
