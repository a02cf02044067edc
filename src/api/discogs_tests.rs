use super::*;
use crate::models::MarketStatistic;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn suggestions_body() -> serde_json::Value {
    json!({
        "Mint (M)": { "currency": "EUR", "value": 24.0 },
        "Near Mint (NM or M-)": { "currency": "EUR", "value": 20.0 },
        "Very Good Plus (VG+)": { "currency": "EUR", "value": 14.0 },
        "Very Good (VG)": { "currency": "EUR", "value": 9.0 },
        "Good (G)": { "currency": "EUR", "value": 5.0 }
    })
}

#[tokio::test]
async fn fetch_reduces_suggestions_to_stats() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/marketplace/price_suggestions/249504"))
        .respond_with(ResponseTemplate::new(200).set_body_json(suggestions_body()))
        .mount(&server)
        .await;

    let client = DiscogsClient::with_base_url(server.uri(), None);
    let stats = client.fetch_price_stats(249504).await.unwrap().unwrap();

    assert_eq!(stats.stat(MarketStatistic::Low), Some(5.0));
    assert_eq!(stats.stat(MarketStatistic::Median), Some(14.0));
    assert_eq!(stats.stat(MarketStatistic::High), Some(24.0));
}

#[tokio::test]
async fn fetch_sends_token_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/marketplace/price_suggestions/1"))
        .and(header("Authorization", "Discogs token=secret123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(suggestions_body()))
        .expect(1)
        .mount(&server)
        .await;

    let client = DiscogsClient::with_base_url(server.uri(), Some("secret123".to_string()));
    client.fetch_price_stats(1).await.unwrap();
}

#[tokio::test]
async fn unknown_release_is_none_not_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/marketplace/price_suggestions/99999"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = DiscogsClient::with_base_url(server.uri(), None);
    assert!(client.fetch_price_stats(99999).await.unwrap().is_none());
}

#[tokio::test]
async fn empty_suggestions_reduce_to_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/marketplace/price_suggestions/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let client = DiscogsClient::with_base_url(server.uri(), None);
    assert!(client.fetch_price_stats(1).await.unwrap().is_none());
}

#[tokio::test]
async fn zero_value_suggestions_are_filtered() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/marketplace/price_suggestions/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Poor (P)": { "currency": "EUR", "value": 0.0 },
            "Good (G)": { "currency": "EUR", "value": 6.0 }
        })))
        .mount(&server)
        .await;

    let client = DiscogsClient::with_base_url(server.uri(), None);
    let stats = client.fetch_price_stats(1).await.unwrap().unwrap();
    assert_eq!(stats.stat_low, Some(6.0));
    assert_eq!(stats.stat_high, Some(6.0));
}

#[tokio::test]
async fn server_error_propagates_as_http_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/marketplace/price_suggestions/1"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = DiscogsClient::with_base_url(server.uri(), None);
    let err = client.fetch_price_stats(1).await.unwrap_err();
    assert!(matches!(err, BrokerError::HttpStatus(status) if status.as_u16() == 500));
}
