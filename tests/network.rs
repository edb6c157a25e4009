//! Requests over a real socket through `ReqwestTransport`.

use fluent_http::interceptor::{LoggingInterceptor, LoggingOptions};
use fluent_http::transport::ReqwestTransport;
use fluent_http::{CancelReason, Client, Config, Context, Error};
use mockito::Matcher;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Deserialize, PartialEq)]
struct Todo {
    id: u64,
    title: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: String,
}

#[tokio::test]
async fn test_get_json_over_network() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/todos/1")
        .match_query(Matcher::UrlEncoded("expand".into(), "owner".into()))
        .match_header("accept", "application/json")
        .match_header("x-api-key", "k-123")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":1,"title":"write tests"}"#)
        .create_async()
        .await;

    let client = Client::new(
        Config::new(format!("{}/api/", server.url())).with_global_header("X-Api-Key", "k-123"),
    )
    .unwrap();

    let todo: Todo = client
        .get(&Context::background(), "/todos/1")
        .with_query_param("expand", "owner")
        .json()
        .await
        .unwrap();
    assert_eq!(
        todo,
        Todo {
            id: 1,
            title: "write tests".to_string()
        }
    );
    mock.assert_async().await;
}

#[tokio::test]
async fn test_post_error_over_network() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/todos")
        .match_body(Matcher::JsonString(r#"{"title":"x"}"#.to_string()))
        .with_status(404)
        .with_body(r#"{"error":"not found"}"#)
        .create_async()
        .await;

    let transport = Arc::new(LoggingInterceptor::new(
        Arc::new(ReqwestTransport::new()),
        LoggingOptions::default(),
    ));
    let client = Client::new(Config::new(server.url()).with_interceptor(transport)).unwrap();

    let err = client
        .post(&Context::background(), "todos")
        .with_json(serde_json::json!({ "title": "x" }))
        .with_error_type::<ApiError>()
        .result()
        .await
        .unwrap_err();

    let request_error = err.as_request_error().unwrap();
    assert_eq!(request_error.status_code(), 404);
    assert_eq!(request_error.detail::<ApiError>().unwrap().error, "not found");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    let client = Client::new(Config::new("http://127.0.0.1:1")).unwrap();
    let err = client
        .get(&Context::background(), "/")
        .result()
        .await
        .unwrap_err();
    assert!(err.is_transport(), "{err}");
}

#[tokio::test]
async fn test_deadline_over_network() {
    let server = mockito::Server::new_async().await;
    let client = Client::new(Config::new(server.url())).unwrap();

    let ctx = Context::background().with_timeout(Duration::ZERO);
    let err = client.get(&ctx, "/never").result().await.unwrap_err();
    assert!(matches!(err, Error::Canceled(CancelReason::DeadlineExceeded)), "{err}");
}
