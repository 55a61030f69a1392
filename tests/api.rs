use std::sync::{Arc, Mutex};
use std::time::Duration;

use dify::client::{ChatMessageOutcome, Client, ClientError, DifyApi};
use dify::model::{
    ChatMessageOption, ChatMessageRequest, GetMessagesOption, MessagesParams, StopTaskOption, StopTaskRequest,
    UploadFileOption,
};
use dify::multipart::FileUpload;
use dify::options::{ClientConfig, TransportOptions};
use dify::StreamSummary;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, header_regex, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_KEY: &str = "app-test-key";

fn client(server: &MockServer) -> Client {
    Client::new(format!("{}/v1", server.uri()))
}

#[tokio::test]
async fn chat_streaming_over_http() {
    let server = MockServer::start().await;
    let body = concat!(
        "event: ping\n\n",
        "data: {\"event\": \"workflow_started\", \"task_id\": \"t-1\", \"conversation_id\": \"c-1\"}\n\n",
        "data: {\"event\": \"message\", \"answer\": \"Hello\", \"from_variable_selector\": [\"llm\", \"text\"]}\n\n",
        "data: {\"event\": \"message\", \"answer\": \" world\"}\n\n",
        "data: {\"event\": \"workflow_finished\"}\n\n",
    );

    Mock::given(method("POST"))
        .and(path("/v1/chat-messages"))
        .and(header("authorization", "Bearer app-test-key"))
        .and(header("content-type", "application/json"))
        .and(body_partial_json(json!({"query": "hi", "user": "u1", "response_mode": "streaming"})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let answer = Arc::new(Mutex::new(String::new()));
    let sink = answer.clone();
    let option = ChatMessageOption::streaming(API_KEY, ChatMessageRequest::new("hi", "u1"), move |event| {
        sink.lock().unwrap().push_str(&event.answer);
    });

    let outcome = client(&server)
        .chat_message(&CancellationToken::new(), option)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ChatMessageOutcome::Streamed(StreamSummary { delivered: 4, skipped: 0 })
    );
    assert_eq!(*answer.lock().unwrap(), "Hello world");
}

#[tokio::test]
async fn chat_error_status_surfaces_raw_body() {
    let server = MockServer::start().await;
    let error_body = r#"{"code":"app_unavailable","message":"App unavailable","status":400}"#;

    Mock::given(method("POST"))
        .and(path("/v1/chat-messages"))
        .respond_with(ResponseTemplate::new(400).set_body_string(error_body))
        .mount(&server)
        .await;

    let option = ChatMessageOption::blocking(API_KEY, ChatMessageRequest::new("hi", "u1"));
    match client(&server).chat_message(&CancellationToken::new(), option).await {
        Err(ClientError::Api { status, message }) => {
            assert_eq!(status, 400);
            assert_eq!(message, error_body);
        }
        other => panic!("expected API error, got {other:?}"),
    }
}

#[tokio::test]
async fn upload_local_file() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/files/upload"))
        .and(header("authorization", "Bearer app-test-key"))
        .and(header_regex("content-type", "^multipart/form-data; boundary=[0-9a-f]+$"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "72fa9618-8f89-4a37-9b33-7e1178a24a67",
            "name": "menu.txt",
            "size": 11,
            "extension": "txt",
            "mime_type": "text/plain",
            "created_by": "u1",
            "created_at": 1577836800
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("menu.txt");
    tokio::fs::write(&file_path, "tea, coffee").await.unwrap();

    let option = UploadFileOption {
        api_key: API_KEY.into(),
        file: Some(FileUpload::open(&file_path).await.unwrap()),
        user: "u1".to_string(),
    };
    let uploaded = client(&server)
        .upload_file(&CancellationToken::new(), option)
        .await
        .unwrap();
    assert_eq!(uploaded.name, "menu.txt");
    assert_eq!(uploaded.size, 11);

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("Content-Disposition: form-data; name=\"user\"\r\n\r\nu1\r\n"));
    assert!(body.contains("Content-Disposition: form-data; name=\"file\"; filename=\"menu.txt\"\r\n"));
    assert!(body.contains("Content-Type: text/plain\r\n\r\ntea, coffee\r\n"));
}

#[tokio::test]
async fn message_history_query_string() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/messages"))
        .and(query_param("conversation_id", "abc"))
        .and(query_param("user", "u1"))
        .and(query_param("first_id", "m-10"))
        .and(query_param("limit", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "limit": 5,
            "has_more": true,
            "data": [{
                "id": "m-9",
                "conversation_id": "abc",
                "inputs": {"name": "dify"},
                "query": "iphone 13 pro",
                "answer": "The iPhone 13 Pro...",
                "message_files": [],
                "feedback": null,
                "retriever_resources": [],
                "created_at": 1705569239
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let option = GetMessagesOption {
        api_key: API_KEY.into(),
        params: MessagesParams::new("abc", "u1").before("m-10").with_limit(5),
    };
    let page = client(&server)
        .get_messages(&CancellationToken::new(), option)
        .await
        .unwrap();

    assert!(page.has_more);
    assert_eq!(page.data[0].inputs["name"], "dify");
    assert!(page.data[0].feedback.is_none());
}

#[tokio::test]
async fn client_wide_headers_and_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat-messages/t-1/stop"))
        .and(header("x-request-source", "tests"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"result": "success"}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let stop = || StopTaskOption {
        api_key: API_KEY.into(),
        task_id: "t-1".to_string(),
        request: StopTaskRequest { user: "u1".to_string() },
    };
    let base = ClientConfig::new(format!("{}/v1", server.uri()))
        .with_header("X-Request-Source".to_string(), "tests".to_string());

    let patient = Client::with_config(base.clone());
    let result = patient.stop_task(&CancellationToken::new(), stop()).await.unwrap();
    assert_eq!(result.result, "success");

    let hasty = Client::with_config(
        base.with_transport_options(&TransportOptions::default().with_timeout(Duration::from_millis(50)))
            .unwrap(),
    );
    match hasty.stop_task(&CancellationToken::new(), stop()).await {
        Err(ClientError::Http(e)) => assert!(e.is_timeout()),
        other => panic!("expected timeout, got {other:?}"),
    }
}
