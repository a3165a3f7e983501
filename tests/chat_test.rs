use rama_voice::chat::{ChatClient, Role, NO_ANSWER_REPLY, OFFLINE_REPLY};
use std::time::Duration;

fn client_for(url: String) -> ChatClient {
    ChatClient::with_endpoint(url, String::new(), Duration::from_secs(5), 20)
}

#[tokio::test]
async fn test_ask_returns_backend_reply() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/")
        .match_body(mockito::Matcher::PartialJson(serde_json::json!({
            "message": "where is margaret"
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{
                "reply": "Margaret lives at Rose Cottage.",
                "profile": { "name": "Margaret", "age": 81 }
            }"#,
        )
        .create_async()
        .await;

    let client = client_for(server.url());
    let message = client.ask("where is margaret").await;

    mock.assert_async().await;
    assert_eq!(message.role, Role::Assistant);
    assert_eq!(message.content, "Margaret lives at Rose Cottage.");
    let profile = message.profile.expect("profile payload missing");
    assert_eq!(profile.name.as_deref(), Some("Margaret"));
    assert_eq!(profile.age, Some(81));
}

#[tokio::test]
async fn test_payload_only_reply_has_nothing_to_say() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/chat/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{
                "reminders": [
                    { "medication_name": "Paracetamol", "dosage": "650mg", "send_time": "20:00" }
                ]
            }"#,
        )
        .create_async()
        .await;

    let client = client_for(server.url());
    let message = client.ask("medications for margaret").await;

    assert_eq!(message.content, "");
    let reminders = message.reminders.expect("reminders payload missing");
    assert_eq!(reminders[0].medication_name.as_deref(), Some("Paracetamol"));
}

#[tokio::test]
async fn test_empty_reply_falls_back() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/chat/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("{}")
        .create_async()
        .await;

    let client = client_for(server.url());
    let message = client.ask("mumble").await;
    assert_eq!(message.content, NO_ANSWER_REPLY);
}

#[tokio::test]
async fn test_bearer_token_is_sent_when_configured() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/")
        .match_header("authorization", "Bearer sesame")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{ "reply": "hello" }"#)
        .create_async()
        .await;

    let client = ChatClient::with_endpoint(
        server.url(),
        "sesame".to_string(),
        Duration::from_secs(5),
        20,
    );
    let message = client.ask("hi").await;

    mock.assert_async().await;
    assert_eq!(message.content, "hello");
}

#[tokio::test]
async fn test_unreachable_backend_degrades_to_apology() {
    // Nothing listens here
    let client = client_for("http://127.0.0.1:9".to_string());
    let message = client.ask("anyone home").await;
    assert_eq!(message.content, OFFLINE_REPLY);
}

#[tokio::test]
async fn test_garbage_reply_degrades_to_apology() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/chat/")
        .with_status(200)
        .with_body("this is not json")
        .create_async()
        .await;

    let client = client_for(server.url());
    let message = client.ask("hi").await;
    assert_eq!(message.content, OFFLINE_REPLY);
}

#[tokio::test]
async fn test_history_records_both_sides() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/chat/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{ "reply": "Good morning!" }"#)
        .expect(2)
        .create_async()
        .await;

    let client = client_for(server.url());
    client.ask("good morning").await;
    client.ask("how are you").await;

    let history = client.history().await;
    assert_eq!(history.len(), 4);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[0].content, "good morning");
    assert_eq!(history[1].role, Role::Assistant);
    assert_eq!(history[1].content, "Good morning!");
    assert_eq!(history[2].content, "how are you");

    // Message ids keep increasing, so the view can tell bubbles apart
    let ids: Vec<u64> = history.iter().map(|m| m.id.parse().unwrap()).collect();
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
}
