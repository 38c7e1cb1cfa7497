//! Loopback webhook connector: inbound POSTs become envelopes, the shared
//! secret gates ingestion.

use std::sync::{Arc, Mutex};

use taxbot::chat::{
    ChatConnector, EnvelopeCallback, LoopbackConnectorConfig, LoopbackWebhookConnector,
    MessageEnvelope,
};

fn config() -> LoopbackConnectorConfig {
    LoopbackConnectorConfig {
        // Port 0: the handle reports the actually-bound address.
        bind_addr: "127.0.0.1:0".to_string(),
        shared_secret: "s3cret".to_string(),
        outbound_url: None,
    }
}

fn recording_callback() -> (Arc<Mutex<Vec<MessageEnvelope>>>, EnvelopeCallback) {
    let received: Arc<Mutex<Vec<MessageEnvelope>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    let callback: EnvelopeCallback = Arc::new(move |envelope| {
        let sink = sink.clone();
        Box::pin(async move {
            sink.lock().unwrap().push(envelope);
            Ok(())
        })
    });
    (received, callback)
}

#[tokio::test]
async fn inbound_post_reaches_the_subscriber() {
    let connector = LoopbackWebhookConnector::new(config());
    let handle = connector.connect().await.unwrap();
    let (received, callback) = recording_callback();
    connector.subscribe(&handle, callback).await.unwrap();

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{}/connector/inbound", handle.bind_addr))
        .header("x-taxbot-connector-secret", "s3cret")
        .json(&serde_json::json!({
            "channel_id": "chan-1",
            "sender_id": "u-7",
            "text": "!suma",
        }))
        .send()
        .await
        .unwrap();

    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["accepted"], serde_json::Value::Bool(true));
    assert!(body["message_id"].is_string());

    let envelopes = received.lock().unwrap();
    assert_eq!(envelopes.len(), 1);
    assert_eq!(envelopes[0].channel_id, "chan-1");
    assert_eq!(envelopes[0].sender_id, "u-7");
    assert_eq!(envelopes[0].text, "!suma");
    // Absent flag defaults to a human sender.
    assert!(!envelopes[0].sender_is_bot);

    connector.disconnect(&handle).await.unwrap();
}

#[tokio::test]
async fn wrong_secret_is_rejected() {
    let connector = LoopbackWebhookConnector::new(config());
    let handle = connector.connect().await.unwrap();
    let (received, callback) = recording_callback();
    connector.subscribe(&handle, callback).await.unwrap();

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{}/connector/inbound", handle.bind_addr))
        .header("x-taxbot-connector-secret", "wrong")
        .json(&serde_json::json!({
            "channel_id": "chan-1",
            "sender_id": "u-7",
            "text": "!suma",
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);
    assert!(received.lock().unwrap().is_empty());

    connector.disconnect(&handle).await.unwrap();
}

#[tokio::test]
async fn send_without_outbound_url_fails() {
    let connector = LoopbackWebhookConnector::new(config());
    let handle = connector.connect().await.unwrap();

    let result = connector
        .send(
            &handle,
            taxbot::chat::OutboundRequest {
                channel_id: "chan-1".to_string(),
                content: "hello".to_string(),
                reply_to: None,
            },
        )
        .await;
    assert!(result.is_err());

    connector.disconnect(&handle).await.unwrap();
}
