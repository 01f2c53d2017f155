//! Blocking inference against a WebSocket worker running on its own thread.

use std::net::TcpListener as StdListener;
use std::thread;

use client::Client;
use futures::{SinkExt, StreamExt};
use protocol::{AccessKey, Address, Outcome, Payload};
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::Message;

/// Serves one connection: accepts the handshake with a "dict" typing, answers
/// numbers with their double and anything else with a failure.
fn spawn_doubling_worker() -> (Address, thread::JoinHandle<()>) {
    let listener = StdListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let address = Address::new(format!("ws://{}", listener.local_addr().unwrap())).unwrap();

    let handle = thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();

            let _registration = ws.next().await.unwrap().unwrap();
            let typing = json!({
                "status": "success",
                "workload_typing": {"input": "dict", "output": "dict"},
            });
            ws.send(Message::binary(rmp_serde::to_vec_named(&typing).unwrap()))
                .await
                .unwrap();

            while let Some(Ok(message)) = ws.next().await {
                if message.is_close() {
                    break;
                }
                let request: Value = rmp_serde::from_slice(&message.into_data()).unwrap();
                let reply = match request["data"].as_i64() {
                    Some(n) => json!({"status": "success", "data": n * 2}),
                    None => json!({"status": "error", "message": "expected a number"}),
                };
                ws.send(Message::binary(rmp_serde::to_vec_named(&reply).unwrap()))
                    .await
                    .unwrap();
            }
        });
    });

    (address, handle)
}

#[test]
fn test_blocking_inference_over_websocket() {
    let (address, worker) = spawn_doubling_worker();
    let client = Client::new(address, AccessKey::new("access:472f9457").unwrap());

    let outcomes = client
        .inference(
            vec![json!(1).into(), json!("x").into(), json!(21).into()],
            None,
            None,
        )
        .unwrap();

    assert_eq!(
        outcomes,
        vec![
            Outcome::Success(Payload::Json(json!(2))),
            Outcome::Failure("expected a number".into()),
            Outcome::Success(Payload::Json(json!(42))),
        ]
    );
    worker.join().unwrap();
}
