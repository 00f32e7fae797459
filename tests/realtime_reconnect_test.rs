// Reconnect behavior against a real local websocket server: room membership
// is replayed on the new connection, exactly one resync notice reaches
// subscribers, and the attempt budget is honored when nothing is listening.

use futures_util::StreamExt;
use keepsake::realtime::{RealtimeClient, RealtimeEvent, MAX_RECONNECT_ATTEMPTS};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

async fn recv_frame(rx: &mut mpsc::UnboundedReceiver<(u32, String)>) -> (u32, String) {
    tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("no frame before timeout")
        .expect("server task gone")
}

#[tokio::test]
async fn reconnect_rejoins_rooms_and_signals_one_resync() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        // First connection: read the join frame, then hang up
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        if let Some(Ok(Message::Text(text))) = ws.next().await {
            let _ = frames_tx.send((1, text.as_str().to_string()));
        }
        drop(ws);

        // Second connection stays up
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while let Some(Ok(message)) = ws.next().await {
            if let Message::Text(text) = message {
                let _ = frames_tx.send((2, text.as_str().to_string()));
            }
        }
    });

    let handle = RealtimeClient::start(format!("ws://{addr}"));
    let mut events = handle.subscribe();
    handle.join("host-EV1");

    let (conn, frame) = recv_frame(&mut frames_rx).await;
    assert_eq!(conn, 1);
    assert!(frame.contains("join") && frame.contains("host-EV1"), "{frame}");

    // The server hung up; membership must be replayed on the new connection
    let (conn, frame) = recv_frame(&mut frames_rx).await;
    assert_eq!(conn, 2);
    assert!(frame.contains("join") && frame.contains("host-EV1"), "{frame}");

    let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
        .await
        .expect("no event before timeout")
        .unwrap();
    assert!(matches!(event, RealtimeEvent::Resynced), "{event:?}");

    // Exactly one: the rejoin already happened, nothing else should follow
    assert!(
        tokio::time::timeout(Duration::from_millis(500), events.recv())
            .await
            .is_err(),
        "unexpected second notice"
    );
}

#[tokio::test]
async fn reconnect_attempts_are_bounded() {
    // Grab a free port, then close it so every connect is refused
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let handle = RealtimeClient::start(format!("ws://{addr}"));
    let mut events = handle.subscribe();

    // 5 attempts with a fixed 2 s delay between them, then the budget is gone
    let budget = Duration::from_secs(MAX_RECONNECT_ATTEMPTS as u64 * 3);
    let event = tokio::time::timeout(budget, events.recv())
        .await
        .expect("no event before timeout")
        .unwrap();
    assert!(matches!(event, RealtimeEvent::ConnectionLost), "{event:?}");
}
