use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, Clone)]
enum ServerAction {
    Send(String),
    Close,
}

/// Local WebSocket server speaking the Finnhub frame format.
/// Frames sent by clients are collected; frames pushed by the test go to
/// every open connection.
pub struct MockFinnhubServer {
    pub addr: SocketAddr,
    actions: broadcast::Sender<ServerAction>,
    received: mpsc::UnboundedReceiver<String>,
    connections: Arc<AtomicUsize>,
}

impl MockFinnhubServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (actions, _) = broadcast::channel(64);
        let (received_tx, received) = mpsc::unbounded_channel();
        let connections = Arc::new(AtomicUsize::new(0));

        let actions_for_accept = actions.clone();
        let connections_for_accept = connections.clone();
        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                let Ok(ws) = accept_async(tcp).await else {
                    continue;
                };
                connections_for_accept.fetch_add(1, Ordering::SeqCst);
                let mut actions = actions_for_accept.subscribe();
                let received_tx = received_tx.clone();

                tokio::spawn(async move {
                    let (mut write, mut read) = ws.split();
                    loop {
                        tokio::select! {
                            message = read.next() => match message {
                                Some(Ok(Message::Text(text))) => {
                                    let _ = received_tx.send(text);
                                }
                                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                                Some(Ok(_)) => {}
                            },
                            action = actions.recv() => match action {
                                Ok(ServerAction::Send(text)) => {
                                    if write.send(Message::Text(text)).await.is_err() {
                                        break;
                                    }
                                }
                                Ok(ServerAction::Close) | Err(_) => {
                                    let _ = write.send(Message::Close(None)).await;
                                    break;
                                }
                            }
                        }
                    }
                });
            }
        });

        Self {
            addr,
            actions,
            received,
            connections,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn send(&self, frame: &str) {
        let _ = self.actions.send(ServerAction::Send(frame.to_string()));
    }

    pub fn close_connections(&self) {
        let _ = self.actions.send(ServerAction::Close);
    }

    /// Next frame received from any client
    pub async fn next_frame(&mut self, within: Duration) -> Option<String> {
        tokio::time::timeout(within, self.received.recv())
            .await
            .ok()
            .flatten()
    }

    /// Skip frames until one equals `expected`
    pub async fn expect_frame(&mut self, expected: &str, within: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match self.next_frame(remaining).await {
                Some(frame) if frame == expected => return true,
                Some(_) => continue,
                None => return false,
            }
        }
    }
}

/// An address nothing listens on
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}
