// tests/common.rs
#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use pickem_realtime_rs::websocket::ConnectionState;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::Message;

static INIT: Once = Once::new();

// Initializes the logger once across all tests.
pub fn setup() {
    INIT.call_once(|| {
        env_logger::builder().is_test(true).try_init().ok();
    });
}

/// One accepted client connection, bridged to channels.
///
/// Dropping the `tx` side makes the server close the connection, which the
/// client sees as an unexpected closure.
pub struct ServerConn {
    /// Frames the server will push to the client.
    pub tx: mpsc::UnboundedSender<Message>,
    /// Frames the client sent to the server.
    pub rx: mpsc::UnboundedReceiver<Message>,
    /// Request URI from the handshake, including the query string.
    pub request_uri: String,
}

impl ServerConn {
    pub fn send_text(&self, text: &str) {
        self.tx
            .send(Message::Text(text.to_string()))
            .expect("server connection gone");
    }

    pub async fn recv_text(&mut self, dur: Duration) -> String {
        let fut = async {
            loop {
                match self.rx.recv().await {
                    Some(Message::Text(text)) => return text,
                    Some(_) => continue,
                    None => panic!("client connection closed"),
                }
            }
        };
        timeout(dur, fut).await.expect("timed out waiting for frame")
    }
}

/// An in-process WebSocket server on a loopback port.
pub struct MockServer {
    pub addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
    rejecting: Arc<AtomicBool>,
    conn_rx: mpsc::UnboundedReceiver<ServerConn>,
}

impl MockServer {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock server");
        let addr = listener.local_addr().expect("no local addr");
        let accepted = Arc::new(AtomicUsize::new(0));
        let rejecting = Arc::new(AtomicBool::new(false));
        let (conn_tx, conn_rx) = mpsc::unbounded_channel();

        tokio::spawn({
            let accepted = Arc::clone(&accepted);
            let rejecting = Arc::clone(&rejecting);
            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    accepted.fetch_add(1, Ordering::SeqCst);
                    if rejecting.load(Ordering::SeqCst) {
                        // Drop the socket before the handshake so the
                        // client's connect attempt fails.
                        drop(stream);
                        continue;
                    }
                    let uri = Arc::new(std::sync::Mutex::new(String::new()));
                    let callback = {
                        let uri = Arc::clone(&uri);
                        move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                            *uri.lock().unwrap() = req.uri().to_string();
                            Ok(resp)
                        }
                    };
                    let ws = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
                        Ok(ws) => ws,
                        Err(_) => continue,
                    };
                    let request_uri = uri.lock().unwrap().clone();
                    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
                    let (in_tx, in_rx) = mpsc::unbounded_channel::<Message>();
                    let conn = ServerConn {
                        tx: out_tx,
                        rx: in_rx,
                        request_uri,
                    };
                    if conn_tx.send(conn).is_err() {
                        return;
                    }
                    tokio::spawn(async move {
                        let (mut sink, mut stream) = ws.split();
                        loop {
                            tokio::select! {
                                out = out_rx.recv() => match out {
                                    Some(msg) => {
                                        if sink.send(msg).await.is_err() {
                                            break;
                                        }
                                    }
                                    None => {
                                        let _ = sink.send(Message::Close(None)).await;
                                        break;
                                    }
                                },
                                inbound = stream.next() => match inbound {
                                    Some(Ok(msg)) => {
                                        let _ = in_tx.send(msg);
                                    }
                                    _ => break,
                                },
                            }
                        }
                    });
                }
            }
        });

        Self {
            addr,
            accepted,
            rejecting,
            conn_rx,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Total TCP connections seen, including rejected ones.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// When rejecting, sockets are dropped before the WebSocket handshake.
    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    /// Waits for the next client connection to complete its handshake.
    pub async fn next_conn(&mut self, dur: Duration) -> ServerConn {
        timeout(dur, self.conn_rx.recv())
            .await
            .expect("timed out waiting for a client connection")
            .expect("mock server stopped")
    }
}

pub async fn wait_for_state(
    rx: &mut watch::Receiver<ConnectionState>,
    target: ConnectionState,
    dur: Duration,
) {
    let fut = async {
        loop {
            if *rx.borrow_and_update() == target {
                return;
            }
            rx.changed().await.expect("state channel closed");
        }
    };
    timeout(dur, fut)
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for state {:?}", target));
}
