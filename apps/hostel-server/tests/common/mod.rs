#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use hostel_server::config::Config;
use hostel_server::AppState;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Config with the given rooms and small limits, independent of the environment.
pub fn test_config(rooms: &[&str], history_capacity: usize) -> Config {
    Config {
        port: 0,
        rooms: rooms.iter().map(|r| r.to_string()).collect(),
        history_capacity,
        message_cap: 254,
        outbound_buffer: 16,
    }
}

/// A server running on an ephemeral port. Sending on (or dropping) `shutdown`
/// stops the accept loop.
pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    pub shutdown: oneshot::Sender<()>,
}

/// Start an actual TCP server in the background.
pub async fn start_server(config: Config) -> TestServer {
    let state = AppState::from_config(config).expect("create rooms");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().unwrap();
    let (shutdown, shutdown_rx) = oneshot::channel::<()>();

    let service = state.service.clone();
    tokio::spawn(async move {
        hostel_server::server::serve(listener, service, async {
            let _ = shutdown_rx.await;
        })
        .await;
    });

    TestServer {
        addr,
        state,
        shutdown,
    }
}

/// A line-oriented client speaking the chat protocol.
pub struct TestClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        let (read, writer) = stream.into_split();
        Self {
            lines: BufReader::new(read).lines(),
            writer,
        }
    }

    pub async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .await
            .expect("send line");
    }

    /// Next line from the server; panics on timeout or EOF.
    pub async fn recv(&mut self) -> String {
        time::timeout(READ_TIMEOUT, self.lines.next_line())
            .await
            .expect("timed out waiting for a line")
            .expect("read error")
            .expect("server closed the connection")
    }

    /// Next line, or `None` once the server has closed the connection.
    pub async fn recv_or_eof(&mut self) -> Option<String> {
        time::timeout(READ_TIMEOUT, self.lines.next_line())
            .await
            .expect("timed out waiting for EOF")
            .expect("read error")
    }

    /// Round-trip an unknown command. Once the reply arrives every earlier
    /// command has been handled, and nothing else was queued before it.
    pub async fn sync(&mut self) {
        self.send("ping").await;
        assert_eq!(self.recv().await, "Unknown command: ping.");
    }

    /// Close the write direction, as a client hanging up would.
    pub async fn hang_up(&mut self) {
        self.writer.shutdown().await.expect("shutdown");
    }
}

/// Wait until `check` holds, polling the shared state.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    time::timeout(READ_TIMEOUT, async {
        while !check() {
            time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition never became true");
}
