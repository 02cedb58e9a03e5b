//! End-to-end tests over real TCP: spawn a rosterd instance with a
//! temporary configuration directory and drive it with line-based clients.

use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

// SHA-512 of "wonderland".
const ALICE_HASH: &str = "92ed1f0dfa10ad6b5a81d10560711b8d0f5cf5582221c7c14c7cbd594958c730b46a491979aa6f79de57d53237ff363d88464d141071ca52af31c63382f6c7a6";

struct TestServer {
    child: Child,
    port: u16,
    _dir: tempfile::TempDir,
}

impl TestServer {
    /// Write a minimal configuration directory and spawn the server on the
    /// given port, waiting until it accepts connections.
    async fn spawn(port: u16) -> TestServer {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");

        let config = format!(
            r#"
[server]
name = "test.server"
port = {port}
pidfile = "{pidfile}"
use_ipv4 = true

[users]
alice = "{ALICE_HASH}"

[channels.lounge]
topic = "testing grounds"
users = ["alice"]
allow_observers = true
"#,
            pidfile = dir.path().join("rosterd.pid").display(),
        );
        std::fs::write(dir.path().join("rosterd.toml"), config).unwrap();
        std::fs::write(dir.path().join("motd.txt"), "Test Server\n").unwrap();

        let child = Command::new(env!("CARGO_BIN_EXE_rosterd"))
            .arg(dir.path())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("Failed to spawn rosterd");

        // Wait for the listener to come up.
        for _ in 0..50 {
            if TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
                return TestServer {
                    child,
                    port,
                    _dir: dir,
                };
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("rosterd did not start listening on port {port}");
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    async fn connect(server: &TestServer) -> TestClient {
        let stream = TcpStream::connect(("127.0.0.1", server.port))
            .await
            .expect("Failed to connect");
        let (read_half, write_half) = stream.into_split();
        TestClient {
            reader: BufReader::new(read_half),
            writer: write_half,
        }
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\r\n").as_bytes())
            .await
            .expect("Failed to send");
    }

    /// Read one line; `None` on EOF or after two seconds of silence.
    async fn recv(&mut self) -> Option<String> {
        let mut line = String::new();
        match timeout(Duration::from_secs(2), self.reader.read_line(&mut line)).await {
            Ok(Ok(0)) | Err(_) => None,
            Ok(Ok(_)) => Some(line.trim_end().to_string()),
            Ok(Err(_)) => None,
        }
    }

    /// Read lines until one matches, returning it.
    async fn recv_until(&mut self, needle: &str) -> String {
        loop {
            let line = self
                .recv()
                .await
                .unwrap_or_else(|| panic!("connection closed while waiting for {needle:?}"));
            if line.contains(needle) {
                return line;
            }
        }
    }

    async fn register(&mut self, nick: &str) {
        self.send(&format!("NICK {nick}")).await;
        self.send(&format!("USER {nick} 0 * :{nick}")).await;
        self.recv_until("376").await;
    }
}

#[tokio::test]
async fn test_welcome_burst_over_tcp() {
    let server = TestServer::spawn(16710).await;
    let mut client = TestClient::connect(&server).await;

    client.send("NICK bob").await;
    client.send("USER bob 0 * :Bob").await;

    let welcome = client.recv_until("001").await;
    assert_eq!(
        welcome,
        ":test.server 001 bob :Welcome to the test.server Internet Relay Chat Network bob"
    );
    client.recv_until("372").await;
    client.recv_until("376").await;
    client.recv_until("MODE bob :+i").await;
}

#[tokio::test]
async fn test_channel_traffic_between_clients() {
    let server = TestServer::spawn(16711).await;

    let mut alice = TestClient::connect(&server).await;
    alice.register("alice").await;
    alice.recv_until("This nickname is protected.").await;
    alice.send("NS IDENTIFY wonderland").await;
    alice.recv_until("You have successfully identified!").await;

    alice.send("JOIN #lounge").await;
    alice.recv_until(":alice!alice@network JOIN #lounge").await;
    alice
        .recv_until(":ChanServ!chanserv@virtual MODE #lounge +v alice")
        .await;
    alice.recv_until("332 alice #lounge :testing grounds").await;
    alice.recv_until("366").await;

    let mut bob = TestClient::connect(&server).await;
    bob.register("bob").await;
    bob.send("JOIN #lounge").await;
    bob.recv_until(":bob!bob@network JOIN #lounge").await;
    alice.recv_until(":bob!bob@network JOIN #lounge").await;

    alice.send("PRIVMSG #lounge :hello bob").await;
    let msg = bob
        .recv_until(":alice!alice@network PRIVMSG #lounge :hello bob")
        .await;
    assert!(msg.ends_with("hello bob"));

    // Voiceless observers cannot speak.
    bob.send("PRIVMSG #lounge :can I talk?").await;
    bob.recv_until("404 bob #lounge :Cannot send to channel").await;

    // A departing client is announced exactly once.
    bob.send("QUIT :whatever").await;
    alice.recv_until(":bob!bob@network QUIT :Quit").await;
}

#[tokio::test]
async fn test_overlong_line_disconnects() {
    let server = TestServer::spawn(16712).await;
    let mut client = TestClient::connect(&server).await;
    client.register("eve").await;

    client.send(&format!("PRIVMSG x :{}", "a".repeat(600))).await;
    client.recv_until("ERROR :Closing Link: eve (Message too long)").await;
    // Nothing more follows the farewell.
    assert_eq!(client.recv().await, None);
}

#[tokio::test]
async fn test_ghost_over_tcp() {
    let server = TestServer::spawn(16713).await;

    let mut first = TestClient::connect(&server).await;
    first.register("alice").await;

    let mut second = TestClient::connect(&server).await;
    second.register("rescuer").await;
    second.send("NS GHOST alice wonderland").await;
    second.recv_until("The nickname has been ghosted!").await;

    first
        .recv_until("ERROR :Closing Link: alice (Disconnected by GHOST command)")
        .await;
    assert_eq!(first.recv().await, None);

    // The nickname is free again.
    second.send("NICK alice").await;
    second.recv_until(":rescuer!rescuer@network NICK alice").await;
}
