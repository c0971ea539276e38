use std::sync::Arc;
use std::time::Duration;

use kabootar::protocol::{decode_line, encode_line};
use kabootar::{ChatMessage, ClientPacket, JoinPayload, Server, ServerConfig, ServerPacket};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

struct TestClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    async fn connect(addr: std::net::SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, writer) = stream.into_split();
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    async fn send(&mut self, pkt: &ClientPacket) {
        self.writer.write_all(&encode_line(pkt).unwrap()).await.unwrap();
    }

    async fn send_raw(&mut self, raw: &[u8]) {
        self.writer.write_all(raw).await.unwrap();
    }

    async fn recv(&mut self) -> ServerPacket {
        let line = timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .expect("timed out waiting for packet")
            .unwrap()
            .expect("connection closed");
        decode_line(&line).unwrap()
    }

    async fn recv_n(&mut self, n: usize) -> Vec<ServerPacket> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.recv().await);
        }
        out
    }

    async fn join(&mut self, name: &str) {
        self.send(&ClientPacket::Join(JoinPayload {
            username: name.into(),
        }))
        .await;
    }

    async fn say(&mut self, text: &str) {
        self.send(&ClientPacket::SendMessage(ChatMessage::new("ignored", text)))
            .await;
    }
}

async fn start(config: ServerConfig) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let srv = Arc::new(Server::new(&config).unwrap());
    tokio::spawn(srv.serve(listener));
    addr
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn alice_and_bob_over_tcp() {
    let addr = start(ServerConfig::default()).await;
    let mut alice = TestClient::connect(addr).await;
    let mut bob = TestClient::connect(addr).await;

    alice.join("Alice").await;
    assert_eq!(
        alice.recv_n(3).await,
        vec![
            ServerPacket::JoinedPersonName("Alice has joined the chat.".into()),
            ServerPacket::ActiveUsers(names(&["Alice"])),
            ServerPacket::UpdateUserList(names(&["Alice"])),
        ]
    );

    bob.join("Bob").await;
    assert_eq!(
        bob.recv_n(3).await,
        vec![
            ServerPacket::JoinedPersonName("Bob has joined the chat.".into()),
            ServerPacket::ActiveUsers(names(&["Alice", "Bob"])),
            ServerPacket::UpdateUserList(names(&["Alice", "Bob"])),
        ]
    );
    assert_eq!(
        alice.recv_n(2).await,
        vec![
            ServerPacket::JoinedPersonName("Bob has joined the chat.".into()),
            ServerPacket::UpdateUserList(names(&["Alice", "Bob"])),
        ]
    );

    alice.say("hi").await;
    let expected = ServerPacket::ReceiveMessage(ChatMessage::new("Alice", "hi"));
    assert_eq!(alice.recv().await, expected);
    assert_eq!(bob.recv().await, expected);

    drop(bob);
    assert_eq!(
        alice.recv_n(2).await,
        vec![
            ServerPacket::JoinedPersonName("Bob has disconnected".into()),
            ServerPacket::UpdateUserList(names(&["Alice"])),
        ]
    );
}

#[tokio::test]
async fn malformed_lines_do_not_disturb_others() {
    let addr = start(ServerConfig::default()).await;
    let mut alice = TestClient::connect(addr).await;
    let mut mallory = TestClient::connect(addr).await;

    alice.join("Alice").await;
    alice.recv_n(3).await;

    mallory.send_raw(b"not json\n").await;
    mallory
        .send_raw(b"{\"type\":\"rename\",\"payload\":{\"username\":\"x\"}}\n")
        .await;
    mallory.join("   ").await;
    mallory.say("before joining").await;

    alice.say("still here").await;
    assert_eq!(
        alice.recv().await,
        ServerPacket::ReceiveMessage(ChatMessage::new("Alice", "still here"))
    );
}

#[tokio::test]
async fn oversized_line_closes_only_that_connection() {
    let config = ServerConfig {
        max_line_bytes: 64,
        ..ServerConfig::default()
    };
    let addr = start(config).await;
    let mut alice = TestClient::connect(addr).await;
    let mut bob = TestClient::connect(addr).await;

    alice.join("Alice").await;
    alice.recv_n(3).await;
    bob.join("Bob").await;
    bob.recv_n(3).await;
    alice.recv_n(2).await;

    bob.send_raw(&[b'x'; 200]).await;

    assert_eq!(
        alice.recv_n(2).await,
        vec![
            ServerPacket::JoinedPersonName("Bob has disconnected".into()),
            ServerPacket::UpdateUserList(names(&["Alice"])),
        ]
    );
}
