pub mod dispatcher;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::ServerConfig;
use crate::error::ConfigError;
use crate::protocol::{decode_line, encode_line, ClientPacket, ConnectionId, ServerPacket};
use dispatcher::DispatchCommand;

// A peer that accepts no bytes for this long is treated as gone.
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

// ─── Server ─────────────────────────────────────────────────────────────────

/// Line-JSON TCP transport in front of the dispatcher.
///
/// Each socket becomes one logical connection: a read pump turning lines into
/// [`DispatchCommand`]s and a write pump draining the connection's outbox.
pub struct Server {
    dispatch_tx: mpsc::Sender<DispatchCommand>,
    conn_counter: AtomicU64,
    outbox_capacity: usize,
    max_line_bytes: usize,
}

impl Server {
    /// Validates `config` and spawns the dispatcher task. Must be called
    /// inside a tokio runtime.
    pub fn new(config: &ServerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let dispatch_tx = dispatcher::spawn(config.audience, config.mailbox_capacity);

        Ok(Self {
            dispatch_tx,
            conn_counter: AtomicU64::new(0),
            outbox_capacity: config.outbox_capacity,
            max_line_bytes: config.max_line_bytes,
        })
    }

    pub async fn listen_and_serve(self: Arc<Self>, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Accepts connections on an already bound listener until accepting fails.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        info!(addr = %listener.local_addr()?, "listening");

        loop {
            match listener.accept().await {
                Ok((conn, peer)) => {
                    let srv = self.clone();
                    tokio::spawn(srv.serve_conn(conn, peer));
                }
                Err(err) => {
                    error!(%err, "accept failed");
                    return Ok(());
                }
            }
        }
    }

    async fn serve_conn(self: Arc<Self>, conn: TcpStream, peer: SocketAddr) {
        let id = ConnectionId(self.conn_counter.fetch_add(1, Ordering::Relaxed));
        let span = info_span!("conn", conn = %id, %peer);
        self.run_conn(id, conn).instrument(span).await;
    }

    async fn run_conn(&self, id: ConnectionId, conn: TcpStream) {
        let (outbox, mut outbox_rx) = mpsc::channel::<Arc<ServerPacket>>(self.outbox_capacity);
        if self
            .dispatch_tx
            .send(DispatchCommand::Connect { id, outbox })
            .await
            .is_err()
        {
            warn!("dispatcher stopped; refusing connection");
            return;
        }
        debug!("connection opened");

        let (reader, mut writer) = conn.into_split();

        // Write pump: ends once the dispatcher drops the outbox or the peer goes away.
        let mut write_pump = tokio::spawn(
            async move {
                while let Some(pkt) = outbox_rx.recv().await {
                    let data = match encode_line(pkt.as_ref()) {
                        Ok(data) => data,
                        Err(err) => {
                            warn!(%err, "dropping unencodable packet");
                            continue;
                        }
                    };
                    match timeout(WRITE_TIMEOUT, writer.write_all(&data)).await {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => {
                            debug!(%err, "write failed");
                            break;
                        }
                        Err(_) => {
                            warn!("peer stopped reading; write timed out");
                            break;
                        }
                    }
                }
            }
            .in_current_span(),
        );

        tokio::select! {
            res = self.read_pump(id, reader) => {
                if let Err(err) = res {
                    warn!(%err, "closing connection");
                }
                write_pump.abort();
            }
            _ = &mut write_pump => {
                debug!("outbox closed by dispatcher");
            }
        }

        self.dispatch_tx
            .send(DispatchCommand::Disconnect { id })
            .await
            .ok();
        info!("connection closed");
    }

    async fn read_pump(&self, id: ConnectionId, reader: OwnedReadHalf) -> Result<()> {
        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        let limit = self.max_line_bytes as u64 + 1;

        loop {
            line.clear();
            let n = (&mut reader).take(limit).read_line(&mut line).await?;
            if n == 0 {
                return Ok(());
            }
            if n as u64 >= limit && !line.ends_with('\n') {
                bail!("line exceeds {} bytes", self.max_line_bytes);
            }
            if line.trim().is_empty() {
                continue;
            }

            let pkt = match decode_line::<ClientPacket>(&line) {
                Ok(pkt) => pkt,
                Err(err) => {
                    debug!(%err, "dropping packet");
                    continue;
                }
            };
            let cmd = match pkt {
                ClientPacket::Join(p) => DispatchCommand::Join {
                    id,
                    username: p.username,
                },
                ClientPacket::SendMessage(m) => DispatchCommand::SendMessage { id, text: m.text },
            };
            self.dispatch_tx
                .send(cmd)
                .await
                .map_err(|_| anyhow!("dispatcher stopped"))?;
        }
    }
}
