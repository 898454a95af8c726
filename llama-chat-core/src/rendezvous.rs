use std::{
    collections::BTreeMap,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
    time::Duration,
};

use gethostname::gethostname;
use serde::{Deserialize, Serialize};
use slog::{debug, info, Logger};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};

use crate::{distributed::DistributedConfig, errors::RendezvousError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const CONNECT_INTERVAL: Duration = Duration::from_millis(200);

/// Newline delimited json frames exchanged during the rendezvous
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RendezvousFrame {
    Hello {
        rank: usize,
        world_size: usize,
        host: String,
    },
    Ready,
    Reject {
        reason: String,
    },
}

type FramedStream = BufReader<TcpStream>;

async fn write_frame(
    stream: &mut FramedStream,
    frame: &RendezvousFrame,
) -> Result<(), RendezvousError> {
    let mut line = serde_json::to_vec(frame)?;
    line.push(b'\n');
    stream.get_mut().write_all(&line).await?;
    Ok(())
}

async fn read_frame(stream: &mut FramedStream) -> Result<RendezvousFrame, RendezvousError> {
    let mut line = String::new();
    if stream.read_line(&mut line).await? == 0 {
        return Err(RendezvousError::Closed);
    }
    Ok(serde_json::from_str(line.trim_end())?)
}

/// The host listens on every interface, `MASTER_ADDR` only has to be reachable from the peers
fn listen_addr(addr: SocketAddr) -> SocketAddr {
    match addr {
        SocketAddr::V4(_) => SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), addr.port()),
        SocketAddr::V6(_) => SocketAddr::new(Ipv6Addr::UNSPECIFIED.into(), addr.port()),
    }
}

/// Rendezvous
/// Blocks until every process of the launch has checked in at `MASTER_ADDR:MASTER_PORT`.
/// Rank 0 hosts the rendezvous, every other rank dials it.
#[derive(Debug, Clone)]
pub struct Rendezvous {
    logger: Logger,
    config: DistributedConfig,
    timeout: Duration,
}

impl Rendezvous {
    pub fn new(logger: &Logger, config: &DistributedConfig) -> Self {
        Self {
            logger: logger.clone(),
            config: config.clone(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set how long to wait for the whole group
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn join(&self) -> Result<(), RendezvousError> {
        let addr = self.resolve().await?;
        if self.config.world_size == 1 {
            info!(self.logger, "single process launch, skipping rendezvous"; "addr" => addr.to_string());
            return Ok(());
        }

        info!(
            self.logger,
            "joining rendezvous";
            "rank" => self.config.rank,
            "world_size" => self.config.world_size,
            "addr" => addr.to_string()
        );
        let result = tokio::time::timeout(self.timeout, async {
            if self.config.is_leader() {
                self.host(addr).await
            } else {
                self.connect(addr).await
            }
        })
        .await;

        match result {
            Ok(result) => result,
            Err(_) => Err(RendezvousError::Timeout {
                addr: self.config.rendezvous_addr(),
                secs: self.timeout.as_secs(),
            }),
        }
    }

    async fn resolve(&self) -> Result<SocketAddr, RendezvousError> {
        let addr = self.config.rendezvous_addr();
        let mut addrs = tokio::net::lookup_host((
            self.config.master_addr.as_str(),
            self.config.master_port,
        ))
        .await
        .map_err(|source| RendezvousError::Resolve {
            addr: addr.clone(),
            source,
        })?;
        addrs.next().ok_or(RendezvousError::NoAddress(addr))
    }

    async fn host(&self, addr: SocketAddr) -> Result<(), RendezvousError> {
        let listener = TcpListener::bind(listen_addr(addr)).await?;
        let expected = self.config.world_size;
        let mut peers: BTreeMap<usize, FramedStream> = BTreeMap::new();

        while peers.len() < expected - 1 {
            let (socket, remote) = listener.accept().await?;
            let mut stream = BufReader::new(socket);
            let (rank, world_size, host) = match read_frame(&mut stream).await? {
                RendezvousFrame::Hello {
                    rank,
                    world_size,
                    host,
                } => (rank, world_size, host),
                other => return Err(RendezvousError::Unexpected(format!("{other:?}"))),
            };

            let rejection = if world_size != expected {
                Some(RendezvousError::WorldSizeMismatch {
                    rank,
                    reported: world_size,
                    expected,
                })
            } else if rank == 0 || rank >= expected {
                Some(RendezvousError::InvalidPeerRank {
                    rank,
                    world_size: expected,
                })
            } else if peers.contains_key(&rank) {
                Some(RendezvousError::DuplicateRank(rank))
            } else {
                None
            };
            if let Some(error) = rejection {
                // the host fails either way, the peer just learns why
                let reason = error.to_string();
                let _ = write_frame(&mut stream, &RendezvousFrame::Reject { reason }).await;
                return Err(error);
            }

            info!(
                self.logger,
                "peer joined rendezvous";
                "rank" => rank,
                "host" => host,
                "remote" => remote.to_string(),
                "joined" => peers.len() + 1
            );
            peers.insert(rank, stream);
        }

        for stream in peers.values_mut() {
            write_frame(stream, &RendezvousFrame::Ready).await?;
        }
        info!(self.logger, "rendezvous complete"; "world_size" => expected);
        Ok(())
    }

    async fn connect(&self, addr: SocketAddr) -> Result<(), RendezvousError> {
        let socket = loop {
            match TcpStream::connect(addr).await {
                Ok(socket) => break socket,
                Err(e) => {
                    debug!(self.logger, "rendezvous host not reachable yet"; "error" => e.to_string());
                    tokio::time::sleep(CONNECT_INTERVAL).await;
                }
            }
        };

        let mut stream = BufReader::new(socket);
        let hello = RendezvousFrame::Hello {
            rank: self.config.rank,
            world_size: self.config.world_size,
            host: gethostname().to_string_lossy().to_string(),
        };
        write_frame(&mut stream, &hello).await?;

        match read_frame(&mut stream).await? {
            RendezvousFrame::Ready => {
                info!(self.logger, "rendezvous complete"; "rank" => self.config.rank);
                Ok(())
            }
            RendezvousFrame::Reject { reason } => Err(RendezvousError::Rejected(reason)),
            other => Err(RendezvousError::Unexpected(format!("{other:?}"))),
        }
    }
}
