use std::path::PathBuf;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpStream, UnixStream};
use tracegraph_core::config::Config;

use crate::protocol::{ApiRequest, ApiResponse};

pub enum QueryClient {
    Uds(BufReader<UnixStream>),
    Tcp(BufReader<TcpStream>),
}

impl QueryClient {
    /// Explicit `--uds` wins, then the configured socket if it accepts, then TCP.
    pub async fn connect(
        uds: Option<PathBuf>,
        addr: Option<String>,
        cfg: &Config,
    ) -> anyhow::Result<Self> {
        if let Some(path) = uds {
            let stream = UnixStream::connect(&path)
                .await
                .with_context(|| format!("connect UDS query server {}", path.display()))?;
            return Ok(Self::Uds(BufReader::new(stream)));
        }

        if addr.is_none()
            && let Ok(stream) = UnixStream::connect(&cfg.uds_path).await
        {
            return Ok(Self::Uds(BufReader::new(stream)));
        }

        let addr = addr.unwrap_or_else(|| cfg.query_tcp_addr.clone());
        let stream = TcpStream::connect(&addr)
            .await
            .with_context(|| format!("connect query server TCP {addr}"))?;
        Ok(Self::Tcp(BufReader::new(stream)))
    }

    pub async fn request(&mut self, req: ApiRequest) -> anyhow::Result<ApiResponse> {
        let payload = serde_json::to_vec(&req)?;
        match self {
            QueryClient::Uds(stream) => exchange(stream, &payload).await,
            QueryClient::Tcp(stream) => exchange(stream, &payload).await,
        }
    }
}

async fn exchange<T>(stream: &mut BufReader<T>, payload: &[u8]) -> anyhow::Result<ApiResponse>
where
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    stream.get_mut().write_all(payload).await?;
    stream.get_mut().write_all(b"\n").await?;
    stream.get_mut().flush().await?;

    let mut line = String::new();
    stream.read_line(&mut line).await?;
    if line.is_empty() {
        anyhow::bail!("query server closed the connection");
    }
    serde_json::from_str(&line).context("decode query response")
}
