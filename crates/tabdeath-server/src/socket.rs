//! Unix domain socket transport for local clients
//!
//! One JSON message per line in, one JSON reply per line out. Replies use
//! the same shapes as the HTTP API; failures are `{"ok":false,"error":..}`.

use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;

use crate::http::{dispatch, parse_message};
use crate::AppState;

/// Start the Unix socket server
pub async fn serve_unix_socket(
    path: impl AsRef<Path>,
    state: Arc<AppState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Remove stale socket file
    let path = path.as_ref();
    if path.exists() {
        std::fs::remove_file(path)?;
    }

    let listener = UnixListener::bind(path)?;
    tracing::info!("Unix socket listening on {:?}", path);

    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let (reader, writer) = stream.into_split();
                    if let Err(e) = handle_connection(reader, writer, state).await {
                        tracing::error!("Unix socket connection error: {}", e);
                    }
                });
            }
            Err(e) => {
                tracing::error!("Unix socket accept error: {}", e);
            }
        }
    }
}

/// Serve one connection until the peer closes it.
pub async fn handle_connection<R, W>(
    reader: R,
    mut writer: W,
    state: Arc<AppState>,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        if !line.trim().is_empty() {
            let reply = handle_line(line.trim().as_bytes(), &state).await;
            let mut out = reply.to_string();
            out.push('\n');
            writer.write_all(out.as_bytes()).await?;
            writer.flush().await?;
        }
        line.clear();
    }

    Ok(())
}

async fn handle_line(line: &[u8], state: &Arc<AppState>) -> serde_json::Value {
    let result = match parse_message(line) {
        Ok(message) => dispatch(state, message).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(reply) => reply.into_json(),
        Err(e) => {
            if e.status().is_server_error() {
                tracing::error!(error = %e, "socket message failed");
            }
            e.to_json()
        }
    }
}
