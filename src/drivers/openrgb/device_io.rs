use std::time::Duration;

use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};

use crate::{
    error::{Result, RgbError},
    gateway::Endpoint,
};

/// Byte stream the SDK client runs over: a TCP socket in production, a
/// scripted stream in tests.
pub trait DeviceIO: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> DeviceIO for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// Opens a TCP connection to the SDK server within `timeout`.
pub async fn connect(endpoint: &Endpoint, timeout: Duration) -> Result<TcpStream> {
    let stream = tokio::time::timeout(
        timeout,
        TcpStream::connect((endpoint.host.as_str(), endpoint.port)),
    )
    .await
    .map_err(|_| RgbError::Timeout {
        what: "connect",
        after: timeout,
    })?
    .map_err(RgbError::Connection)?;

    stream.set_nodelay(true).map_err(RgbError::Connection)?;
    Ok(stream)
}
