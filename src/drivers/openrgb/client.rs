use std::time::Duration;

use log::debug;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::{
    error::{Result, RgbError},
    mappings::Rgb,
};

use super::{
    device_io::DeviceIO,
    protocol::{
        Command, ControllerData, HEADER_LEN, Header, MAX_CONTROLLERS, ModeData, PacketId, Response,
    },
};

/// Request/response client for the OpenRGB SDK protocol.
///
/// Every read and write is bounded by `io_timeout`. Read failures are
/// reported as connection errors, write failures as device write errors.
#[derive(Debug)]
pub struct OpenRgbClient<Io: DeviceIO> {
    io: Io,
    io_timeout: Duration,
}

impl<Io: DeviceIO> OpenRgbClient<Io> {
    pub fn new(io: Io, io_timeout: Duration) -> Self {
        Self { io, io_timeout }
    }

    /// Sends a command that has no reply.
    pub async fn send(&mut self, cmd: &Command) -> Result<()> {
        let pkt = cmd.to_bytes();
        let after = self.io_timeout;
        let io = &mut self.io;
        let write = async move {
            io.write_all(&pkt).await?;
            io.flush().await
        };
        tokio::time::timeout(after, write)
            .await
            .map_err(|_| RgbError::Timeout {
                what: "write",
                after,
            })?
            .map_err(RgbError::DeviceWrite)
    }

    /// Sends a command and waits for the matching reply.
    pub async fn request(&mut self, cmd: Command) -> Result<Response> {
        self.send(&cmd).await?;
        let expected = cmd.packet_id();
        loop {
            let (header, payload) = self.read_packet().await?;
            if header.is(expected) {
                return Response::parse(&cmd, &payload);
            }
            if header.is(PacketId::DeviceListUpdated) {
                debug!("Server reports a changed device list");
                continue;
            }
            return Err(RgbError::protocol(format!(
                "expected packet {} but got {}",
                expected.code(),
                header.id
            )));
        }
    }

    async fn read_packet(&mut self) -> Result<(Header, Vec<u8>)> {
        let mut head = [0u8; HEADER_LEN];
        self.read_exact(&mut head).await?;
        let header = Header::parse(&head)?;
        let mut payload = vec![0u8; header.len as usize];
        self.read_exact(&mut payload).await?;
        Ok((header, payload))
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let after = self.io_timeout;
        tokio::time::timeout(after, self.io.read_exact(buf))
            .await
            .map_err(|_| RgbError::Timeout {
                what: "read",
                after,
            })?
            .map(|_| ())
            .map_err(RgbError::Connection)
    }

    pub async fn set_client_name(&mut self, name: &str) -> Result<()> {
        self.send(&Command::SetClientName {
            name: name.to_string(),
        })
        .await
    }

    pub async fn controller_count(&mut self) -> Result<u32> {
        match self.request(Command::ControllerCount).await? {
            Response::ControllerCount(count) if count > MAX_CONTROLLERS => Err(RgbError::protocol(
                format!("server reports {count} controllers, limit is {MAX_CONTROLLERS}"),
            )),
            Response::ControllerCount(count) => Ok(count),
            other => Err(RgbError::protocol(format!("unexpected reply {other:?}"))),
        }
    }

    pub async fn controller_data(&mut self, device: u32) -> Result<ControllerData> {
        match self.request(Command::ControllerData { device }).await? {
            Response::ControllerData(data) => Ok(*data),
            other => Err(RgbError::protocol(format!("unexpected reply {other:?}"))),
        }
    }

    pub async fn update_mode(&mut self, device: u32, mode_index: i32, mode: ModeData) -> Result<()> {
        self.send(&Command::UpdateMode {
            device,
            mode_index,
            mode,
        })
        .await
    }

    pub async fn update_leds(&mut self, device: u32, colors: Vec<Rgb>) -> Result<()> {
        self.send(&Command::UpdateLeds { device, colors }).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio_test::io::Builder;

    /// Encodes a server reply packet.
    pub(crate) fn reply(id: PacketId, device: u32, payload: &[u8]) -> Vec<u8> {
        let header = Header {
            device,
            id: id.code(),
            len: payload.len() as u32,
        };
        let mut buf = header.to_bytes().to_vec();
        buf.extend_from_slice(payload);
        buf
    }

    fn timeout() -> Duration {
        Duration::from_secs(1)
    }

    #[tokio::test]
    async fn controller_count_round_trip() {
        let io = Builder::new()
            .write(&Command::ControllerCount.to_bytes())
            .read(&reply(PacketId::RequestControllerCount, 0, &2u32.to_le_bytes()))
            .build();
        let mut client = OpenRgbClient::new(io, timeout());

        assert_eq!(client.controller_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn absurd_controller_count_is_a_protocol_error() {
        let io = Builder::new()
            .write(&Command::ControllerCount.to_bytes())
            .read(&reply(PacketId::RequestControllerCount, 0, &u32::MAX.to_le_bytes()))
            .build();
        let mut client = OpenRgbClient::new(io, timeout());

        assert!(matches!(
            client.controller_count().await,
            Err(RgbError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn skips_device_list_notifications() {
        let io = Builder::new()
            .write(&Command::ControllerCount.to_bytes())
            .read(&reply(PacketId::DeviceListUpdated, 0, &[]))
            .read(&reply(PacketId::RequestControllerCount, 0, &5u32.to_le_bytes()))
            .build();
        let mut client = OpenRgbClient::new(io, timeout());

        assert_eq!(client.controller_count().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn unexpected_packet_is_a_protocol_error() {
        let io = Builder::new()
            .write(&Command::ControllerCount.to_bytes())
            .read(&reply(PacketId::UpdateMode, 0, &[]))
            .build();
        let mut client = OpenRgbClient::new(io, timeout());

        assert!(matches!(
            client.controller_count().await,
            Err(RgbError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn closed_connection_is_a_connection_error() {
        let io = Builder::new()
            .write(&Command::ControllerCount.to_bytes())
            .read(&reply(PacketId::RequestControllerCount, 0, &[])[..8])
            .build();
        let mut client = OpenRgbClient::new(io, timeout());

        assert!(matches!(
            client.controller_count().await,
            Err(RgbError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn failed_write_is_a_device_write_error() {
        let io = Builder::new()
            .write_error(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
            .build();
        let mut client = OpenRgbClient::new(io, timeout());

        let err = client
            .update_leds(0, vec![Rgb::new(255, 0, 0)])
            .await
            .unwrap_err();
        assert!(matches!(err, RgbError::DeviceWrite(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_server_times_out() {
        let io = Builder::new()
            .write(&Command::ControllerCount.to_bytes())
            .wait(Duration::from_secs(10))
            .build();
        let mut client = OpenRgbClient::new(io, timeout());

        assert!(matches!(
            client.controller_count().await,
            Err(RgbError::Timeout { what: "read", .. })
        ));
    }
}
