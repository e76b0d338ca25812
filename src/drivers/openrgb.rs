use std::time::Duration;

use async_trait::async_trait;
use log::{info, warn};

use crate::{
    config::ServerCfg,
    error::Result,
    gateway::{
        ApplyReport, DeviceGateway, DeviceHandle, DeviceInfo, DeviceSelector, DeviceType,
        Endpoint, SkippedDevice,
    },
    mappings::Rgb,
};

use self::{
    client::OpenRgbClient,
    device_io::DeviceIO,
    protocol::{COLOR_MODE_SPECIFIC, ControllerData},
};

pub mod client;
pub mod device_io;
pub mod protocol;

/// Gateway to an OpenRGB SDK server.
///
/// # Example
///
/// ```no_run
/// use thermal_rgbd::config::ServerCfg;
/// use thermal_rgbd::drivers::openrgb::OpenRgbGateway;
/// use thermal_rgbd::gateway::{DeviceGateway, DeviceSelector, Endpoint};
/// use thermal_rgbd::mappings::Rgb;
///
/// # async fn example() -> thermal_rgbd::error::Result<()> {
/// let gateway = OpenRgbGateway::from_cfg(&ServerCfg::default());
/// let mut handle = gateway.connect(&Endpoint::new("127.0.0.1", 6742)).await?;
/// let report = handle
///     .set_static_color(&DeviceSelector::All, Rgb::new(255, 127, 0))
///     .await?;
/// println!("updated {} device(s)", report.updated.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct OpenRgbGateway {
    client_name: String,
    io_timeout: Duration,
}

impl OpenRgbGateway {
    pub fn from_cfg(cfg: &ServerCfg) -> Self {
        Self {
            client_name: cfg.client_name.clone(),
            io_timeout: Duration::from_millis(cfg.io_timeout_ms),
        }
    }
}

#[async_trait]
impl DeviceGateway for OpenRgbGateway {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn DeviceHandle>> {
        let stream = device_io::connect(endpoint, self.io_timeout).await?;
        let mut client = OpenRgbClient::new(stream, self.io_timeout);
        client.set_client_name(&self.client_name).await?;
        Ok(Box::new(OpenRgbHandle { client }))
    }
}

/// Live SDK session.
#[derive(Debug)]
pub struct OpenRgbHandle<Io: DeviceIO> {
    client: OpenRgbClient<Io>,
}

impl<Io: DeviceIO> OpenRgbHandle<Io> {
    pub fn new(client: OpenRgbClient<Io>) -> Self {
        Self { client }
    }

    async fn controllers(&mut self) -> Result<Vec<(u32, ControllerData)>> {
        let count = self.client.controller_count().await?;
        let mut controllers = Vec::new();
        for index in 0..count {
            controllers.push((index, self.client.controller_data(index).await?));
        }
        Ok(controllers)
    }

    async fn paint(&mut self, index: u32, data: &ControllerData, color: Rgb) -> Result<bool> {
        let Some((mode_index, mode)) = data.static_mode() else {
            return Ok(false);
        };

        if data.active_mode != mode_index || mode.color_mode == COLOR_MODE_SPECIFIC {
            self.client
                .update_mode(index, mode_index, mode.clone().with_color(color))
                .await?;
        }
        if !data.leds.is_empty() {
            self.client
                .update_leds(index, vec![color; data.leds.len()])
                .await?;
        }
        Ok(true)
    }
}

fn device_info(index: u32, data: &ControllerData) -> DeviceInfo {
    DeviceInfo {
        index,
        name: data.name.clone(),
        device_type: DeviceType::from_code(data.device_type),
        modes: data.mode_names(),
        zone_count: data.zones.len(),
        led_count: data.leds.len(),
    }
}

#[async_trait]
impl<Io: DeviceIO> DeviceHandle for OpenRgbHandle<Io> {
    async fn list_devices(&mut self) -> Result<Vec<DeviceInfo>> {
        Ok(self
            .controllers()
            .await?
            .iter()
            .map(|(index, data)| device_info(*index, data))
            .collect())
    }

    async fn set_static_color(
        &mut self,
        selector: &DeviceSelector,
        color: Rgb,
    ) -> Result<ApplyReport> {
        let mut report = ApplyReport::default();

        for (index, data) in self.controllers().await? {
            let info = device_info(index, &data);
            if !selector.matches(&info) {
                continue;
            }

            info!("Targeting device: {}", info.name);
            if self.paint(index, &data, color).await? {
                info!("{} RGB set to {color}", info.name);
                report.updated.push(info.name);
            } else {
                warn!(
                    "Static mode not available for {}. Available modes: {:?}",
                    info.name, info.modes
                );
                report.skipped.push(SkippedDevice {
                    name: info.name,
                    available_modes: info.modes,
                });
            }
        }

        Ok(report)
    }
}
