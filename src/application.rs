//! Application entry point and builder pattern implementation.

use anyhow::{Context, Result, anyhow};
use log::info;
use tokio_util::sync::CancellationToken;

use crate::{
    config::ConfigManager,
    control_loop::{ControlLoop, LoopSettings},
    drivers::openrgb::OpenRgbGateway,
    error::RgbError,
    gateway::DeviceGateway,
    sensors::TemperatureSensor,
    sleep_monitor::{SystemClock, WallClock},
    supervisor::{ServerControl, ServerSupervisor},
    temperature_sensors::CommandSensor,
};

/// The daemon: boots the lighting server, then runs the control loop until
/// cancelled.
///
/// # Example
///
/// ```no_run
/// use thermal_rgbd::application::Application;
/// use thermal_rgbd::config::ConfigManager;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config_manager = ConfigManager::load(None)?;
/// Application::builder()
///     .with_config_manager(config_manager)
///     .build()?
///     .run(CancellationToken::new())
///     .await
/// # }
/// ```
pub struct Application {
    config_manager: ConfigManager,
    gateway: Box<dyn DeviceGateway>,
    server: Box<dyn ServerControl>,
    sensor: Box<dyn TemperatureSensor>,
    clock: Box<dyn WallClock>,
}

impl Application {
    /// Creates a new ApplicationBuilder for constructing Application instances.
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    /// Starts the lighting server and runs the control loop.
    ///
    /// Fails only when the server cannot be brought up on first boot; the
    /// loop itself returns once `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let config = self.config_manager.config();
        info!("Using configuration from {}", self.config_manager.source());

        let mut server = self.server;
        if !server.ensure_running().await {
            return Err(RgbError::ServerLifecycle(format!(
                "no server reachable at {}:{}",
                config.server.host, config.server.port
            )))
            .context("Failed to start OpenRGB server. Exiting.");
        }

        let mut control_loop = ControlLoop::new(
            LoopSettings::from_config(config),
            self.gateway,
            server,
            self.sensor,
            config.colors.clone(),
        )
        .with_clock(self.clock);

        control_loop.run(cancel).await;
        Ok(())
    }
}

/// Builder pattern for creating Application instances.
///
/// Collaborators not supplied explicitly are built from the configuration.
pub struct ApplicationBuilder {
    config_manager: Option<ConfigManager>,
    gateway: Option<Box<dyn DeviceGateway>>,
    server: Option<Box<dyn ServerControl>>,
    sensor: Option<Box<dyn TemperatureSensor>>,
    clock: Option<Box<dyn WallClock>>,
}

impl ApplicationBuilder {
    fn new() -> Self {
        Self {
            config_manager: None,
            gateway: None,
            server: None,
            sensor: None,
            clock: None,
        }
    }

    /// Sets the configuration manager for the application.
    pub fn with_config_manager(mut self, config_manager: ConfigManager) -> Self {
        self.config_manager = Some(config_manager);
        self
    }

    pub fn with_gateway(mut self, gateway: Box<dyn DeviceGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn with_server_control(mut self, server: Box<dyn ServerControl>) -> Self {
        self.server = Some(server);
        self
    }

    pub fn with_sensor(mut self, sensor: Box<dyn TemperatureSensor>) -> Self {
        self.sensor = Some(sensor);
        self
    }

    pub fn with_clock(mut self, clock: Box<dyn WallClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the Application instance with the provided configuration.
    pub fn build(self) -> Result<Application> {
        let config_manager = self
            .config_manager
            .ok_or_else(|| anyhow!("Configuration manager is required"))?;
        let config = config_manager.config();

        let gateway = self
            .gateway
            .unwrap_or_else(|| Box::new(OpenRgbGateway::from_cfg(&config.server)));
        let server = self
            .server
            .unwrap_or_else(|| Box::new(ServerSupervisor::from_cfg(&config.server)));
        let sensor = self
            .sensor
            .unwrap_or_else(|| Box::new(CommandSensor::from_cfg(&config.sensor)));
        let clock = self.clock.unwrap_or_else(|| Box::new(SystemClock));

        Ok(Application {
            config_manager,
            gateway,
            server,
            sensor,
            clock,
        })
    }
}
