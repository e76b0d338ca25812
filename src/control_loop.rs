//! The supervision loop.
//!
//! Every tick the loop makes sure it holds a device connection, watches for
//! suspend/resume gaps, reads the temperature and pushes the mapped color to
//! the lighting server when it changed. Any failure drops the connection and
//! is retried on a later tick; only cancellation ends the loop.

use std::{any::Any, panic::AssertUnwindSafe, time::Duration};

use futures::FutureExt;
use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    error::{ErrorClass, Result, RgbError},
    gateway::{DeviceGateway, DeviceHandle, DeviceSelector, Endpoint},
    mappings::{ColorBands, Rgb},
    sensors::TemperatureSensor,
    sleep_monitor::{LoopClock, SleepWakeMonitor, SystemClock, WallClock},
    supervisor::ServerControl,
};

/// Timing and targeting knobs for the loop.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopSettings {
    pub tick: Duration,
    pub reconnect_delay: Duration,
    pub error_cooldown: Duration,
    pub sleep_gap: Duration,
    /// Consecutive connect failures before the server is checked again.
    pub restart_after_failures: u32,
    pub endpoint: Endpoint,
    pub selector: DeviceSelector,
}

impl LoopSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            tick: cfg.tick(),
            reconnect_delay: cfg.reconnect_delay(),
            error_cooldown: cfg.error_cooldown(),
            sleep_gap: cfg.sleep_gap(),
            restart_after_failures: cfg.restart_after_failures,
            endpoint: Endpoint::new(cfg.server.host.clone(), cfg.server.port),
            selector: cfg.target.clone(),
        }
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Last color confirmed on the devices. Starts as "never set".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppliedColor(Option<Rgb>);

impl AppliedColor {
    pub fn get(&self) -> Option<Rgb> {
        self.0
    }

    pub fn is(&self, color: Rgb) -> bool {
        self.0 == Some(color)
    }

    fn confirm(&mut self, color: Rgb) {
        self.0 = Some(color);
    }

    fn invalidate(&mut self) {
        self.0 = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connected,
}

/// State owned by the loop between ticks.
pub struct LoopContext {
    applied: AppliedColor,
    handle: Option<Box<dyn DeviceHandle>>,
    clock: LoopClock,
    connect_failures: u32,
}

impl LoopContext {
    fn new(monitor: SleepWakeMonitor) -> Self {
        Self {
            applied: AppliedColor::default(),
            handle: None,
            clock: LoopClock::new(monitor),
            connect_failures: 0,
        }
    }

    pub fn link(&self) -> LinkState {
        match self.handle {
            Some(_) => LinkState::Connected,
            None => LinkState::Disconnected,
        }
    }

    pub fn applied(&self) -> AppliedColor {
        self.applied
    }

    /// Forgets the connection. The next connection may talk to a fresh
    /// server, so the applied color is forgotten too.
    fn disconnect(&mut self) {
        if self.handle.take().is_some() {
            debug!("Dropping device connection");
        }
        self.applied.invalidate();
    }
}

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Could not connect; wait the reconnect delay.
    ConnectFailed,
    /// A suspend/resume gap was seen and the server restarted.
    Resumed,
    /// No temperature this tick.
    NoReading,
    /// Mapped color already on the devices.
    Unchanged(Rgb),
    /// Color written and confirmed.
    Applied(Rgb),
    /// Nothing matched the device selector.
    NoTargets(Rgb),
}

impl TickOutcome {
    /// Sleep before the next tick.
    pub fn delay(&self, settings: &LoopSettings) -> Duration {
        match self {
            TickOutcome::ConnectFailed => settings.reconnect_delay,
            _ => settings.tick,
        }
    }
}

pub struct ControlLoop {
    settings: LoopSettings,
    gateway: Box<dyn DeviceGateway>,
    server: Box<dyn ServerControl>,
    sensor: Box<dyn TemperatureSensor>,
    colors: ColorBands,
    wall_clock: Box<dyn WallClock>,
    ctx: LoopContext,
}

impl ControlLoop {
    pub fn new(
        settings: LoopSettings,
        gateway: Box<dyn DeviceGateway>,
        server: Box<dyn ServerControl>,
        sensor: Box<dyn TemperatureSensor>,
        colors: ColorBands,
    ) -> Self {
        let ctx = LoopContext::new(SleepWakeMonitor::new(settings.sleep_gap));
        Self {
            settings,
            gateway,
            server,
            sensor,
            colors,
            wall_clock: Box::new(SystemClock),
            ctx,
        }
    }

    pub fn with_clock(mut self, clock: Box<dyn WallClock>) -> Self {
        self.wall_clock = clock;
        self
    }

    pub fn context(&self) -> &LoopContext {
        &self.ctx
    }

    /// Runs ticks until `cancel` fires. Cancellation is observed while
    /// sleeping between ticks.
    pub async fn run(&mut self, cancel: CancellationToken) {
        info!(
            "Control loop started: {} every {:?}",
            self.settings.selector, self.settings.tick
        );

        loop {
            let delay = match AssertUnwindSafe(self.tick()).catch_unwind().await {
                Ok(Ok(outcome)) => outcome.delay(&self.settings),
                Ok(Err(e)) => self.recover(e),
                Err(panic) => {
                    error!("Tick panicked: {}", panic_message(panic.as_ref()));
                    self.ctx.disconnect();
                    self.settings.error_cooldown
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Exiting RGB controller...");
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Handles an error that escaped a tick and picks the next delay.
    fn recover(&mut self, e: RgbError) -> Duration {
        match e.class() {
            ErrorClass::Transient => {
                warn!("{e}");
                self.settings.tick
            }
            ErrorClass::ServerLifecycle => {
                warn!("{e}, will retry");
                self.settings.tick
            }
            ErrorClass::Unexpected => {
                error!("Error in main loop: {e}");
                self.ctx.disconnect();
                self.settings.error_cooldown
            }
        }
    }

    /// One iteration of the loop.
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        if self.ctx.clock.observe(self.wall_clock.now()) {
            warn!(
                "Wall-clock gap over {:?}, assuming the system resumed from sleep",
                self.settings.sleep_gap
            );
            self.ctx.disconnect();
            if !self.server.restart().await {
                error!("OpenRGB server did not come back after resume");
            }
            return Ok(TickOutcome::Resumed);
        }

        if self.ctx.handle.is_none() && !self.connect().await {
            return Ok(TickOutcome::ConnectFailed);
        }

        let temp = match self.sensor.read_temperature().await {
            Ok(temp) => temp,
            Err(e) => {
                warn!("Unable to read CPU temperature: {e}");
                return Ok(TickOutcome::NoReading);
            }
        };
        debug!("{} temperature: {temp}°C", self.sensor.key());

        let color = self.colors.color_for_temp(temp);
        if self.ctx.applied.is(color) {
            return Ok(TickOutcome::Unchanged(color));
        }

        let Some(handle) = self.ctx.handle.as_mut() else {
            return Ok(TickOutcome::ConnectFailed);
        };
        let report = match handle.set_static_color(&self.settings.selector, color).await {
            Ok(report) => report,
            Err(e) => {
                self.ctx.disconnect();
                return Err(e);
            }
        };

        if report.matched() == 0 {
            warn!("No matching devices for {}", self.settings.selector);
            return Ok(TickOutcome::NoTargets(color));
        }

        self.ctx.applied.confirm(color);
        Ok(TickOutcome::Applied(color))
    }

    /// Opens a session and logs the devices behind it. Returns false when
    /// the server could not be reached or the session could not be set up.
    async fn connect(&mut self) -> bool {
        match self.open_session().await {
            Ok(handle) => {
                self.ctx.connect_failures = 0;
                self.ctx.handle = Some(handle);
                true
            }
            Err(e) => {
                self.session_failed(e).await;
                false
            }
        }
    }

    async fn open_session(&mut self) -> Result<Box<dyn DeviceHandle>> {
        let mut handle = self.gateway.connect(&self.settings.endpoint).await?;
        let devices = handle.list_devices().await?;

        info!("Connected to OpenRGB at {}", self.settings.endpoint);
        info!("Detected devices:");
        for device in &devices {
            info!("Device: {} (Type: {:?})", device.name, device.device_type);
            info!("  Available modes: {:?}", device.modes);
            info!("  Zones: {}", device.zone_count);
            info!("  LEDs: {}", device.led_count);
        }
        Ok(handle)
    }

    /// Counts a failed session and checks on the server after
    /// `restart_after_failures` failures in a row.
    async fn session_failed(&mut self, e: RgbError) {
        self.ctx.connect_failures += 1;
        let endpoint = &self.settings.endpoint;
        let failures = self.ctx.connect_failures;
        match e.class() {
            ErrorClass::Unexpected => {
                error!("OpenRGB session at {endpoint} failed ({failures} in a row): {e}")
            }
            _ => warn!("Cannot connect to OpenRGB at {endpoint} ({failures} in a row): {e}"),
        }

        if failures >= self.settings.restart_after_failures {
            self.ctx.connect_failures = 0;
            if !self.server.ensure_running().await {
                warn!("OpenRGB server is still not running");
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
