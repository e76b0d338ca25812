//! # thermal_rgbd
//!
//! A Linux daemon that paints RGB lighting according to CPU temperature,
//! driving devices through an OpenRGB SDK server.
//!
//! ## Features
//!
//! - **Supervised server**: launches the OpenRGB server and polls it with a
//!   bounded retry policy
//! - **Sleep aware**: wall-clock gaps between ticks are treated as a
//!   suspend/resume and trigger a server restart
//! - **Self healing**: any device failure drops the connection, which is
//!   re-established on a later tick
//! - **Quiet writes**: a color is only sent when the temperature band changes
//!
//! ## Architecture
//!
//! - [`ControlLoop`](control_loop::ControlLoop) - single-threaded orchestrator
//! - [`ServerSupervisor`](supervisor::ServerSupervisor) - server lifecycle
//! - [`DeviceGateway`](gateway::DeviceGateway) - lighting server client seam,
//!   implemented by [`OpenRgbGateway`](drivers::openrgb::OpenRgbGateway)
//! - [`TemperatureSensor`](sensors::TemperatureSensor) - temperature source
//!
//! ## Example
//!
//! ```no_run
//! use thermal_rgbd::{application::Application, config::ConfigManager};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let config_manager = ConfigManager::load(None)?;
//!     Application::builder()
//!         .with_config_manager(config_manager)
//!         .build()?
//!         .run(CancellationToken::new())
//!         .await
//! }
//! ```

pub mod application;
pub mod cli;
pub mod config;
pub mod control_loop;
pub mod drivers;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod mappings;
pub mod retry;
pub mod sensors;
pub mod sleep_monitor;
pub mod supervisor;
pub mod temperature_sensors;
