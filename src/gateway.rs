//! Lighting gateway abstraction and trait definitions.
//!
//! The control loop only talks to lighting hardware through these traits.
//! [`DeviceGateway`] opens a connection to the lighting server and hands out a
//! [`DeviceHandle`]; the handle enumerates devices and applies colors.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{error::Result, mappings::Rgb};

/// Network location of the lighting server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Device category as reported by the lighting server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceType {
    Motherboard,
    Dram,
    Gpu,
    Cooler,
    LedStrip,
    Keyboard,
    Mouse,
    MouseMat,
    Headset,
    HeadsetStand,
    Gamepad,
    Light,
    Speaker,
    Virtual,
    Storage,
    Case,
    Microphone,
    Accessory,
    Keypad,
    Unknown,
}

impl DeviceType {
    /// Maps the numeric type code used on the wire.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => DeviceType::Motherboard,
            1 => DeviceType::Dram,
            2 => DeviceType::Gpu,
            3 => DeviceType::Cooler,
            4 => DeviceType::LedStrip,
            5 => DeviceType::Keyboard,
            6 => DeviceType::Mouse,
            7 => DeviceType::MouseMat,
            8 => DeviceType::Headset,
            9 => DeviceType::HeadsetStand,
            10 => DeviceType::Gamepad,
            11 => DeviceType::Light,
            12 => DeviceType::Speaker,
            13 => DeviceType::Virtual,
            14 => DeviceType::Storage,
            15 => DeviceType::Case,
            16 => DeviceType::Microphone,
            17 => DeviceType::Accessory,
            18 => DeviceType::Keypad,
            _ => DeviceType::Unknown,
        }
    }
}

/// Summary of one device, used for logging and selection.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    /// Index of the device on the server.
    pub index: u32,
    pub name: String,
    pub device_type: DeviceType,
    /// Names of the modes the device supports.
    pub modes: Vec<String>,
    pub zone_count: usize,
    pub led_count: usize,
}

impl DeviceInfo {
    pub fn has_mode(&self, name: &str) -> bool {
        self.modes.iter().any(|m| m.eq_ignore_ascii_case(name))
    }
}

/// Which devices receive the temperature color.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DeviceSelector {
    /// Every device the server reports.
    #[default]
    All,
    /// Devices of one category.
    DeviceType { device_type: DeviceType },
    /// Devices whose name matches exactly.
    Name { name: String },
}

impl DeviceSelector {
    pub fn matches(&self, device: &DeviceInfo) -> bool {
        match self {
            DeviceSelector::All => true,
            DeviceSelector::DeviceType { device_type } => device.device_type == *device_type,
            DeviceSelector::Name { name } => device.name == *name,
        }
    }
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSelector::All => write!(f, "all devices"),
            DeviceSelector::DeviceType { device_type } => write!(f, "devices of type {device_type:?}"),
            DeviceSelector::Name { name } => write!(f, "device '{name}'"),
        }
    }
}

/// A device that was matched but could not show a static color.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedDevice {
    pub name: String,
    pub available_modes: Vec<String>,
}

/// Outcome of applying one color to the selected devices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyReport {
    /// Devices now showing the color.
    pub updated: Vec<String>,
    /// Devices without a static mode, left untouched.
    pub skipped: Vec<SkippedDevice>,
}

impl ApplyReport {
    /// Number of devices the selector matched.
    pub fn matched(&self) -> usize {
        self.updated.len() + self.skipped.len()
    }
}

/// Opens connections to the lighting server.
///
/// # Example
///
/// ```no_run
/// use thermal_rgbd::gateway::{DeviceGateway, DeviceSelector, Endpoint};
/// use thermal_rgbd::mappings::Rgb;
///
/// # async fn example(gateway: &dyn DeviceGateway) -> thermal_rgbd::error::Result<()> {
/// let mut handle = gateway.connect(&Endpoint::new("127.0.0.1", 6742)).await?;
/// for device in handle.list_devices().await? {
///     println!("{} ({:?})", device.name, device.device_type);
/// }
/// handle.set_static_color(&DeviceSelector::All, Rgb::new(0, 0, 255)).await?;
/// # Ok(())
/// # }
/// ```
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceGateway: Send + Sync {
    /// Connects to the server at `endpoint`.
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn DeviceHandle>>;
}

/// A live connection to the lighting server.
///
/// Any error returned by a handle means the connection is no longer usable.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceHandle: Send {
    /// Enumerates the devices currently known to the server.
    async fn list_devices(&mut self) -> Result<Vec<DeviceInfo>>;

    /// Switches every device matched by `selector` to a static mode showing
    /// `color`. Devices lacking a static mode are skipped and reported.
    async fn set_static_color(&mut self, selector: &DeviceSelector, color: Rgb)
    -> Result<ApplyReport>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn device(name: &str, device_type: DeviceType, modes: &[&str]) -> DeviceInfo {
        DeviceInfo {
            index: 0,
            name: name.to_string(),
            device_type,
            modes: modes.iter().map(|m| m.to_string()).collect(),
            zone_count: 1,
            led_count: 8,
        }
    }

    #[test]
    fn selector_all_matches_everything() {
        let ram = device("Trident Z", DeviceType::Dram, &["Static"]);
        assert!(DeviceSelector::All.matches(&ram));
    }

    #[test]
    fn selector_by_type_and_name() {
        let board = device("B550 AORUS", DeviceType::Motherboard, &["Static"]);
        let gpu = device("RTX 3080", DeviceType::Gpu, &["Direct"]);

        let by_type = DeviceSelector::DeviceType {
            device_type: DeviceType::Gpu,
        };
        assert!(!by_type.matches(&board));
        assert!(by_type.matches(&gpu));

        let by_name = DeviceSelector::Name {
            name: "B550 AORUS".to_string(),
        };
        assert!(by_name.matches(&board));
        assert!(!by_name.matches(&gpu));
    }

    #[test]
    fn mode_lookup_ignores_case() {
        let fan = device("Fan hub", DeviceType::Cooler, &["Off", "STATIC", "Breathing"]);
        assert!(fan.has_mode("Static"));
        assert!(!fan.has_mode("Rainbow"));
    }

    #[test]
    fn device_type_codes() {
        assert_eq!(DeviceType::from_code(0), DeviceType::Motherboard);
        assert_eq!(DeviceType::from_code(2), DeviceType::Gpu);
        assert_eq!(DeviceType::from_code(18), DeviceType::Keypad);
        assert_eq!(DeviceType::from_code(99), DeviceType::Unknown);
        assert_eq!(DeviceType::from_code(-1), DeviceType::Unknown);
    }

    #[test]
    fn selector_from_yaml() {
        let all: DeviceSelector = serde_yaml::from_str("kind: all").unwrap();
        assert_eq!(all, DeviceSelector::All);

        let strip: DeviceSelector =
            serde_yaml::from_str("kind: device-type\ndevice_type: led-strip").unwrap();
        assert_eq!(
            strip,
            DeviceSelector::DeviceType {
                device_type: DeviceType::LedStrip
            }
        );
    }

    #[test]
    fn report_counts_matched_devices() {
        let report = ApplyReport {
            updated: vec!["a".into(), "b".into()],
            skipped: vec![SkippedDevice {
                name: "c".into(),
                available_modes: vec!["Direct".into()],
            }],
        };
        assert_eq!(report.matched(), 3);
        assert_eq!(ApplyReport::default().matched(), 0);
    }
}
