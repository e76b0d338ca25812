//! Temperature to color mappings for the thermal_rgbd daemon.
//!
//! Maps a CPU temperature onto one of a fixed set of color bands. The
//! mapping is a pure function of the temperature and the configured bands.

use serde::{Deserialize, Serialize};

/// An RGB color as written to the lighting devices.
///
/// Serialized as a `[red, green, blue]` triple in the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[u8; 3]", into = "[u8; 3]")]
pub struct Rgb {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Rgb {
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }
}

impl From<[u8; 3]> for Rgb {
    fn from([red, green, blue]: [u8; 3]) -> Self {
        Self { red, green, blue }
    }
}

impl From<Rgb> for [u8; 3] {
    fn from(c: Rgb) -> Self {
        [c.red, c.green, c.blue]
    }
}

impl std::fmt::Display for Rgb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "R={}, G={}, B={}", self.red, self.green, self.blue)
    }
}

/// One band of the color scale: temperatures up to and including `up_to`
/// (and above the previous band) are shown as `rgb`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorBand {
    /// Inclusive upper bound in Celsius.
    pub up_to: f32,

    /// Color shown for this band.
    pub rgb: Rgb,
}

/// Ordered color scale from coldest to hottest.
///
/// # Example
///
/// ```
/// use thermal_rgbd::mappings::{ColorBands, Rgb};
///
/// let bands = ColorBands::default();
/// assert_eq!(bands.color_for_temp(30.0), Rgb::new(0, 0, 255));
/// assert_eq!(bands.color_for_temp(65.1), Rgb::new(255, 0, 0));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorBands {
    /// Bands in strictly ascending `up_to` order.
    pub bands: Vec<ColorBand>,

    /// Color for anything hotter than the last band.
    pub above: Rgb,
}

impl Default for ColorBands {
    fn default() -> Self {
        let band = |up_to, r, g, b| ColorBand {
            up_to,
            rgb: Rgb::new(r, g, b),
        };
        Self {
            bands: vec![
                band(30.0, 0, 0, 255),    // blue
                band(40.0, 63, 0, 192),   // purple-blue
                band(45.0, 0, 255, 0),    // green
                band(50.0, 127, 255, 0),  // green-yellow
                band(60.0, 255, 255, 0),  // yellow
                band(65.0, 255, 127, 0),  // orange-red
            ],
            above: Rgb::new(255, 0, 0),
        }
    }
}

impl ColorBands {
    /// Maps a temperature to the color of the first band that contains it.
    pub fn color_for_temp(&self, temp: f32) -> Rgb {
        self.bands
            .iter()
            .find(|band| temp <= band.up_to)
            .map(|band| band.rgb)
            .unwrap_or(self.above)
    }

    /// Checks that bounds are finite and strictly ascending.
    pub fn validate(&self) -> anyhow::Result<()> {
        for band in &self.bands {
            if !band.up_to.is_finite() {
                anyhow::bail!("Color band bound {} is not a finite temperature", band.up_to);
            }
        }
        if let Some(pair) = self.bands.windows(2).find(|w| w[0].up_to >= w[1].up_to) {
            anyhow::bail!(
                "Color bands must be strictly ascending, found {} before {}",
                pair[0].up_to,
                pair[1].up_to
            );
        }
        Ok(())
    }
}
