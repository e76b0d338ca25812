//! OpenRGB SDK wire format, protocol version 0.
//!
//! Every packet starts with a 16 byte header: the `ORGB` magic followed by
//! the device index, the packet id and the payload length, all little-endian
//! `u32`. Strings are a `u16` length (including the trailing NUL) followed by
//! the bytes and the NUL. Colors are four bytes: red, green, blue, padding.

use crate::{
    error::{Result, RgbError},
    mappings::Rgb,
};

pub const MAGIC: [u8; 4] = *b"ORGB";
pub const HEADER_LEN: usize = 16;

/// Largest payload accepted from the server.
pub const MAX_PAYLOAD: u32 = 16 * 1024 * 1024;

/// `color_mode` value of modes that carry their own color slots.
pub const COLOR_MODE_SPECIFIC: u32 = 2;

/// Upper bound on the controller count a server may report.
pub const MAX_CONTROLLERS: u32 = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketId {
    RequestControllerCount,
    RequestControllerData,
    SetClientName,
    DeviceListUpdated,
    UpdateLeds,
    UpdateMode,
}

impl PacketId {
    pub const fn code(self) -> u32 {
        match self {
            PacketId::RequestControllerCount => 0,
            PacketId::RequestControllerData => 1,
            PacketId::SetClientName => 50,
            PacketId::DeviceListUpdated => 100,
            PacketId::UpdateLeds => 1050,
            PacketId::UpdateMode => 1101,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub device: u32,
    pub id: u32,
    pub len: u32,
}

impl Header {
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(&MAGIC);
        buf[4..8].copy_from_slice(&self.device.to_le_bytes());
        buf[8..12].copy_from_slice(&self.id.to_le_bytes());
        buf[12..16].copy_from_slice(&self.len.to_le_bytes());
        buf
    }

    pub fn parse(buf: &[u8; HEADER_LEN]) -> Result<Self> {
        if buf[0..4] != MAGIC {
            return Err(RgbError::protocol(format!(
                "bad packet magic {:02x?}",
                &buf[0..4]
            )));
        }
        let word = |at: usize| u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        let header = Header {
            device: word(4),
            id: word(8),
            len: word(12),
        };
        if header.len > MAX_PAYLOAD {
            return Err(RgbError::protocol(format!(
                "payload of {} bytes exceeds limit",
                header.len
            )));
        }
        Ok(header)
    }

    pub fn is(&self, id: PacketId) -> bool {
        self.id == id.code()
    }
}

/// One lighting mode of a device.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModeData {
    pub name: String,
    pub value: i32,
    pub flags: u32,
    pub speed_min: u32,
    pub speed_max: u32,
    pub colors_min: u32,
    pub colors_max: u32,
    pub speed: u32,
    pub direction: u32,
    pub color_mode: u32,
    pub colors: Vec<Rgb>,
}

impl ModeData {
    pub fn is_static(&self) -> bool {
        self.name.eq_ignore_ascii_case("static")
    }

    /// Fills the mode's own color slots, if it has any, with `color`.
    pub fn with_color(mut self, color: Rgb) -> Self {
        if self.color_mode == COLOR_MODE_SPECIFIC {
            // Color counts travel as u16 on the wire.
            let slots = self
                .colors
                .len()
                .max(self.colors_min as usize)
                .min(usize::from(u16::MAX));
            self.colors = vec![color; slots];
        }
        self
    }

    fn write(&self, w: &mut Writer) {
        w.string(&self.name);
        w.i32(self.value);
        w.u32(self.flags);
        w.u32(self.speed_min);
        w.u32(self.speed_max);
        w.u32(self.colors_min);
        w.u32(self.colors_max);
        w.u32(self.speed);
        w.u32(self.direction);
        w.u32(self.color_mode);
        w.colors(&self.colors);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            name: r.string()?,
            value: r.i32()?,
            flags: r.u32()?,
            speed_min: r.u32()?,
            speed_max: r.u32()?,
            colors_min: r.u32()?,
            colors_max: r.u32()?,
            speed: r.u32()?,
            direction: r.u32()?,
            color_mode: r.u32()?,
            colors: r.colors()?,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ZoneData {
    pub name: String,
    pub zone_type: i32,
    pub leds_min: u32,
    pub leds_max: u32,
    pub leds_count: u32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LedData {
    pub name: String,
    pub value: u32,
}

/// Full description of a device as returned by `RequestControllerData`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ControllerData {
    pub device_type: i32,
    pub name: String,
    pub description: String,
    pub version: String,
    pub serial: String,
    pub location: String,
    pub active_mode: i32,
    pub modes: Vec<ModeData>,
    pub zones: Vec<ZoneData>,
    pub leds: Vec<LedData>,
    pub colors: Vec<Rgb>,
}

impl ControllerData {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut r = Reader::new(payload);
        let _data_size = r.u32()?;
        let device_type = r.i32()?;
        let name = r.string()?;
        let description = r.string()?;
        let version = r.string()?;
        let serial = r.string()?;
        let location = r.string()?;

        let num_modes = r.u16()?;
        let active_mode = r.i32()?;
        let modes = (0..num_modes)
            .map(|_| ModeData::read(&mut r))
            .collect::<Result<Vec<_>>>()?;

        let num_zones = r.u16()?;
        let mut zones = Vec::with_capacity(usize::from(num_zones));
        for _ in 0..num_zones {
            let zone = ZoneData {
                name: r.string()?,
                zone_type: r.i32()?,
                leds_min: r.u32()?,
                leds_max: r.u32()?,
                leds_count: r.u32()?,
            };
            // Matrix maps are not needed to paint a single color.
            let matrix_len = r.u16()?;
            r.take(usize::from(matrix_len))?;
            zones.push(zone);
        }

        let num_leds = r.u16()?;
        let leds = (0..num_leds)
            .map(|_| {
                Ok(LedData {
                    name: r.string()?,
                    value: r.u32()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let colors = r.colors()?;

        Ok(Self {
            device_type,
            name,
            description,
            version,
            serial,
            location,
            active_mode,
            modes,
            zones,
            leds,
            colors,
        })
    }

    /// Index and data of the device's static mode, if it has one.
    pub fn static_mode(&self) -> Option<(i32, &ModeData)> {
        self.modes
            .iter()
            .enumerate()
            .find(|(_, mode)| mode.is_static())
            .and_then(|(idx, mode)| i32::try_from(idx).ok().map(|idx| (idx, mode)))
    }

    pub fn mode_names(&self) -> Vec<String> {
        self.modes.iter().map(|m| m.name.clone()).collect()
    }

    #[cfg(test)]
    pub(crate) fn to_payload(&self) -> Vec<u8> {
        let mut w = Writer::sized();
        w.i32(self.device_type);
        w.string(&self.name);
        w.string(&self.description);
        w.string(&self.version);
        w.string(&self.serial);
        w.string(&self.location);
        w.u16(self.modes.len() as u16);
        w.i32(self.active_mode);
        for mode in &self.modes {
            mode.write(&mut w);
        }
        w.u16(self.zones.len() as u16);
        for zone in &self.zones {
            w.string(&zone.name);
            w.i32(zone.zone_type);
            w.u32(zone.leds_min);
            w.u32(zone.leds_max);
            w.u32(zone.leds_count);
            w.u16(0);
        }
        w.u16(self.leds.len() as u16);
        for led in &self.leds {
            w.string(&led.name);
            w.u32(led.value);
        }
        w.colors(&self.colors);
        w.finish_sized()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    ControllerCount,
    ControllerData {
        device: u32,
    },
    SetClientName {
        name: String,
    },
    UpdateMode {
        device: u32,
        mode_index: i32,
        mode: ModeData,
    },
    UpdateLeds {
        device: u32,
        colors: Vec<Rgb>,
    },
}

impl Command {
    pub fn packet_id(&self) -> PacketId {
        match self {
            Command::ControllerCount => PacketId::RequestControllerCount,
            Command::ControllerData { .. } => PacketId::RequestControllerData,
            Command::SetClientName { .. } => PacketId::SetClientName,
            Command::UpdateMode { .. } => PacketId::UpdateMode,
            Command::UpdateLeds { .. } => PacketId::UpdateLeds,
        }
    }

    fn device(&self) -> u32 {
        match *self {
            Command::ControllerCount | Command::SetClientName { .. } => 0,
            Command::ControllerData { device }
            | Command::UpdateMode { device, .. }
            | Command::UpdateLeds { device, .. } => device,
        }
    }

    /// Whether the server answers this command with a packet of the same id.
    pub fn expects_reply(&self) -> bool {
        matches!(self, Command::ControllerCount | Command::ControllerData { .. })
    }

    fn payload(&self) -> Vec<u8> {
        match self {
            Command::ControllerCount | Command::ControllerData { .. } => Vec::new(),
            Command::SetClientName { name } => {
                let mut buf = Vec::with_capacity(name.len() + 1);
                buf.extend_from_slice(name.as_bytes());
                buf.push(0);
                buf
            }
            Command::UpdateMode {
                mode_index, mode, ..
            } => {
                let mut w = Writer::sized();
                w.i32(*mode_index);
                mode.write(&mut w);
                w.finish_sized()
            }
            Command::UpdateLeds { colors, .. } => {
                let mut w = Writer::sized();
                w.colors(colors);
                w.finish_sized()
            }
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let payload = self.payload();
        let header = Header {
            device: self.device(),
            id: self.packet_id().code(),
            len: payload.len() as u32,
        };
        let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
        buf.extend_from_slice(&header.to_bytes());
        buf.extend_from_slice(&payload);
        buf
    }
}

#[derive(Debug, PartialEq)]
pub enum Response {
    ControllerCount(u32),
    ControllerData(Box<ControllerData>),
}

impl Response {
    pub fn parse(cmd: &Command, payload: &[u8]) -> Result<Self> {
        match cmd {
            Command::ControllerCount => Ok(Response::ControllerCount(Reader::new(payload).u32()?)),
            Command::ControllerData { .. } => Ok(Response::ControllerData(Box::new(
                ControllerData::parse(payload)?,
            ))),
            other => Err(RgbError::protocol(format!(
                "no reply expected for {:?}",
                other.packet_id()
            ))),
        }
    }
}

struct Writer(Vec<u8>);

impl Writer {
    /// Starts a payload whose first field is its own total size.
    fn sized() -> Self {
        Writer(vec![0; 4])
    }

    fn finish_sized(mut self) -> Vec<u8> {
        let size = self.0.len() as u32;
        self.0[0..4].copy_from_slice(&size.to_le_bytes());
        self.0
    }

    fn u16(&mut self, v: u16) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }

    fn i32(&mut self, v: i32) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }

    fn string(&mut self, s: &str) {
        self.u16((s.len() + 1) as u16);
        self.0.extend_from_slice(s.as_bytes());
        self.0.push(0);
    }

    fn colors(&mut self, colors: &[Rgb]) {
        self.u16(colors.len() as u16);
        for c in colors {
            self.0.extend_from_slice(&[c.red, c.green, c.blue, 0]);
        }
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| {
                RgbError::protocol(format!(
                    "truncated payload: wanted {n} bytes at offset {}, have {}",
                    self.pos,
                    self.buf.len()
                ))
            })?;
        let buf = self.buf;
        let bytes = &buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u16(&mut self) -> Result<u16> {
        self.array().map(u16::from_le_bytes)
    }

    fn u32(&mut self) -> Result<u32> {
        self.array().map(u32::from_le_bytes)
    }

    fn i32(&mut self) -> Result<i32> {
        self.array().map(i32::from_le_bytes)
    }

    fn string(&mut self) -> Result<String> {
        let len = usize::from(self.u16()?);
        let raw = self.take(len)?;
        let text = raw.strip_suffix(&[0]).unwrap_or(raw);
        Ok(String::from_utf8_lossy(text).into_owned())
    }

    fn colors(&mut self) -> Result<Vec<Rgb>> {
        let count = self.u16()?;
        (0..count)
            .map(|_| {
                let [red, green, blue, _] = self.array::<4>()?;
                Ok(Rgb::new(red, green, blue))
            })
            .collect()
    }
}
