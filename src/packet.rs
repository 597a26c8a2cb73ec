//! RT-130 packet framing.
//!
//! Every RT-130 packet is 1024 bytes. The first 16 bytes are common to all
//! packet types; data (`DT`) packets follow them with an 8-byte data header
//! and a payload whose layout is selected by the data format code.
//! Most numeric header fields are packed BCD; offsets into BCD fields below
//! are given in nibbles.

use bitflags::bitflags;
#[cfg(feature = "chrono")]
use chrono::{Datelike, Timelike};
use serde::{Deserialize, Serialize};

use crate::bcd::decode_bcd;
use crate::error::{Error, Flagged, Result};
use crate::lib::{fmt, String, Vec};

pub const PACKET_LEN: usize = 1024;
pub const PACKET_HEADER_LEN: usize = 16;
pub const DATA_HEADER_LEN: usize = 8;

/// Offset of uncompressed integer payloads.
pub(crate) const RAW_PAYLOAD_OFFSET: usize = PACKET_HEADER_LEN + DATA_HEADER_LEN;
/// Offset of the 15 Steim frames of a compressed payload.
pub(crate) const STEIM_PAYLOAD_OFFSET: usize = 64;
pub(crate) const STEIM_FRAMES: usize = 15;

/// unit id:
///
/// |  type  | length | offset |
/// |--------|--------|--------|
/// | UINT16 |   2    |    4   |
///
macro_rules! unit_id {
    ($hd:expr) => {
        u16::from_be_bytes([$hd[4], $hd[5]])
    };
}

/// data flags:
///
/// |  type  | length | offset |
/// |--------|--------|--------|
/// | UINT8  |   1    |   22   |
///
macro_rules! data_flags {
    ($hd:expr) => {
        $hd[22]
    };
}

/// data format:
///
/// |  type  | length | offset |
/// |--------|--------|--------|
/// | UINT8  |   1    |   23   |
///
macro_rules! data_format {
    ($hd:expr) => {
        $hd[23]
    };
}

/// A BCD field at `nibble` (in nibbles from the start of the packet), `count`
/// digits long. Warnings land in `$warnings`.
macro_rules! bcd {
    ($hd:expr, $nibble:expr, $count:expr, $warnings:expr) => {
        decode_bcd($hd, $nibble, $count)?.drain_into($warnings)
    };
}

/// Header common to every RT-130 packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PacketHeader {
    /// Two ASCII characters: `DT`, `EH`, `ET`, `SH`, `SC`, `AD`, `CD`, ...
    pub packet_type: String,
    pub experiment: u8,
    pub unit_id: u16,
    pub time: PacketTime,
    pub byte_count: u16,
    pub sequence: u16,
}

impl PacketHeader {
    /// Parses the first [`PACKET_HEADER_LEN`] bytes of `buf`.
    ///
    /// | field       | encoding | offset (bytes) |
    /// |-------------|----------|----------------|
    /// | packet type | ASCII 2  |       0        |
    /// | experiment  | BCD 2    |       2        |
    /// | year        | BCD 2    |       3        |
    /// | unit id     | UINT16   |       4        |
    /// | time        | BCD 12   |       6        |
    /// | byte count  | BCD 4    |      12        |
    /// | sequence    | BCD 4    |      14        |
    pub fn parse(buf: &[u8]) -> Result<Flagged<PacketHeader>> {
        if buf.len() < PACKET_HEADER_LEN {
            return Err(Error::short("RT-130 packet header", PACKET_HEADER_LEN, buf.len()));
        }
        let mut warnings = Vec::new();
        let w = &mut warnings;

        let packet_type = buf[..2].iter().map(|&b| b as char).collect();
        let experiment = bcd!(buf, 4, 2, w) as u8;
        let yy = bcd!(buf, 6, 2, w) as u16;
        let time = PacketTime {
            year: if yy > 80 { 1900 + yy } else { 2000 + yy },
            day_of_year: bcd!(buf, 12, 3, w) as u16,
            hour: bcd!(buf, 15, 2, w) as u8,
            minute: bcd!(buf, 17, 2, w) as u8,
            second: bcd!(buf, 19, 2, w) as u8,
            millisecond: bcd!(buf, 21, 3, w) as u16,
        };
        let header = PacketHeader {
            packet_type,
            experiment,
            unit_id: unit_id!(buf),
            time,
            byte_count: bcd!(buf, 24, 4, w) as u16,
            sequence: bcd!(buf, 28, 4, w) as u16,
        };
        Ok(Flagged {
            value: header,
            warnings,
        })
    }

    pub fn is_data(&self) -> bool {
        self.packet_type == "DT"
    }

    /// Event header (`EH`) or event trailer (`ET`).
    pub fn is_event(&self) -> bool {
        self.packet_type == "EH" || self.packet_type == "ET"
    }

    /// Unit id the way the recorder prints it, e.g. `9F2A`.
    pub fn unit_hex(&self) -> String {
        crate::lib::format!("{:04X}", self.unit_id)
    }
}

/// Header of a `DT` packet, bytes 16..24.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DataHeader {
    pub event: u16,
    pub stream: u8,
    pub channel: u8,
    pub samples: u16,
    pub flags: DataFlags,
    pub format: DataFormat,
}

impl DataHeader {
    /// Parses the data header of a whole packet buffer.
    ///
    /// | field   | encoding | offset (bytes) |
    /// |---------|----------|----------------|
    /// | event   | BCD 4    |      16        |
    /// | stream  | BCD 2    |      18        |
    /// | channel | BCD 2    |      19        |
    /// | samples | BCD 4    |      20        |
    /// | flags   | UINT8    |      22        |
    /// | format  | UINT8    |      23        |
    pub fn parse(buf: &[u8]) -> Result<Flagged<DataHeader>> {
        if buf.len() < RAW_PAYLOAD_OFFSET {
            return Err(Error::short("RT-130 data header", RAW_PAYLOAD_OFFSET, buf.len()));
        }
        let mut warnings = Vec::new();
        let w = &mut warnings;
        let header = DataHeader {
            event: bcd!(buf, 32, 4, w) as u16,
            stream: bcd!(buf, 36, 2, w) as u8,
            channel: bcd!(buf, 38, 2, w) as u8,
            samples: bcd!(buf, 40, 4, w) as u16,
            flags: DataFlags::from_bits_retain(data_flags!(buf)),
            format: DataFormat::from(data_format!(buf)),
        };
        Ok(Flagged {
            value: header,
            warnings,
        })
    }
}

bitflags! {
    /// UINT8, most significant bit first:
    /// - 7: calibration signal present
    /// - 6: overscaled
    /// - 5: stacked data
    /// - 2: second EH/ET packet
    /// - 1: last data packet of the event
    /// - 0: first data packet of the event
    #[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DataFlags: u8 {
        const Calibration = 0b1000_0000;
        const Overscaled = 0b0100_0000;
        const StackedData = 0b0010_0000;
        const SecondEhEt = 0b0000_0100;
        const LastDataPacket = 0b0000_0010;
        const FirstDataPacket = 0b0000_0001;
    }
}

/// Payload encoding selected by byte 23 of a `DT` packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataFormat {
    Int16,
    Int32,
    Int32Overscaled,
    Steim1,
    Steim1Overscaled,
    Steim2,
    Steim2Overscaled,
    Unknown(u8),
}

impl From<u8> for DataFormat {
    fn from(value: u8) -> Self {
        match value {
            0x16 => DataFormat::Int16,
            0x32 => DataFormat::Int32,
            0x33 => DataFormat::Int32Overscaled,
            0xC0 => DataFormat::Steim1,
            0xC1 => DataFormat::Steim1Overscaled,
            0xC2 => DataFormat::Steim2,
            0xC3 => DataFormat::Steim2Overscaled,
            other => DataFormat::Unknown(other),
        }
    }
}

impl DataFormat {
    pub fn code(self) -> u8 {
        match self {
            DataFormat::Int16 => 0x16,
            DataFormat::Int32 => 0x32,
            DataFormat::Int32Overscaled => 0x33,
            DataFormat::Steim1 => 0xC0,
            DataFormat::Steim1Overscaled => 0xC1,
            DataFormat::Steim2 => 0xC2,
            DataFormat::Steim2Overscaled => 0xC3,
            DataFormat::Unknown(c) => c,
        }
    }

    /// Byte offset of the payload within a packet, `None` for formats this
    /// crate cannot decode.
    pub fn payload_offset(self) -> Option<usize> {
        match self {
            DataFormat::Int16 | DataFormat::Int32 => Some(RAW_PAYLOAD_OFFSET),
            DataFormat::Steim1 | DataFormat::Steim2 => Some(STEIM_PAYLOAD_OFFSET),
            _ => None,
        }
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataFormat::Int16 => write!(f, "16-bit"),
            DataFormat::Int32 => write!(f, "32-bit"),
            DataFormat::Int32Overscaled => write!(f, "32-bit overscaled"),
            DataFormat::Steim1 => write!(f, "Steim1"),
            DataFormat::Steim1Overscaled => write!(f, "Steim1 overscaled"),
            DataFormat::Steim2 => write!(f, "Steim2"),
            DataFormat::Steim2Overscaled => write!(f, "Steim2 overscaled"),
            DataFormat::Unknown(c) => write!(f, "unknown ({:#04x})", c),
        }
    }
}

/// Time of the first sample of a packet, to the millisecond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PacketTime {
    pub year: u16,
    pub day_of_year: u16,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub millisecond: u16,
}

const MONTH_DAYS: [u16; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
const MONTH_DAYS_LEAP: [u16; 12] = [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
const MILLIS_PER_DAY: i64 = 86_400_000;

macro_rules! is_leap_year {
    ($year:expr) => {
        ($year % 4 == 0 && $year % 100 != 0) || $year % 400 == 0
    };
}

fn year_days(year: i64) -> i64 {
    if is_leap_year!(year) {
        366
    } else {
        365
    }
}

impl PacketTime {
    /// Milliseconds since 00:00:00.000 of the day.
    fn millis_of_day(&self) -> i64 {
        ((self.hour as i64 * 60 + self.minute as i64) * 60 + self.second as i64) * 1000
            + self.millisecond as i64
    }

    /// Shifts the time by `millis` (either sign), carrying across days and
    /// years.
    ///
    /// ```
    /// let t = reftekio::PacketTime {
    ///     year: 2023, day_of_year: 365, hour: 23, minute: 59, second: 59, millisecond: 900,
    /// };
    /// assert_eq!(t.offset_millis(150).to_string(), "2024-01-01T00:00:00.050Z");
    /// ```
    pub fn offset_millis(&self, millis: i64) -> PacketTime {
        let total = self.millis_of_day() + millis;
        let mut day = self.day_of_year as i64 - 1 + total.div_euclid(MILLIS_PER_DAY);
        let mut ms = total.rem_euclid(MILLIS_PER_DAY);
        let mut year = self.year as i64;
        while day < 0 {
            year -= 1;
            day += year_days(year);
        }
        while day >= year_days(year) {
            day -= year_days(year);
            year += 1;
        }
        let millisecond = (ms % 1000) as u16;
        ms /= 1000;
        let second = (ms % 60) as u8;
        ms /= 60;
        PacketTime {
            year: year as u16,
            day_of_year: day as u16 + 1,
            hour: (ms / 60) as u8,
            minute: (ms % 60) as u8,
            second,
            millisecond,
        }
    }

    /// Calendar month and day of month.
    pub fn month_day(&self) -> (u8, u16) {
        let table = if is_leap_year!(self.year) {
            &MONTH_DAYS_LEAP
        } else {
            &MONTH_DAYS
        };
        let mut day = self.day_of_year;
        for (i, &len) in table.iter().enumerate() {
            if day <= len {
                return (i as u8 + 1, day);
            }
            day -= len;
        }
        (0, day)
    }

    #[cfg(feature = "chrono")]
    pub fn to_datetime(&self) -> Option<chrono::NaiveDateTime> {
        chrono::NaiveDate::from_yo_opt(self.year as i32, self.day_of_year as u32)?.and_hms_milli_opt(
            self.hour as u32,
            self.minute as u32,
            self.second as u32,
            self.millisecond as u32,
        )
    }
}

impl fmt::Display for PacketTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (month, day) = self.month_day();
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
            self.year, month, day, self.hour, self.minute, self.second, self.millisecond
        )
    }
}

#[cfg(feature = "chrono")]
impl From<chrono::NaiveDateTime> for PacketTime {
    fn from(t: chrono::NaiveDateTime) -> Self {
        PacketTime {
            year: t.year() as u16,
            day_of_year: t.ordinal() as u16,
            hour: t.hour() as u8,
            minute: t.minute() as u8,
            second: t.second() as u8,
            millisecond: (t.nanosecond() / 1_000_000) as u16,
        }
    }
}
