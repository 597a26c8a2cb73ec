//! RT-130 event header (`EH`) and event trailer (`ET`) packets.
//!
//! Both share one layout: the common packet header, the event/stream BCD
//! fields, then fixed-width ASCII fields describing the stream. A trailer
//! repeats the header and fills in the last sample time.

use serde::{Deserialize, Serialize};

use crate::bcd::decode_bcd;
use crate::error::{Error, Flagged, Result};
use crate::lib::{String, ToString, Vec};
use crate::packet::{DataFlags, DataFormat, PacketTime, PACKET_LEN};

/// (offset, length) of the ASCII fields, in bytes from the packet start.
mod field {
    pub const TRIGGER_TIME_MESSAGE: (usize, usize) = (24, 33);
    pub const TIME_SOURCE: usize = 57;
    pub const TIME_QUALITY: usize = 58;
    pub const STATION_NAME: (usize, usize) = (59, 5);
    pub const STREAM_NAME: (usize, usize) = (64, 16);
    pub const SAMPLE_RATE: (usize, usize) = (88, 4);
    pub const TRIGGER_TYPE: (usize, usize) = (92, 4);
    pub const TRIGGER_TIME: usize = 96;
    pub const FIRST_SAMPLE_TIME: usize = 112;
    pub const DETRIGGER_TIME: usize = 128;
    pub const LAST_SAMPLE_TIME: usize = 144;
    pub const NOMINAL_BIT_WEIGHT: usize = 160;
    pub const TRUE_BIT_WEIGHT: usize = 288;
    pub const GAIN: (usize, usize) = (416, 16);
    pub const TOTAL_CHANNELS: (usize, usize) = (860, 2);
    pub const COMMENT: (usize, usize) = (862, 40);
}

const TIME_FIELD_LEN: usize = 16;
const BIT_WEIGHT_LEN: usize = 8;
const CHANNELS: usize = 16;

/// Decoded `EH` or `ET` packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EventHeader {
    pub event: u16,
    pub stream: u8,
    pub flags: DataFlags,
    pub format: DataFormat,
    pub trigger_time_message: String,
    /// `1` internal clock, `2` GPS, blank when unknown.
    pub time_source: char,
    /// `?` without phase lock, otherwise days since the last lock.
    pub time_quality: char,
    /// Station name, including the extended first character.
    pub station: String,
    pub stream_name: String,
    /// Samples per second, `None` when the field is blank or unreadable.
    pub sample_rate: Option<f64>,
    pub trigger_type: String,
    pub trigger_time: Option<PacketTime>,
    pub first_sample_time: Option<PacketTime>,
    pub detrigger_time: Option<PacketTime>,
    /// Filled in by the event trailer only.
    pub last_sample_time: Option<PacketTime>,
    /// Per-channel bit weights as recorded, e.g. `1.589uV`.
    pub nominal_bit_weights: Vec<String>,
    pub true_bit_weights: Vec<String>,
    /// Per-channel gain codes.
    pub gain_codes: String,
    pub total_channels: Option<u8>,
    pub comment: String,
}

impl EventHeader {
    /// Parses an `EH` or `ET` packet. The packet type itself is not checked.
    pub fn parse(buf: &[u8]) -> Result<Flagged<EventHeader>> {
        if buf.len() < PACKET_LEN {
            return Err(Error::short("RT-130 event header", PACKET_LEN, buf.len()));
        }
        let mut warnings = Vec::new();
        let event = decode_bcd(buf, 32, 4)?.drain_into(&mut warnings) as u16;
        let stream = decode_bcd(buf, 36, 2)?.drain_into(&mut warnings) as u8;

        let header = EventHeader {
            event,
            stream,
            flags: DataFlags::from_bits_retain(buf[22]),
            format: DataFormat::from(buf[23]),
            trigger_time_message: text(buf, field::TRIGGER_TIME_MESSAGE),
            time_source: buf[field::TIME_SOURCE] as char,
            time_quality: buf[field::TIME_QUALITY] as char,
            station: text(buf, field::STATION_NAME),
            stream_name: text(buf, field::STREAM_NAME),
            sample_rate: text(buf, field::SAMPLE_RATE).parse().ok(),
            trigger_type: text(buf, field::TRIGGER_TYPE),
            trigger_time: sample_time(buf, field::TRIGGER_TIME),
            first_sample_time: sample_time(buf, field::FIRST_SAMPLE_TIME),
            detrigger_time: sample_time(buf, field::DETRIGGER_TIME),
            last_sample_time: sample_time(buf, field::LAST_SAMPLE_TIME),
            nominal_bit_weights: bit_weights(buf, field::NOMINAL_BIT_WEIGHT),
            true_bit_weights: bit_weights(buf, field::TRUE_BIT_WEIGHT),
            gain_codes: text(buf, field::GAIN),
            total_channels: text(buf, field::TOTAL_CHANNELS).parse().ok(),
            comment: text(buf, field::COMMENT),
        };
        if header.sample_rate.is_none() {
            log::warn!(
                "Event {} stream {}: unreadable sample rate {:?}",
                event,
                stream,
                text(buf, field::SAMPLE_RATE)
            );
        }
        Ok(Flagged {
            value: header,
            warnings,
        })
    }

    /// Gain of `channel` as the recorder names it, e.g. `x32` or `24dB`.
    pub fn gain(&self, channel: usize) -> Option<&'static str> {
        let code = self.gain_codes.as_bytes().get(channel)?;
        Some(match code {
            b'1' => "x1",
            b'2' => "x8",
            b'3' => "x32",
            b'4' => "x128",
            b'5' => "x512",
            b'6' => "x2048",
            b'7' => "x8192",
            b'8' => "x100",
            b'A' => "12dB",
            b'B' => "24dB",
            b'C' => "36dB",
            b'D' => "48dB",
            b'E' => "60dB",
            b'F' => "x2",
            b'G' => "x4",
            b'H' => "x16",
            b'I' => "x64",
            b'J' => "x256",
            _ => return None,
        })
    }
}

/// Trimmed ASCII text of `len` bytes at `offset`.
fn text(buf: &[u8], (offset, len): (usize, usize)) -> String {
    let raw: String = buf[offset..offset + len]
        .iter()
        .map(|&b| if b == 0 { ' ' } else { b as char })
        .collect();
    raw.trim().to_string()
}

/// A `YYYYDDDHHMMSSTTT` field. Blank or non-numeric fields give `None`.
fn sample_time(buf: &[u8], offset: usize) -> Option<PacketTime> {
    let raw = core::str::from_utf8(&buf[offset..offset + TIME_FIELD_LEN]).ok()?;
    let num = |from: usize, to: usize| raw.get(from..to)?.parse::<u16>().ok();
    Some(PacketTime {
        year: num(0, 4)?,
        day_of_year: num(4, 7)?,
        hour: num(7, 9)? as u8,
        minute: num(9, 11)? as u8,
        second: num(11, 13)? as u8,
        millisecond: num(13, 16)?,
    })
}

fn bit_weights(buf: &[u8], offset: usize) -> Vec<String> {
    (0..CHANNELS)
        .map(|i| text(buf, (offset + i * BIT_WEIGHT_LEN, BIT_WEIGHT_LEN)))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::lib::vec;

    fn put(buf: &mut [u8], offset: usize, s: &str) {
        buf[offset..offset + s.len()].copy_from_slice(s.as_bytes());
    }

    fn eh() -> Vec<u8> {
        let mut buf = vec![b' '; PACKET_LEN];
        buf[..16].fill(0);
        buf[..2].copy_from_slice(b"EH");
        buf[16..19].copy_from_slice(&[0x00, 0x12, 0x03]);
        buf[19..24].fill(0);
        buf[23] = 0xC0;
        put(&mut buf, 57, "2?");
        put(&mut buf, 59, "BASE1");
        put(&mut buf, 64, "continuous");
        put(&mut buf, 88, " 250");
        put(&mut buf, 92, "CON");
        put(&mut buf, 112, "2019045120000125");
        put(&mut buf, 160, "1.589uV 1.589uV");
        put(&mut buf, 416, "3B");
        put(&mut buf, 860, " 3");
        buf
    }

    #[test]
    fn fields() {
        let h = EventHeader::parse(&eh()).unwrap();
        assert!(h.is_clean());
        let h = h.value;
        assert_eq!(h.event, 12);
        assert_eq!(h.stream, 3);
        assert_eq!(h.format, DataFormat::Steim1);
        assert_eq!(h.time_source, '2');
        assert_eq!(h.time_quality, '?');
        assert_eq!(h.station, "BASE1");
        assert_eq!(h.stream_name, "continuous");
        assert_eq!(h.sample_rate, Some(250.0));
        assert_eq!(h.trigger_type, "CON");
        assert_eq!(
            h.first_sample_time.unwrap().to_string(),
            "2019-02-14T12:00:00.125Z"
        );
        assert_eq!(h.last_sample_time, None);
        assert_eq!(h.nominal_bit_weights[..3], ["1.589uV", "1.589uV", ""]);
        assert_eq!(h.nominal_bit_weights.len(), 16);
        assert_eq!(h.gain(0), Some("x32"));
        assert_eq!(h.gain(1), Some("24dB"));
        assert_eq!(h.gain(2), None);
        assert_eq!(h.total_channels, Some(3));
    }

    #[test]
    fn blank_and_garbled_fields() {
        let mut buf = eh();
        put(&mut buf, 88, "    ");
        put(&mut buf, 112, "20190X5120000125");
        let h = EventHeader::parse(&buf).unwrap().value;
        assert_eq!(h.sample_rate, None);
        assert_eq!(h.first_sample_time, None);
    }

    #[test]
    fn short_packet() {
        assert_eq!(
            EventHeader::parse(&eh()[..900]).unwrap_err(),
            Error::short("RT-130 event header", PACKET_LEN, 900)
        );
    }
}
