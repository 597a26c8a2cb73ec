//! RT-125A ("Texan") pages.
//!
//! A Texan dump is a run of 528-byte pages. Each page starts with a 6-byte
//! header; data pages then carry a gain/event/count preamble, an optional
//! extended header with the trace start time, and packed 24-bit samples.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::lib::Vec;
use crate::packet::PacketTime;
use crate::raw::decode_int24;

pub const PAGE_LEN: usize = 528;
const PAGE_HEADER_LEN: usize = 6;
const DATA_PREAMBLE_LEN: usize = 4;
const EXTENDED_HEADER_LEN: usize = 9;

const FULL_SCALE: [u32; 2] = [0x50_0000, 0x60_0000];
const GAINS: [u32; 10] = [32, 1, 2, 4, 8, 16, 32, 64, 128, 256];

/// | field    | type   | offset |
/// |----------|--------|--------|
/// | type     | UINT8  |   0    |
/// | unit     | UINT16 |   1    |
/// | sequence | UINT16 |   3    |
/// | flags    | UINT8  |   5    |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PageHeader {
    pub page_type: u8,
    /// Serial number of the recorder (stored value plus 10000).
    pub unit_id: u32,
    pub sequence: u16,
    pub flags: PageFlags,
}

impl PageHeader {
    pub fn parse(buf: &[u8]) -> Result<PageHeader> {
        if buf.len() < PAGE_HEADER_LEN {
            return Err(Error::short("RT-125A page header", PAGE_HEADER_LEN, buf.len()));
        }
        Ok(PageHeader {
            page_type: buf[0],
            unit_id: u16::from_be_bytes([buf[1], buf[2]]) as u32 + 10000,
            sequence: u16::from_be_bytes([buf[3], buf[4]]),
            flags: PageFlags::from_bits_retain(buf[5]),
        })
    }

    pub fn is_erased(&self) -> bool {
        self.page_type == 0x00 || self.page_type == 0xFF
    }
}

bitflags! {
    #[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFlags: u8 {
        const First = 0b001;
        const Last = 0b010;
        const Extended = 0b100;
    }
}

/// Trace start carried by the first page of an event.
///
/// |  type  | length | field                      |
/// |--------|--------|----------------------------|
/// | UINT8  |   1    | year - 1984                |
/// | UINT8  |   1    | day of year, hundreds      |
/// | UINT8  |   1    | day of year, rest minus 1  |
/// | UINT8  |   3    | hour, minute, second       |
/// | UINT16 |   2    | sample rate                |
/// | pad    |   1    |                            |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExtendedHeader {
    pub start: PacketTime,
    pub sample_rate: u16,
}

impl ExtendedHeader {
    fn parse(b: &[u8]) -> ExtendedHeader {
        ExtendedHeader {
            start: PacketTime {
                year: 1984 + b[0] as u16,
                day_of_year: b[1] as u16 * 100 + b[2] as u16 + 1,
                hour: b[3],
                minute: b[4],
                second: b[5],
                millisecond: 0,
            },
            sample_rate: u16::from_be_bytes([b[6], b[7]]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DataPage {
    /// High nibble: full-scale selector, low nibble: gain index.
    pub gain_code: u8,
    pub event: u16,
    pub extended: Option<ExtendedHeader>,
    pub samples: Vec<i32>,
}

fn full_scale(gain_code: u8) -> Option<u32> {
    FULL_SCALE.get((gain_code >> 4) as usize).copied()
}

fn gain(gain_code: u8) -> Option<u32> {
    GAINS.get((gain_code & 0x0F) as usize).copied()
}

fn bit_weight(gain_code: u8) -> Option<f64> {
    Some(10.0 / gain(gain_code)? as f64 / full_scale(gain_code)? as f64)
}

impl DataPage {
    /// Full-scale count of the recorder, `None` for an unknown selector.
    pub fn full_scale(&self) -> Option<u32> {
        full_scale(self.gain_code)
    }

    pub fn gain(&self) -> Option<u32> {
        gain(self.gain_code)
    }

    /// Volts per count.
    pub fn bit_weight(&self) -> Option<f64> {
        bit_weight(self.gain_code)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PageBody {
    Data(DataPage),
    /// State-of-health page, raw body.
    Soh(Vec<u8>),
    /// Event table page, raw body.
    Table(Vec<u8>),
    /// Erased or never-written flash page.
    Erased,
    Other(u8),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page125 {
    pub header: PageHeader,
    pub body: PageBody,
}

impl Page125 {
    /// Parses one page. The buffer may be longer than [`PAGE_LEN`]; only the
    /// first page is read.
    pub fn parse(buf: &[u8]) -> Result<Page125> {
        if buf.len() < PAGE_LEN {
            return Err(Error::short("RT-125A page", PAGE_LEN, buf.len()));
        }
        let header = PageHeader::parse(buf)?;
        let body = &buf[PAGE_HEADER_LEN..PAGE_LEN];

        let body = if header.is_erased() {
            PageBody::Erased
        } else {
            match header.page_type {
                1 => PageBody::Soh(body[1..].to_vec()),
                3 => PageBody::Data(Self::data(&header, body)?),
                5 => PageBody::Table(body[1..].to_vec()),
                other => {
                    log::warn!("Unrecognized page type: {}", other);
                    PageBody::Other(other)
                }
            }
        };
        Ok(Page125 { header, body })
    }

    fn data(header: &PageHeader, body: &[u8]) -> Result<DataPage> {
        let gain_code = body[0];
        let event = u16::from_be_bytes([body[1], body[2]]);
        let n = body[3] as usize;
        let mut rest = &body[DATA_PREAMBLE_LEN..];

        let extended = if header
            .flags
            .intersects(PageFlags::First | PageFlags::Extended)
        {
            let ext = ExtendedHeader::parse(&rest[..EXTENDED_HEADER_LEN]);
            rest = &rest[EXTENDED_HEADER_LEN..];
            Some(ext)
        } else {
            None
        };
        log::trace!(
            "RT-125A page {}: event {} with {} samples",
            header.sequence,
            event,
            n
        );

        Ok(DataPage {
            gain_code,
            event,
            extended,
            samples: decode_int24(rest, n)?,
        })
    }
}

/// Splits a Texan dump into pages. A trailing partial page is reported as
/// [`Error::MalformedInput`].
pub fn parse_pages(buf: &[u8]) -> Result<Vec<Page125>> {
    let mut pages = Vec::new();
    let mut chunks = buf.chunks_exact(PAGE_LEN);
    for chunk in &mut chunks {
        pages.push(Page125::parse(chunk)?);
    }
    let tail = chunks.remainder().len();
    if tail != 0 {
        return Err(Error::short("RT-125A page", PAGE_LEN, tail));
    }
    Ok(pages)
}

/// The data pages of one recorded event joined into a single trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Event125 {
    pub unit_id: u32,
    pub event: u16,
    /// Gain code of the page that carried the extended header.
    pub gain_code: u8,
    pub start: Option<PacketTime>,
    pub sample_rate: Option<u16>,
    pub samples: Vec<i32>,
    /// `false` when the pages ran out before one flagged [`PageFlags::Last`].
    pub complete: bool,
}

impl Event125 {
    pub fn full_scale(&self) -> Option<u32> {
        full_scale(self.gain_code)
    }

    pub fn gain(&self) -> Option<u32> {
        gain(self.gain_code)
    }

    /// Volts per count.
    pub fn bit_weight(&self) -> Option<f64> {
        bit_weight(self.gain_code)
    }
}

/// Joins consecutive data pages into events.
///
/// An event runs until a data page flagged [`PageFlags::Last`]. A page with a
/// different unit or event number closes the open event as incomplete.
/// Start time, sample rate and gain come from the first extended header.
/// Pages other than data pages are skipped.
pub fn assemble_events(pages: &[Page125]) -> Vec<Event125> {
    let mut events = Vec::new();
    let mut open: Option<Event125> = None;

    for page in pages {
        let PageBody::Data(data) = &page.body else {
            continue;
        };
        let unit_id = page.header.unit_id;
        if open
            .as_ref()
            .is_some_and(|e| e.unit_id != unit_id || e.event != data.event)
        {
            if let Some(e) = open.take() {
                log::warn!(
                    "RT-125A unit {} event {} ends without its last page",
                    e.unit_id,
                    e.event
                );
                events.push(e);
            }
        }

        let event = open.get_or_insert_with(|| Event125 {
            unit_id,
            event: data.event,
            gain_code: data.gain_code,
            start: None,
            sample_rate: None,
            samples: Vec::new(),
            complete: false,
        });
        if let (None, Some(ext)) = (event.start, data.extended) {
            event.start = Some(ext.start);
            event.sample_rate = Some(ext.sample_rate);
            event.gain_code = data.gain_code;
        }
        event.samples.extend_from_slice(&data.samples);

        if page.header.flags.contains(PageFlags::Last) {
            event.complete = true;
            log::debug!(
                "RT-125A unit {} event {}: {} samples",
                event.unit_id,
                event.event,
                event.samples.len()
            );
            events.extend(open.take());
        }
    }

    if let Some(e) = open {
        log::warn!(
            "RT-125A unit {} event {} ends without its last page",
            e.unit_id,
            e.event
        );
        events.push(e);
    }
    events
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::lib::vec;
    use crate::lib::ToString;

    fn data_page(flags: u8, samples: &[i32]) -> Vec<u8> {
        let mut page = vec![0u8; PAGE_LEN];
        page[0] = 3;
        page[1..3].copy_from_slice(&2345u16.to_be_bytes());
        page[3..5].copy_from_slice(&17u16.to_be_bytes());
        page[5] = flags;
        page[6] = 0x03; // fsd 0, gain 4
        page[7..9].copy_from_slice(&9u16.to_be_bytes());
        page[9] = samples.len() as u8;
        let mut at = 10;
        if flags & 0b101 != 0 {
            // 2015, day 1*100 + 22 + 1, 01:02:03, 250 sps
            page[10..19].copy_from_slice(&[31, 1, 22, 1, 2, 3, 0, 250, 0]);
            at = 19;
        }
        for s in samples {
            page[at..at + 3].copy_from_slice(&s.to_be_bytes()[1..]);
            at += 3;
        }
        page
    }

    #[test]
    fn first_data_page() {
        let page = Page125::parse(&data_page(0b001, &[1, -1, 8388607])).unwrap();
        assert_eq!(page.header.unit_id, 12345);
        assert_eq!(page.header.sequence, 17);
        let PageBody::Data(data) = page.body else {
            panic!("not a data page");
        };
        assert_eq!(data.event, 9);
        assert_eq!(data.samples, [1, -1, 8388607]);
        let ext = data.extended.unwrap();
        assert_eq!(ext.sample_rate, 250);
        assert_eq!(ext.start.to_string(), "2015-05-03T01:02:03.000Z");
        assert_eq!(data.gain(), Some(4));
        assert_eq!(data.full_scale(), Some(0x50_0000));
    }

    #[test]
    fn continuation_page_has_no_extended_header() {
        let page = Page125::parse(&data_page(0, &[-2, 3])).unwrap();
        let PageBody::Data(data) = page.body else {
            panic!("not a data page");
        };
        assert!(data.extended.is_none());
        assert_eq!(data.samples, [-2, 3]);
    }

    #[test]
    fn unknown_gain() {
        let page = DataPage {
            gain_code: 0x2F,
            event: 0,
            extended: None,
            samples: Vec::new(),
        };
        assert_eq!(page.gain(), None);
        assert_eq!(page.bit_weight(), None);
    }

    fn with_event(mut page: Vec<u8>, event: u16) -> Vec<u8> {
        page[7..9].copy_from_slice(&event.to_be_bytes());
        page
    }

    #[test]
    fn pages_join_into_events() {
        let mut soh = vec![0u8; PAGE_LEN];
        soh[0] = 1;
        soh[5] = 0b010;
        let mut dump = Vec::new();
        for page in [
            data_page(0b001, &[1, 2]),
            soh,
            data_page(0, &[3]),
            data_page(0b010, &[4, 5]),
            with_event(data_page(0b001, &[6]), 10),
            with_event(data_page(0, &[7]), 10),
            with_event(data_page(0, &[8]), 11),
        ] {
            dump.extend(page);
        }
        let events = assemble_events(&parse_pages(&dump).unwrap());
        assert_eq!(events.len(), 3);

        let first = &events[0];
        assert_eq!(first.unit_id, 12345);
        assert_eq!(first.event, 9);
        assert_eq!(first.samples, [1, 2, 3, 4, 5]);
        assert!(first.complete);
        assert_eq!(first.sample_rate, Some(250));
        assert_eq!(first.start.unwrap().to_string(), "2015-05-03T01:02:03.000Z");
        assert_eq!(first.gain(), Some(4));
        assert_eq!(first.bit_weight(), Some(10.0 / 4.0 / 0x50_0000 as f64));

        assert_eq!(events[1].event, 10);
        assert_eq!(events[1].samples, [6, 7]);
        assert!(!events[1].complete);
        // no extended header ever seen
        assert_eq!(events[2].samples, [8]);
        assert_eq!(events[2].start, None);
        assert!(!events[2].complete);
    }

    #[test]
    fn erased_and_partial() {
        let mut buf = vec![0xFFu8; PAGE_LEN];
        buf.extend_from_slice(&data_page(0, &[5]));
        buf.extend_from_slice(&[0; 10]);
        assert_eq!(
            parse_pages(&buf).unwrap_err(),
            Error::short("RT-125A page", PAGE_LEN, 10)
        );
        let pages = parse_pages(&buf[..2 * PAGE_LEN]).unwrap();
        assert_eq!(pages[0].body, PageBody::Erased);
        assert!(matches!(pages[1].body, PageBody::Data(_)));
    }
}
