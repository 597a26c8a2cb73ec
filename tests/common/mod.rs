//! Builders for synthetic RT-130 packets.

#![allow(dead_code)]

use reftekio::PACKET_LEN;

/// Writes `value` as `count` BCD digits starting at nibble `start`.
pub fn put_bcd(buf: &mut [u8], start: usize, count: usize, mut value: u32) {
    for pos in (start..start + count).rev() {
        let digit = (value % 10) as u8;
        value /= 10;
        let byte = &mut buf[pos / 2];
        if pos % 2 == 0 {
            *byte = (*byte & 0x0F) | digit << 4;
        } else {
            *byte = (*byte & 0xF0) | digit;
        }
    }
}

#[derive(Debug, Clone)]
pub struct Dt {
    pub unit: u16,
    pub sequence: u32,
    pub stream: u32,
    pub channel: u32,
    pub flags: u8,
    pub format: u8,
    pub samples: u32,
    /// year (2 digits), day of year, hour, minute, second, millisecond
    pub time: (u32, u32, u32, u32, u32, u32),
}

impl Default for Dt {
    fn default() -> Self {
        Dt {
            unit: 0x9F2A,
            sequence: 1,
            stream: 0,
            channel: 0,
            flags: 0,
            format: 0x16,
            samples: 0,
            time: (19, 45, 12, 0, 0, 0),
        }
    }
}

impl Dt {
    /// A full 1024-byte packet with `payload` at the offset its format uses.
    pub fn packet(&self, payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; PACKET_LEN];
        buf[0] = b'D';
        buf[1] = b'T';
        put_bcd(&mut buf, 4, 2, 1);
        put_bcd(&mut buf, 6, 2, self.time.0);
        buf[4..6].copy_from_slice(&self.unit.to_be_bytes());
        put_bcd(&mut buf, 12, 3, self.time.1);
        put_bcd(&mut buf, 15, 2, self.time.2);
        put_bcd(&mut buf, 17, 2, self.time.3);
        put_bcd(&mut buf, 19, 2, self.time.4);
        put_bcd(&mut buf, 21, 3, self.time.5);
        put_bcd(&mut buf, 24, 4, PACKET_LEN as u32);
        put_bcd(&mut buf, 28, 4, self.sequence);
        put_bcd(&mut buf, 32, 4, 1);
        put_bcd(&mut buf, 36, 2, self.stream);
        put_bcd(&mut buf, 38, 2, self.channel);
        put_bcd(&mut buf, 40, 4, self.samples);
        buf[22] = self.flags;
        buf[23] = self.format;
        let offset = if self.format & 0xF0 == 0xC0 { 64 } else { 24 };
        buf[offset..offset + payload.len()].copy_from_slice(payload);
        buf
    }

    pub fn int16(&self, samples: &[i16]) -> Vec<u8> {
        let payload: Vec<u8> = samples.iter().flat_map(|s| s.to_be_bytes()).collect();
        Dt {
            format: 0x16,
            samples: samples.len() as u32,
            ..self.clone()
        }
        .packet(&payload)
    }

    pub fn int32(&self, samples: &[i32]) -> Vec<u8> {
        let payload: Vec<u8> = samples.iter().flat_map(|s| s.to_be_bytes()).collect();
        Dt {
            format: 0x32,
            samples: samples.len() as u32,
            ..self.clone()
        }
        .packet(&payload)
    }

    pub fn steim1(&self, samples: &[i32]) -> Vec<u8> {
        let block = reftekio::encode_steim1(samples, 0).unwrap();
        Dt {
            format: 0xC0,
            samples: samples.len() as u32,
            ..self.clone()
        }
        .packet(&block)
    }

    pub fn steim2(&self, samples: &[i32]) -> Vec<u8> {
        let block = reftekio::encode_steim2(samples, 0).unwrap();
        Dt {
            format: 0xC2,
            samples: samples.len() as u32,
            ..self.clone()
        }
        .packet(&block)
    }
}

/// A non-data packet of type `kind`, e.g. `b"EH"`.
pub fn other_packet(kind: &[u8; 2], sequence: u32) -> Vec<u8> {
    let mut buf = Dt {
        sequence,
        ..Dt::default()
    }
    .packet(&[]);
    buf[..2].copy_from_slice(kind);
    buf
}

/// An `EH` or `ET` packet for `stream`, first sample at 2019-045 12:00.
pub fn event_packet(kind: &[u8; 2], stream: u32, station: &str, rate: &str) -> Vec<u8> {
    let mut buf = other_packet(kind, 1);
    put_bcd(&mut buf, 36, 2, stream);
    buf[59..59 + station.len()].copy_from_slice(station.as_bytes());
    buf[88..92].copy_from_slice(format!("{:>4}", rate).as_bytes());
    buf[112..128].copy_from_slice(b"2019045120000000");
    buf
}
