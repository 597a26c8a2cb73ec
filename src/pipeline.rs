//! Routing of RT-130 packets to their sample decoder and on to a trace sink.

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::data::Samples;
use crate::decimate::{DecimationCascade, DecimationSpec};
use crate::error::{Error, IntegrityWarning, Result};
use crate::event::EventHeader;
use crate::lib::{btree_map, BTreeMap, String, Vec};
use crate::packet::{DataFlags, DataFormat, DataHeader, PacketHeader, PacketTime, STEIM_FRAMES};
use crate::raw::{decode_int16, decode_int32};
use crate::steim::FRAME_LEN;
use crate::{Steim1Decode, Steim2Decode};

/// What to do with a packet that decoded with integrity warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrityPolicy {
    /// Keep the best-effort samples and report the packet as degraded.
    #[default]
    Degrade,
    /// Fail the packet with [`Error::DataIntegrity`].
    Abort,
}

/// Run-time options of a [`PacketPipeline`].
///
/// ```
/// let opts = reftekio::PipelineOptions::from_json(
///     r#"{ "integrity": "abort", "decimation": "2,5" }"#,
/// ).unwrap();
/// assert_eq!(opts.decimation.unwrap().total(), 10);
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    pub integrity: IntegrityPolicy,
    pub decimation: Option<DecimationSpec>,
}

impl PipelineOptions {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).map_err(|e| anyhow!(e))
    }
}

/// Naming and nominal rate of the channel a packet stream feeds.
///
/// A stream's event header, once seen, overrides `sample_rate` and fills an
/// empty `station`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StreamConfig {
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,
    /// Samples per second before decimation, used until an event header
    /// gives the stream's own rate.
    pub sample_rate: f64,
}

/// Metadata handed to a [`TraceSink`] with every sample vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChannelMeta {
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,
    /// Time of the first sample.
    pub start: PacketTime,
    pub sample_rate: f64,
}

/// The trace writer collaborator: accepts a sample vector with its metadata.
pub trait TraceSink {
    fn write_trace(&mut self, samples: &Samples, meta: &ChannelMeta) -> anyhow::Result<()>;
}

/// A sample vector as received by an in-memory sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TraceSegment {
    pub meta: ChannelMeta,
    pub samples: Samples,
}

impl TraceSink for Vec<TraceSegment> {
    fn write_trace(&mut self, samples: &Samples, meta: &ChannelMeta) -> anyhow::Result<()> {
        self.push(TraceSegment {
            meta: meta.clone(),
            samples: samples.clone(),
        });
        Ok(())
    }
}

/// One decoded RT-130 packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DecodedPacket {
    pub header: PacketHeader,
    /// Present for `DT` packets only.
    pub data: Option<DataHeader>,
    /// Present for `EH` and `ET` packets only.
    pub event: Option<EventHeader>,
    pub samples: Samples,
    pub warnings: Vec<IntegrityWarning>,
}

impl DecodedPacket {
    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Headers and warnings as pretty JSON, without the samples.
    pub fn summary(&self) -> anyhow::Result<String> {
        #[derive(Serialize)]
        #[serde(rename_all = "PascalCase")]
        struct Summary<'a> {
            header: &'a PacketHeader,
            data: &'a Option<DataHeader>,
            #[serde(skip_serializing_if = "Option::is_none")]
            event: &'a Option<EventHeader>,
            start_time: String,
            sample_count: usize,
            warnings: &'a [IntegrityWarning],
        }
        let summary = Summary {
            header: &self.header,
            data: &self.data,
            event: &self.event,
            start_time: crate::lib::format!("{}", self.header.time),
            sample_count: self.samples.len(),
            warnings: &self.warnings,
        };
        serde_json::to_string_pretty(&summary).map_err(|e| anyhow!(e))
    }
}

/// What [`PacketPipeline::process`] did with one packet.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PacketReport {
    pub sequence: u16,
    /// Samples handed to the sink, after decimation.
    pub samples_written: usize,
    pub warnings: Vec<IntegrityWarning>,
}

impl PacketReport {
    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// (unit id, stream, channel)
type ChannelKey = (u16, u8, u8);
/// (unit id, stream)
type StreamKey = (u16, u8);

/// Decodes packets and, when decimation is configured, keeps one
/// [`DecimationCascade`] per unit/stream/channel. The last event header of
/// each unit/stream supplies that stream's sample rate.
#[derive(Debug, Clone, Default)]
pub struct PacketPipeline {
    options: PipelineOptions,
    cascades: BTreeMap<ChannelKey, DecimationCascade>,
    events: BTreeMap<StreamKey, EventHeader>,
}

impl PacketPipeline {
    pub fn new(options: PipelineOptions) -> Self {
        Self {
            options,
            cascades: BTreeMap::new(),
            events: BTreeMap::new(),
        }
    }

    /// The last event header seen for `stream` of `unit_id`.
    pub fn event_header(&self, unit_id: u16, stream: u8) -> Option<&EventHeader> {
        self.events.get(&(unit_id, stream))
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Parses the headers of `buf` and decodes its payload.
    ///
    /// Non-data packets come back with their header and no samples; event
    /// headers and trailers also carry their decoded [`EventHeader`].
    /// Overscaled and unknown formats fail with [`Error::UnsupportedFormat`].
    pub fn decode(&self, buf: &[u8]) -> Result<DecodedPacket> {
        let mut warnings = Vec::new();
        let header = PacketHeader::parse(buf)?.drain_into(&mut warnings);
        if header.is_event() {
            let event = EventHeader::parse(buf)?.drain_into(&mut warnings);
            log::debug!(
                "{} packet {} from {}: event {} stream {} ({:?}) at {:?} sps",
                header.packet_type,
                header.sequence,
                header.unit_hex(),
                event.event,
                event.stream,
                event.stream_name,
                event.sample_rate
            );
            return self.finish(header, None, Some(event), Samples::default(), warnings);
        }
        if !header.is_data() {
            log::debug!(
                "Packet {} ({}) from {} carries no samples",
                header.sequence,
                header.packet_type,
                header.unit_hex()
            );
            return self.finish(header, None, None, Samples::default(), warnings);
        }

        let data = DataHeader::parse(buf)?.drain_into(&mut warnings);
        let n = data.samples as usize;
        let payload = data
            .format
            .payload_offset()
            .and_then(|offset| buf.get(offset..))
            .unwrap_or(&[]);
        log::debug!(
            "Packet {} from {}: stream {} channel {}, {} {} samples",
            header.sequence,
            header.unit_hex(),
            data.stream,
            data.channel,
            n,
            data.format
        );

        let samples = match data.format {
            DataFormat::Int16 => decode_int16(payload, n)?,
            DataFormat::Int32 => decode_int32(payload, n)?,
            DataFormat::Steim1 | DataFormat::Steim2 => {
                let end = payload.len().min(STEIM_FRAMES * FRAME_LEN);
                let frames = &payload[..end];
                let trace = if data.format == DataFormat::Steim1 {
                    frames.decode_steim1(n)?
                } else {
                    frames.decode_steim2(n)?
                };
                warnings.extend(trace.warnings);
                trace.samples
            }
            other => return Err(Error::UnsupportedFormat(other.code())),
        };
        self.finish(header, Some(data), None, Samples::I32(samples), warnings)
    }

    fn finish(
        &self,
        header: PacketHeader,
        data: Option<DataHeader>,
        event: Option<EventHeader>,
        samples: Samples,
        warnings: Vec<IntegrityWarning>,
    ) -> Result<DecodedPacket> {
        if let (IntegrityPolicy::Abort, Some(first)) = (self.options.integrity, warnings.first()) {
            return Err(Error::DataIntegrity(first.clone()));
        }
        Ok(DecodedPacket {
            header,
            data,
            event,
            samples,
            warnings,
        })
    }

    /// Decodes one packet, decimates it if configured and writes the result
    /// to `sink`.
    pub fn process<S: TraceSink>(
        &mut self,
        buf: &[u8],
        config: &StreamConfig,
        sink: &mut S,
    ) -> anyhow::Result<PacketReport> {
        let packet = self.decode(buf)?;
        self.process_decoded(packet, config, sink)
    }

    /// [`Self::process`] for a packet already returned by [`Self::decode`].
    pub fn process_decoded<S: TraceSink>(
        &mut self,
        packet: DecodedPacket,
        config: &StreamConfig,
        sink: &mut S,
    ) -> anyhow::Result<PacketReport> {
        let mut report = PacketReport {
            sequence: packet.header.sequence,
            samples_written: 0,
            warnings: packet.warnings,
        };
        if let Some(event) = packet.event {
            self.events.insert((packet.header.unit_id, event.stream), event);
            return Ok(report);
        }
        let Some(data) = packet.data else {
            return Ok(report);
        };

        let event = self.events.get(&(packet.header.unit_id, data.stream));
        let sample_rate = event
            .and_then(|e| e.sample_rate)
            .unwrap_or(config.sample_rate);
        let station = match event {
            Some(e) if config.station.is_empty() => e.station.clone(),
            _ => config.station.clone(),
        };
        let mut meta = ChannelMeta {
            network: config.network.clone(),
            station,
            location: config.location.clone(),
            channel: config.channel.clone(),
            start: packet.header.time,
            sample_rate,
        };

        let samples = match &self.options.decimation {
            None => packet.samples,
            Some(spec) => {
                let key = (packet.header.unit_id, data.stream, data.channel);
                let cascade = match self.cascades.entry(key) {
                    btree_map::Entry::Occupied(e) => e.into_mut(),
                    btree_map::Entry::Vacant(e) => e.insert(DecimationCascade::new(spec)?),
                };
                if data.flags.contains(DataFlags::FirstDataPacket) {
                    cascade.reset();
                }
                let decimated = cascade.decimate(&packet.samples.to_f64())?;
                meta.start = packet
                    .header
                    .time
                    .offset_millis(offset_millis(decimated.start_offset, sample_rate));
                meta.sample_rate = sample_rate / spec.total() as f64;
                Samples::I32(decimated.to_counts())
            }
        };

        if !samples.is_empty() {
            sink.write_trace(&samples, &meta)?;
            report.samples_written = samples.len();
        }
        Ok(report)
    }
}

/// Duration of `samples` periods at `rate`, to the nearest millisecond.
fn offset_millis(samples: usize, rate: f64) -> i64 {
    if rate <= 0.0 {
        return 0;
    }
    (samples as f64 * 1000.0 / rate + 0.5) as i64
}
