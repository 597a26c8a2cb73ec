#![no_std]
#![deny(unsafe_code)]
#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/README.md"))]

#[cfg(feature = "std")]
extern crate std;

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(not(any(feature = "std", feature = "alloc")))]
compile_error!("reftekio crate requires either std or alloc feature to be enabled");

pub use crate::bcd::decode_bcd;
pub use crate::data::{DecodedTrace, Samples};
pub use crate::decimate::{DecimationCascade, DecimationSpec, Decimated, DelayedCascade, Factor};
pub use crate::event::EventHeader;
pub use crate::error::{Error, ErrorKind, Flagged, IntegrityWarning, Result};
pub use crate::ibm::{decode_ibm_floats, ibm_to_f32, ibm_to_ieee, ieee_to_ibm};
pub use crate::packet::{
    DataFlags, DataFormat, DataHeader, PacketHeader, PacketTime, DATA_HEADER_LEN, PACKET_HEADER_LEN,
    PACKET_LEN,
};
pub use crate::pipeline::{
    ChannelMeta, DecodedPacket, IntegrityPolicy, PacketPipeline, PacketReport, PipelineOptions,
    StreamConfig, TraceSegment, TraceSink,
};
pub use crate::raw::{decode_int16, decode_int24, decode_int32};
pub use crate::rt125a::{
    assemble_events, parse_pages, DataPage, Event125, ExtendedHeader, Page125, PageBody,
    PageFlags, PageHeader, PAGE_LEN,
};
pub use crate::steim::{encode_steim1, encode_steim2, CompressedFrame, FRAME_LEN};

mod bcd;
mod data;
mod decimate;
mod error;
mod event;
mod fir;
mod ibm;
mod packet;
mod pipeline;
mod raw;
mod rt125a;
mod steim;

mod lib {
    #[cfg(all(feature = "alloc", not(feature = "std")))]
    pub use alloc::{
        collections::{btree_map, BTreeMap},
        format,
        string::{String, ToString},
        vec,
        vec::Vec,
    };
    #[cfg(all(feature = "alloc", not(feature = "std")))]
    pub use core::{fmt, str};
    #[cfg(feature = "std")]
    pub use std::{
        collections::{btree_map, BTreeMap},
        fmt, format, str,
        string::{String, ToString},
        vec,
        vec::Vec,
    };
}

/// Steim-1 decompression of a run of 64-byte frames.
pub trait Steim1Decode {
    /// Reconstructs exactly `sample_count` samples. Integrity problems are
    /// reported in [`DecodedTrace::warnings`] and never abort the decode.
    fn decode_steim1(&self, sample_count: usize) -> Result<DecodedTrace>;
}

/// Steim-2 decompression of a run of 64-byte frames.
pub trait Steim2Decode {
    /// Reconstructs exactly `sample_count` samples. Integrity problems are
    /// reported in [`DecodedTrace::warnings`] and never abort the decode.
    fn decode_steim2(&self, sample_count: usize) -> Result<DecodedTrace>;
}
