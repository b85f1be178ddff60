//! FlexRadio VITA-49 decoding into [`DecodedPacket`] records.
//!
//! All multi-byte fields are big-endian. The preamble is laid out as
//!
//! ```text
//! word 0   header: type(4) C(1) T(1) rsvd(2) TSI(2) TSF(2) count(4) size(16)
//! word 1   stream id                   (types 1 and 3)
//! word 2-3 class id: OUI, info class, packet class   (C set)
//! word 4   integer timestamp           (TSI != 0)
//! word 5-6 fractional timestamp        (TSF != 0)
//! ...      payload
//! last     trailer                     (T set)
//! ```

use bytes::{Buf, Bytes};
use thiserror::Error;
use vitahub_messages::{DecodedPacket, FftChunk, MeterReading, PacketBody, PacketClass, StreamKey, WaterfallTile};

/// IF data packet with stream id.
pub const PACKET_TYPE_IF_DATA: u8 = 0x1;
/// Extension data packet with stream id.
pub const PACKET_TYPE_EXT_DATA: u8 = 0x3;
/// FlexRadio OUI carried in the class id.
pub const FLEX_OUI: u32 = 0x001C2D;

const PREAMBLE_LEN: usize = 16;
const FFT_HEADER_LEN: usize = 12;
const WATERFALL_HEADER_LEN: usize = 36;
/// VITA-49 frequencies carry 20 fractional bits.
const FREQ_RADIX_BITS: u32 = 20;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("datagram too short: {0} bytes")]
    TooShort(usize),
    #[error("packet type {0:#x} carries no stream id")]
    NoStreamId(u8),
    #[error("packet carries no class id")]
    NoClassId,
    #[error("declared size {declared} bytes exceeds datagram of {actual} bytes")]
    SizeMismatch { declared: usize, actual: usize },
    #[error("{class:?} payload truncated: need {need} bytes, have {have}")]
    Truncated { class: PacketClass, need: usize, have: usize },
}

/// Turns one captured datagram into a typed packet.
pub trait PacketDecoder: Send {
    fn decode(&self, datagram: &Bytes) -> Result<DecodedPacket, DecodeError>;
}

/// Decoder for the VITA-49 dialect FlexRadio radios stream on UDP.
///
/// The datagram length is authoritative: the header counts whole 32-bit words,
/// so a payload that does not fill its last word (Opus) arrives in a datagram
/// up to three bytes shorter than declared, and is returned byte-exact. Zero
/// bytes actually present inside the datagram are payload; the packet carries
/// no pad count to tell them apart.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlexVitaDecoder;

impl PacketDecoder for FlexVitaDecoder {
    fn decode(&self, datagram: &Bytes) -> Result<DecodedPacket, DecodeError> {
        let (stream, class, payload) = parse_preamble(datagram)?;
        let body = match class {
            PacketClass::Fft => PacketBody::Fft(parse_fft(&payload)?),
            PacketClass::Waterfall => PacketBody::Waterfall(parse_waterfall(&payload)?),
            PacketClass::Opus => PacketBody::Opus(payload),
            PacketClass::Meter => PacketBody::Meter(parse_meters(&payload)),
            _ => PacketBody::Opaque(payload),
        };
        Ok(DecodedPacket { stream, class, body })
    }
}

fn parse_preamble(datagram: &Bytes) -> Result<(StreamKey, PacketClass, Bytes), DecodeError> {
    if datagram.len() < PREAMBLE_LEN {
        return Err(DecodeError::TooShort(datagram.len()));
    }
    let mut preamble = &datagram[..PREAMBLE_LEN];

    let header = preamble.get_u32();
    let packet_type = (header >> 28) as u8;
    let class_present = header & (1 << 27) != 0;
    let trailer_present = header & (1 << 26) != 0;
    let tsi = (header >> 22) & 0x3;
    let tsf = (header >> 20) & 0x3;
    let declared = (header & 0xFFFF) as usize * 4;

    // only the last word may be cut short
    let length = match declared.checked_sub(datagram.len()) {
        None | Some(0..=3) => declared.min(datagram.len()),
        Some(_) => {
            return Err(DecodeError::SizeMismatch {
                declared,
                actual: datagram.len(),
            });
        }
    };
    if packet_type != PACKET_TYPE_IF_DATA && packet_type != PACKET_TYPE_EXT_DATA {
        return Err(DecodeError::NoStreamId(packet_type));
    }
    if !class_present {
        return Err(DecodeError::NoClassId);
    }

    let stream = StreamKey(preamble.get_u32());
    // OUI
    preamble.advance(4);
    let packet_class = PacketClass::from_code((preamble.get_u32() & 0xFFFF) as u16);

    let mut start = PREAMBLE_LEN;
    if tsi != 0 {
        start += 4;
    }
    if tsf != 0 {
        start += 8;
    }
    let end = length.saturating_sub(if trailer_present { 4 } else { 0 });
    if end < start {
        return Err(DecodeError::TooShort(length));
    }

    Ok((stream, packet_class, datagram.slice(start..end)))
}

fn need(class: PacketClass, payload: &[u8], len: usize) -> Result<(), DecodeError> {
    if payload.len() < len {
        return Err(DecodeError::Truncated {
            class,
            need: len,
            have: payload.len(),
        });
    }
    Ok(())
}

fn get_u16_run(buf: &mut &[u8], count: u16) -> Vec<u16> {
    (0..count).map(|_| buf.get_u16()).collect()
}

fn parse_fft(payload: &[u8]) -> Result<FftChunk, DecodeError> {
    need(PacketClass::Fft, payload, FFT_HEADER_LEN)?;
    let mut buf = payload;
    let start_bin_index = buf.get_u16();
    let num_bins = buf.get_u16();
    let bin_size = buf.get_u16();
    let total_bins_in_frame = buf.get_u16();
    let frame_index = buf.get_u32();
    need(PacketClass::Fft, payload, FFT_HEADER_LEN + usize::from(num_bins) * 2)?;

    Ok(FftChunk {
        frame_index,
        total_bins_in_frame,
        num_bins,
        start_bin_index,
        bin_size,
        bins: get_u16_run(&mut buf, num_bins),
    })
}

fn parse_waterfall(payload: &[u8]) -> Result<WaterfallTile, DecodeError> {
    need(PacketClass::Waterfall, payload, WATERFALL_HEADER_LEN)?;
    let mut buf = payload;
    let frame_low_freq = buf.get_u64() >> FREQ_RADIX_BITS;
    let bin_bandwidth = buf.get_u64() >> FREQ_RADIX_BITS;
    let line_duration_ms = buf.get_u32();
    let width = buf.get_u16();
    let height = buf.get_u16();
    let timecode = buf.get_u32();
    let auto_black_level = buf.get_u32();
    let total_bins_in_frame = buf.get_u16();
    let first_bin_index = buf.get_u16();
    need(PacketClass::Waterfall, payload, WATERFALL_HEADER_LEN + usize::from(width) * 2)?;

    Ok(WaterfallTile {
        frame_low_freq,
        bin_bandwidth,
        line_duration_ms,
        width,
        height,
        timecode,
        auto_black_level,
        total_bins_in_frame,
        first_bin_index,
        samples: get_u16_run(&mut buf, width),
    })
}

fn parse_meters(payload: &[u8]) -> Vec<MeterReading> {
    let mut buf = payload;
    let mut readings = Vec::with_capacity(buf.remaining() / 4);
    while buf.remaining() >= 4 {
        readings.push(MeterReading {
            id: buf.get_u16(),
            value: buf.get_i16(),
        });
    }
    readings
}
