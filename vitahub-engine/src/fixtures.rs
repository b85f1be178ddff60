//! Builders for FlexRadio VITA-49 datagrams, used by tests and tooling.

use bytes::{BufMut, Bytes, BytesMut};

use crate::decode::{FLEX_OUI, PACKET_TYPE_EXT_DATA};

/// Information class code FlexRadio puts in the class id.
pub const FLEX_INFO_CLASS: u16 = 0x534C;

/// Optional preamble sections.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreambleOptions {
    pub timestamps: bool,
    pub trailer: bool,
    /// End the payload at its last byte instead of zero-padding it to a word.
    /// The size field still counts the partial word.
    pub exact_length: bool,
}

/// A datagram with stream id and class id, payload padded to a word boundary.
pub fn packet(packet_type: u8, stream: u32, class_code: u16, payload: &[u8]) -> Bytes {
    packet_with(packet_type, stream, class_code, payload, PreambleOptions::default())
}

pub fn packet_with(packet_type: u8, stream: u32, class_code: u16, payload: &[u8], options: PreambleOptions) -> Bytes {
    let padded = payload.len().div_ceil(4) * 4;
    let mut words = 4 + padded / 4;
    if options.timestamps {
        words += 3;
    }
    if options.trailer {
        words += 1;
    }

    let mut header = (u32::from(packet_type) << 28) | (1 << 27) | (words as u32 & 0xFFFF);
    if options.trailer {
        header |= 1 << 26;
    }
    if options.timestamps {
        header |= (1 << 22) | (1 << 20);
    }

    let mut out = BytesMut::with_capacity(words * 4);
    out.put_u32(header);
    out.put_u32(stream);
    out.put_u32(FLEX_OUI);
    out.put_u32((u32::from(FLEX_INFO_CLASS) << 16) | u32::from(class_code));
    if options.timestamps {
        out.put_u32(0x6000_0000);
        out.put_u64(0x0000_0000_0000_1234);
    }
    out.put_slice(payload);
    if !options.exact_length {
        out.put_bytes(0, padded - payload.len());
    }
    if options.trailer {
        out.put_u32(0xDEAD_BEEF);
    }
    out.freeze()
}

/// One FFT chunk carrying `bins`, starting at `start_bin`.
pub fn fft_packet(stream: u32, frame_index: u32, total_bins: u16, start_bin: u16, bins: &[u16]) -> Bytes {
    let mut payload = BytesMut::with_capacity(12 + bins.len() * 2);
    payload.put_u16(start_bin);
    payload.put_u16(bins.len() as u16);
    payload.put_u16(2);
    payload.put_u16(total_bins);
    payload.put_u32(frame_index);
    for &bin in bins {
        payload.put_u16(bin);
    }
    packet(PACKET_TYPE_EXT_DATA, stream, 0x8003, &payload)
}

/// One waterfall chunk carrying `samples`. Frequencies are in whole Hz.
pub fn waterfall_packet(
    stream: u32,
    timecode: u32,
    low_freq_hz: u64,
    bin_bandwidth_hz: u64,
    total_bins: u16,
    samples: &[u16],
) -> Bytes {
    let mut payload = BytesMut::with_capacity(36 + samples.len() * 2);
    payload.put_u64(low_freq_hz << 20);
    payload.put_u64(bin_bandwidth_hz << 20);
    payload.put_u32(100);
    payload.put_u16(samples.len() as u16);
    payload.put_u16(1);
    payload.put_u32(timecode);
    payload.put_u32(0);
    payload.put_u16(total_bins);
    payload.put_u16(0);
    for &sample in samples {
        payload.put_u16(sample);
    }
    packet(PACKET_TYPE_EXT_DATA, stream, 0x8004, &payload)
}

pub fn meter_packet(stream: u32, readings: &[(u16, i16)]) -> Bytes {
    let mut payload = BytesMut::with_capacity(readings.len() * 4);
    for &(id, value) in readings {
        payload.put_u16(id);
        payload.put_i16(value);
    }
    packet(PACKET_TYPE_EXT_DATA, stream, 0x8002, &payload)
}

/// Opus datagrams are sent at their exact length, like the radio does.
pub fn opus_packet(stream: u32, opus: &[u8]) -> Bytes {
    let options = PreambleOptions {
        exact_length: true,
        ..Default::default()
    };
    packet_with(PACKET_TYPE_EXT_DATA, stream, 0x8005, opus, options)
}
