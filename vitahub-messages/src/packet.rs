use bytes::Bytes;

use crate::StreamKey;

/// Packet class, derived from the VITA-49 packet class code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketClass {
    /// Meter values -- 0x8002.
    Meter,
    /// FFT / spectrum frame chunk -- 0x8003.
    Fft,
    /// Waterfall tile chunk -- 0x8004.
    Waterfall,
    /// Opus compressed audio -- 0x8005.
    Opus,
    /// Narrowband IF (DAX audio) -- 0x03E3.
    NarrowIf,
    /// Wideband IF (DAX IQ 24/48/96/192 ksps) -- 0x02E3..=0x02E6.
    WideIf,
    /// Discovery broadcast -- 0xFFFF.
    Discovery,
    /// Anything else.
    Unknown(u16),
}

impl PacketClass {
    pub fn from_code(code: u16) -> Self {
        match code {
            0x8002 => PacketClass::Meter,
            0x8003 => PacketClass::Fft,
            0x8004 => PacketClass::Waterfall,
            0x8005 => PacketClass::Opus,
            0x03E3 => PacketClass::NarrowIf,
            0x02E3..=0x02E6 => PacketClass::WideIf,
            0xFFFF => PacketClass::Discovery,
            other => PacketClass::Unknown(other),
        }
    }
}

/// One MTU-sized slice of an FFT frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FftChunk {
    /// Index of the frame this chunk belongs to.
    pub frame_index: u32,
    /// Bins the whole frame will have once complete.
    pub total_bins_in_frame: u16,
    /// Bins carried by this chunk, as declared by the sender.
    pub num_bins: u16,
    /// Position of the first bin of this chunk inside the frame.
    pub start_bin_index: u16,
    /// Bytes per bin on the wire.
    pub bin_size: u16,
    pub bins: Vec<u16>,
}

/// One slice of a waterfall tile.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WaterfallTile {
    /// Frequency of native bin 0, in Hz.
    pub frame_low_freq: u64,
    /// Width of one native bin, in Hz.
    pub bin_bandwidth: u64,
    pub line_duration_ms: u32,
    /// Bins carried by this chunk.
    pub width: u16,
    pub height: u16,
    /// Capture time of the tile; a new value starts a new tile.
    pub timecode: u32,
    pub auto_black_level: u32,
    pub total_bins_in_frame: u16,
    pub first_bin_index: u16,
    pub samples: Vec<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeterReading {
    pub id: u16,
    pub value: i16,
}

/// Class-specific payload of a decoded packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketBody {
    Fft(FftChunk),
    Waterfall(WaterfallTile),
    Opus(Bytes),
    Meter(Vec<MeterReading>),
    /// Payload the core never looks into (IF data, discovery, unknown classes).
    Opaque(Bytes),
}

/// Typed packet record handed over by the decode layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPacket {
    pub stream: StreamKey,
    pub class: PacketClass,
    pub body: PacketBody,
}
