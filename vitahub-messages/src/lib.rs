mod command;
mod packet;
mod state;
mod stream;
mod tag;
mod units;

pub use command::Command;
pub use packet::{DecodedPacket, FftChunk, MeterReading, PacketBody, PacketClass, WaterfallTile};
pub use state::{PanadapterDescriptor, ViewportExtent};
pub use stream::StreamKey;
pub use tag::MessageKind;
pub use units::Hertz;
