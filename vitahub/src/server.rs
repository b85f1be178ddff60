use std::io::{self, BufWriter, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::thread;

use bytes::Bytes;
use log::{debug, info, warn};
use vitahub_engine::{HubHandle, SinkReceiver, channel_sink};

/// Accept clients on `addr`; each connection becomes one hub sink.
pub fn spawn(addr: SocketAddr, hub: HubHandle, sink_capacity: usize) -> io::Result<()> {
    let listener = TcpListener::bind(addr)?;
    info!("Accepting clients on {}", listener.local_addr()?);
    thread::Builder::new().name("clients".into()).spawn(move || {
        for stream in listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("Accept failed: {}", e);
                    continue;
                }
            };
            let (sink, frames) = channel_sink(sink_capacity);
            if hub.register(sink).is_err() {
                break;
            }
            let hub = hub.clone();
            let spawned = thread::Builder::new()
                .name(format!("client-{}", frames.id()))
                .spawn(move || serve(stream, frames, hub));
            if let Err(e) = spawned {
                warn!("Cannot start client writer: {}", e);
            }
        }
    })?;
    Ok(())
}

/// Write frames as `u32` big-endian length + bytes until the hub or the client lets go.
fn serve(stream: TcpStream, frames: SinkReceiver, hub: HubHandle) {
    let peer = stream.peer_addr().map(|a| a.to_string()).unwrap_or_else(|_| "?".into());
    debug!("{} serving {}", frames.id(), peer);
    let mut out = BufWriter::new(&stream);

    while let Some(frame) = frames.recv() {
        let result = write_frame(&mut out, &frame).and_then(|()| {
            // flush only when nothing else is waiting
            if frames.pending() == 0 { out.flush() } else { Ok(()) }
        });
        if let Err(e) = result {
            debug!("{} write to {} failed: {}", frames.id(), peer, e);
            let _ = hub.unregister(frames.id());
            break;
        }
    }

    let _ = out.flush();
    let _ = stream.shutdown(Shutdown::Both);
    info!("{} disconnected ({})", frames.id(), peer);
}

fn write_frame<W: Write>(out: &mut W, frame: &Bytes) -> io::Result<()> {
    let len = u32::try_from(frame.len()).map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame too large"))?;
    out.write_all(&len.to_be_bytes())?;
    out.write_all(frame)
}
