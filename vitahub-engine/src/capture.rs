use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::path::Path;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use flume::Sender;
use log::{debug, info, warn};

/// Largest datagram a capture source hands over.
pub const MAX_DATAGRAM: usize = 65_536;

/// Abstraction for datagram sources (live socket, replay file, mocks).
pub trait PacketSource: Send {
    /// Next datagram. `Ok(None)` means the source is exhausted.
    /// `WouldBlock`/`TimedOut` errors are idle ticks, not failures.
    fn next_datagram(&mut self) -> io::Result<Option<Bytes>>;
}

/// Live capture from a bound UDP socket.
#[derive(Debug)]
pub struct UdpCaptureSource {
    socket: UdpSocket,
    buf: Vec<u8>,
}

impl UdpCaptureSource {
    /// Bind the capture socket. Failing here is fatal for the caller.
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        // wake up regularly so the capture thread notices a closed pipeline
        socket.set_read_timeout(Some(Duration::from_millis(250)))?;
        Ok(Self {
            socket,
            buf: vec![0u8; MAX_DATAGRAM],
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl PacketSource for UdpCaptureSource {
    fn next_datagram(&mut self) -> io::Result<Option<Bytes>> {
        let (n, _from) = self.socket.recv_from(&mut self.buf)?;
        Ok(Some(Bytes::copy_from_slice(&self.buf[..n])))
    }
}

/// Replays datagrams recorded as `u32` big-endian length + bytes.
#[derive(Debug)]
pub struct ReplayFileSource {
    reader: BufReader<File>,
    loop_on_eof: bool,
    /// Records read since the last rewind; an empty file must not spin.
    records_since_rewind: u64,
}

impl ReplayFileSource {
    /// Open a recording. If `loop_on_eof` is true, playback restarts from the beginning on EOF.
    pub fn open<P: AsRef<Path>>(path: P, loop_on_eof: bool) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::new(file),
            loop_on_eof,
            records_since_rewind: 0,
        })
    }

    fn read_record(&mut self) -> io::Result<Option<Bytes>> {
        let mut len = [0u8; 4];
        match self.reader.read_exact(&mut len) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        }
        let len = u32::from_be_bytes(len) as usize;
        if len > MAX_DATAGRAM {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("replay record of {} bytes exceeds {}", len, MAX_DATAGRAM),
            ));
        }
        let mut record = vec![0u8; len];
        match self.reader.read_exact(&mut record) {
            Ok(()) => Ok(Some(Bytes::from(record))),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                warn!("replay file ends inside a record, ignoring the tail");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

impl PacketSource for ReplayFileSource {
    fn next_datagram(&mut self) -> io::Result<Option<Bytes>> {
        loop {
            if let Some(record) = self.read_record()? {
                self.records_since_rewind += 1;
                return Ok(Some(record));
            }
            if !self.loop_on_eof || self.records_since_rewind == 0 {
                return Ok(None);
            }
            self.reader.seek(SeekFrom::Start(0))?;
            self.records_since_rewind = 0;
        }
    }
}

/// Append one datagram to a replay recording.
pub fn write_record<W: Write>(out: &mut W, datagram: &[u8]) -> io::Result<()> {
    let len = u32::try_from(datagram.len()).map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "datagram too large"))?;
    out.write_all(&len.to_be_bytes())?;
    out.write_all(datagram)
}

/// Run `source` on its own thread, pushing datagrams into `datagram_tx`.
///
/// Sending blocks when the queue is full, which is the backpressure into
/// capture. The thread ends when the source is exhausted or the receiving
/// side is gone; an I/O error ends it with that error.
pub fn spawn_capture<S>(mut source: S, datagram_tx: Sender<Bytes>) -> io::Result<JoinHandle<anyhow::Result<()>>>
where
    S: PacketSource + 'static,
{
    thread::Builder::new().name("capture".into()).spawn(move || {
        let mut captured = 0u64;
        loop {
            match source.next_datagram() {
                Ok(Some(datagram)) => {
                    captured += 1;
                    if datagram_tx.send(datagram).is_err() {
                        debug!("Ingestion side closed, capture stopping");
                        break;
                    }
                }
                Ok(None) => {
                    info!("Capture source exhausted after {} datagrams", captured);
                    break;
                }
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted) => {
                    if datagram_tx.is_disconnected() {
                        break;
                    }
                }
                Err(e) => return Err(e).context("capture source failed"),
            }
        }
        Ok(())
    })
}
