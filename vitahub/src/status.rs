use std::io::{self, BufRead, BufReader};
use std::net::{SocketAddr, TcpStream};
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use vitahub_engine::PanadapterRegistry;
use vitahub_engine::panadapter::StatusUpdate;

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Follow a stream of radio status lines and keep the registry's geometry current.
/// Reconnects when the stream drops.
pub fn spawn_reader(addr: SocketAddr, registry: PanadapterRegistry) -> io::Result<()> {
    thread::Builder::new().name("status".into()).spawn(move || {
        loop {
            match TcpStream::connect(addr) {
                Ok(stream) => {
                    info!("Reading status lines from {}", addr);
                    follow(BufReader::new(stream), &registry);
                    warn!("Status stream {} closed", addr);
                }
                Err(e) => debug!("Status connect to {} failed: {}", addr, e),
            }
            thread::sleep(RECONNECT_DELAY);
        }
    })?;
    Ok(())
}

fn follow<R: BufRead>(reader: R, registry: &PanadapterRegistry) {
    for line in reader.lines() {
        let Ok(line) = line else {
            break;
        };
        match registry.apply_status_line(&line) {
            Ok(StatusUpdate::Updated(pan)) => debug!("Panadapter {} updated", pan),
            Ok(StatusUpdate::Removed(pan)) => info!("Panadapter {} removed", pan),
            Ok(StatusUpdate::Ignored) => {}
            Err(e) => debug!("Unusable status line {:?}: {}", line, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitahub_messages::StreamKey;

    #[test]
    fn test_follow_applies_lines() {
        let registry = PanadapterRegistry::new();
        let input = "S1|display pan 0x40000000 center=14.1 bandwidth=0.2 x_pixels=800\n\
                     S1|slice 0 mode=USB\n\
                     display pan set 0x40000000 xpixels=bogus\n";
        follow(input.as_bytes(), &registry);

        let pan = registry.get(StreamKey(0x4000_0000)).unwrap();
        assert_eq!(pan.x_pixels, 800);
    }
}
