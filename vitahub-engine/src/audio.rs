use std::thread::{self, JoinHandle};

use bytes::Bytes;
use flume::Sender;
use log::{debug, trace};
use vitahub_messages::MessageKind;

use crate::hub::HubHandle;

/// Tags Opus chunks and forwards them to the hub from a small pool of workers.
///
/// Audio needs no reassembly, so chunks are handled concurrently and may reach
/// the hub out of order. Chunks arriving while every worker is busy and the
/// queue is full are dropped: late audio is useless to the client.
pub struct AudioForwarder {
    jobs: Sender<Bytes>,
    workers: Vec<JoinHandle<()>>,
}

impl AudioForwarder {
    pub fn spawn(workers: usize, queue: usize, hub: HubHandle) -> std::io::Result<Self> {
        let (jobs, job_rx) = flume::bounded::<Bytes>(queue.max(1));
        let workers = (0..workers.max(1))
            .map(|n| {
                let job_rx = job_rx.clone();
                let hub = hub.clone();
                thread::Builder::new()
                    .name(format!("audio-{}", n))
                    .spawn(move || {
                        for payload in job_rx.iter() {
                            if hub.broadcast(MessageKind::Opus.message(&payload)).is_err() {
                                break;
                            }
                        }
                        debug!("Audio worker {} exiting", n);
                    })
            })
            .collect::<std::io::Result<Vec<_>>>()?;
        Ok(Self { jobs, workers })
    }

    /// Queue one Opus payload. Returns false if it had to be dropped.
    pub fn forward(&self, payload: Bytes) -> bool {
        match self.jobs.try_send(payload) {
            Ok(()) => true,
            Err(_) => {
                trace!("audio queue full, dropping chunk");
                false
            }
        }
    }

    /// Stop accepting audio and wait for the workers to drain the queue.
    pub fn shutdown(self) {
        drop(self.jobs);
        for worker in self.workers {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{HubConfig, hub};
    use crate::sinks::channel_sink;
    use std::time::Duration;

    #[test]
    fn test_forwards_tagged_audio() {
        let (hub, handle) = hub(&HubConfig::default());
        let hub_thread = thread::spawn(move || hub.run());
        let (sink, rx) = channel_sink(16);
        handle.register(sink).unwrap();

        let audio = AudioForwarder::spawn(2, 8, handle.clone()).unwrap();
        assert!(audio.forward(Bytes::from_static(b"\x01\x02")));
        assert!(audio.forward(Bytes::from_static(b"\x03")));
        audio.shutdown();

        let mut got = vec![
            rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            rx.recv_timeout(Duration::from_secs(2)).unwrap(),
        ];
        got.sort();
        assert_eq!(got, vec![Bytes::from_static(b"O \x01\x02"), Bytes::from_static(b"O \x03")]);

        handle.stop().unwrap();
        hub_thread.join().unwrap();
    }
}
