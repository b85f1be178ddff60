use std::thread;

use bytes::Bytes;
use vitahub_engine::{HubConfig, channel_sink, hub};

#[test]
fn test_slow_client_evicted_without_stalling_others() {
    let (hub_actor, handle) = hub(&HubConfig::default());
    let hub_thread = thread::spawn(move || hub_actor.run());

    let (fast, fast_rx) = channel_sink(4);
    let (slow, slow_rx) = channel_sink(1);
    handle.register(fast).unwrap();
    handle.register(slow).unwrap();

    handle.broadcast(Bytes::from_static(b"F 1\x01\x00")).unwrap();
    // slow never reads, so its single slot is still taken
    handle.broadcast(Bytes::from_static(b"F 1\x02\x00")).unwrap();
    handle.broadcast(Bytes::from_static(b"F 1\x03\x00")).unwrap();

    assert_eq!(handle.members().unwrap(), vec![fast_rx.id()]);

    assert_eq!(fast_rx.recv().unwrap(), Bytes::from_static(b"F 1\x01\x00"));
    assert_eq!(fast_rx.recv().unwrap(), Bytes::from_static(b"F 1\x02\x00"));
    assert_eq!(fast_rx.recv().unwrap(), Bytes::from_static(b"F 1\x03\x00"));

    // the evicted client keeps what it had and then sees its path closed
    assert_eq!(slow_rx.recv().unwrap(), Bytes::from_static(b"F 1\x01\x00"));
    assert_eq!(slow_rx.recv(), None);

    handle.stop().unwrap();
    hub_thread.join().unwrap();
}

#[test]
fn test_stop_closes_every_client() {
    let (hub_actor, handle) = hub(&HubConfig::default());
    let hub_thread = thread::spawn(move || hub_actor.run());

    let (a, a_rx) = channel_sink(4);
    let (b, b_rx) = channel_sink(4);
    handle.register(a).unwrap();
    handle.register(b).unwrap();
    handle.broadcast(Bytes::from_static(b"O \x00")).unwrap();
    handle.stop().unwrap();
    hub_thread.join().unwrap();

    assert_eq!(a_rx.recv().unwrap(), Bytes::from_static(b"O \x00"));
    assert_eq!(a_rx.recv(), None);
    assert_eq!(b_rx.recv().unwrap(), Bytes::from_static(b"O \x00"));
    assert_eq!(b_rx.recv(), None);
    assert!(handle.broadcast(Bytes::from_static(b"O \x01")).is_err());
}
