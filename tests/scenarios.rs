use corelink::{Channel, Config, Control, Message, SendStatus};
use std::sync::Arc;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn make_channel(id: u64, config: Config) -> Arc<Channel<u64>> {
    let master_inbox = Arc::new(Control::new(config.queue_capacity).expect("eventfd"));
    let worker_inbox = Arc::new(Control::new(config.queue_capacity).expect("eventfd"));
    let ch = Channel::new(id, config, master_inbox, worker_inbox);
    ch.open().unwrap();
    assert_eq!(ch.service_worker_control(), corelink::Event::Open);
    assert!(ch.is_worker_ready());
    ch
}

/// S1: a straightforward ping-pong of 5 messages, each request answered
/// before the next is sent.
#[test]
fn s1_ping_pong_five_messages() {
    init();
    let ch = make_channel(1, Config::default());

    for i in 1..=5u64 {
        let when = i * 1_000;
        let (status, _) = ch.send_request(Message::new(i * 10, when));
        assert_eq!(status, SendStatus::Sent);

        let req = ch.recv_request().expect("request should be queued");
        assert_eq!(req.payload, i * 10);

        let mut reply = Message::new(req.payload * 2, when + 10);
        reply.processing_time = 20;
        reply.cpu_time = 20;
        let (status, _) = ch.send_reply(reply);
        assert_eq!(status, SendStatus::Sent);

        let reply = ch.recv_reply().expect("reply should be queued");
        assert_eq!(reply.payload, i * 20);
        assert_eq!(reply.sequence, i);
    }

    let snap = ch.master_snapshot();
    assert_eq!(snap.sequence, 5);
    assert_eq!(snap.ack, 5);
    assert_eq!(snap.num_outstanding, 0);
}

/// S2: a burst of 1500 requests sent without waiting for replies, driven
/// entirely by the opportunistic drain inside `send_request` plus explicit
/// `recv_request` calls on the worker side (exercises overload and recovery
/// since the lane holds only 1024 before wrapping).
#[test]
fn s2_burst_of_fifteen_hundred_without_replies() {
    init();
    let ch = make_channel(2, Config::default());

    let mut sent = 0u64;
    let mut overloads = 0u64;
    for i in 1..=1500u64 {
        let (status, _) = ch.send_request(Message::new(i, i));
        match status {
            SendStatus::Sent => sent += 1,
            SendStatus::Overload => {
                overloads += 1;
                // Worker drains one request to make room, then the caller
                // would retry; we retry immediately here to emulate that.
                if let Some(req) = ch.recv_request() {
                    let mut reply = Message::new(req.payload, req.when);
                    reply.processing_time = 1;
                    ch.send_reply(reply);
                }
                let (status, _) = ch.send_request(Message::new(i, i));
                assert_eq!(status, SendStatus::Sent);
                sent += 1;
            }
        }
    }
    assert_eq!(sent, 1500);
    assert!(overloads > 0, "a burst of 1500 into a 1024-slot lane must overload at least once");

    // Drain whatever is left so the worker side's accounting is consistent.
    let mut drained = 0u64;
    while let Some(req) = ch.recv_request() {
        drained += 1;
        let mut reply = Message::new(req.payload, req.when);
        reply.processing_time = 1;
        ch.send_reply(reply);
    }
    while ch.recv_reply().is_some() {}
    assert!(drained > 0);
}

/// S3: the worker reports itself sleeping while a request is still
/// outstanding, triggering a re-signal from the master's control service.
#[test]
fn s3_worker_sleeps_with_work_pending() {
    init();
    let ch = make_channel(3, Config::default());

    ch.send_request(Message::new(1u64, 100));
    ch.send_request(Message::new(2u64, 200));
    // Worker only gets around to the first one before checking in sleepy.
    ch.recv_request().unwrap();
    ch.worker_sleeping().unwrap();

    let event = ch.service_master_control();
    assert_eq!(event, corelink::Event::Noop);
    assert_eq!(ch.master_snapshot().num_resignals, 1);
}

/// S4: saturate the lane, then show that the retried send both reports
/// overload and later drains a reply the worker produced in the meantime.
#[test]
fn s4_overload_with_concurrent_reply() {
    init();
    let ch = make_channel(4, Config::default());

    for i in 1..=1024u64 {
        let (status, _) = ch.send_request(Message::new(i, i));
        assert_eq!(status, SendStatus::Sent);
    }
    let (status, drained) = ch.send_request(Message::new(1025, 1025));
    assert_eq!(status, SendStatus::Overload);
    assert!(drained.is_none());

    let req = ch.recv_request().unwrap();
    let mut reply = Message::new(req.payload, req.when);
    reply.processing_time = 2;
    ch.send_reply(reply);

    let (status, drained) = ch.send_request(Message::new(1025, 1026));
    assert_eq!(status, SendStatus::Sent);
    let reply = drained.expect("concurrent reply should be drained on retry");
    assert_eq!(reply.sequence, 1);
}

/// S5: the two-sided close handshake — master initiates, worker
/// acknowledges, both control lanes see the corresponding event.
#[test]
fn s5_close_handshake() {
    init();
    let ch = make_channel(5, Config::default());
    assert!(ch.is_active());

    ch.signal_worker_close().unwrap();
    assert!(!ch.is_active());
    assert_eq!(ch.service_worker_control(), corelink::Event::Close(corelink::Role::ToWorker));

    ch.worker_ack_close().unwrap();
    assert_eq!(
        ch.service_master_control(),
        corelink::Event::Close(corelink::Role::FromWorker)
    );
}

/// S6: steady-state traffic over 10,000 messages at a pace fast enough that
/// the signal-elision heuristic should kick in and keep the signal count far
/// below the message count.
#[test]
fn s6_signal_elision_over_ten_thousand_messages() {
    init();
    let config = Config {
        signal_interval: 1_000_000,
        ..Config::default()
    };
    let ch = make_channel(6, config);

    // Keep several requests outstanding at once instead of draining to zero
    // between sends: the mandatory signal in `should_signal_worker` only
    // fires on the 0->1 "first send" edge (§4.6), so a strict one-in-one-out
    // ping-pong would hit that edge on every single message and never
    // exercise elision at all.
    let pipeline_depth = 8u64;
    let mut when = 0u64;
    let mut sent = 0u64;
    let mut received_replies = 0u64;

    for i in 1..=pipeline_depth {
        when += 100;
        let (status, _) = ch.send_request(Message::new(i, when));
        assert_eq!(status, SendStatus::Sent);
        sent += 1;
    }

    while received_replies < 10_000 {
        if let Some(req) = ch.recv_request() {
            let mut reply = Message::new(req.payload, req.when);
            reply.processing_time = 1;
            ch.send_reply(reply);
        }
        if ch.recv_reply().is_some() {
            received_replies += 1;
            if sent < 10_000 {
                when += 100;
                sent += 1;
                let (status, _) = ch.send_request(Message::new(sent, when));
                assert_eq!(status, SendStatus::Sent);
            }
        }
    }

    let snap = ch.master_snapshot();
    assert!(
        snap.num_signals < 10_000,
        "elision should suppress the overwhelming majority of signals, got {}",
        snap.num_signals
    );
}
