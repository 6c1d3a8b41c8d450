//! End-to-end behaviour of the capture hook feeding an in-process channel.

use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use netevent_ebpf_common::{
    Error, EventContext, EventHook, NetEventMonitor, HOOK_FAILURE, HOOK_SUCCESS,
};
use netevent_userspace_common::EventChannel;

fn hook_publish(channel: &EventChannel, payload: &[u8]) -> i32 {
    let monitor = NetEventMonitor::new(channel);
    let ctx = EventContext::from_slice(payload);
    unsafe { monitor.on_event(&ctx) }
}

fn drain(channel: &EventChannel) -> Vec<Vec<u8>> {
    channel.consume().map(|r| r.to_vec()).collect()
}

// ---- hook into channel ----

#[test]
fn published_span_is_consumed_byte_for_byte() {
    let channel = EventChannel::with_capacity(1024).unwrap();
    let payload: Vec<u8> = (0..100u8).map(|b| b.wrapping_mul(37)).collect();

    assert_eq!(hook_publish(&channel, &payload), HOOK_SUCCESS);

    let records = drain(&channel);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0], payload);
}

#[test]
fn oversized_record_overflows_and_leaves_channel_empty() {
    let channel = EventChannel::with_capacity(100).unwrap();
    let payload = [0x5Au8; 150];

    assert_eq!(hook_publish(&channel, &payload), HOOK_FAILURE);
    assert!(drain(&channel).is_empty());
    assert_eq!(channel.overflow_count(), 1);
}

#[test]
fn zero_length_span_is_rejected_without_counting_overflow() {
    let channel = EventChannel::with_capacity(64).unwrap();
    let data = [1u8; 8];
    let start = data.as_ptr();
    let ctx = EventContext::new(start, start);
    let monitor = NetEventMonitor::new(&channel);

    assert_eq!(unsafe { monitor.on_event(&ctx) }, HOOK_FAILURE);
    assert!(drain(&channel).is_empty());
    assert_eq!(channel.stats().published, 0);
    assert_eq!(channel.overflow_count(), 0);
}

#[test]
fn exact_fill_overflows_until_consumer_reclaims() {
    let channel = EventChannel::with_capacity(100).unwrap();
    for (i, size) in [40usize, 30, 20, 10].into_iter().enumerate() {
        assert_eq!(hook_publish(&channel, &vec![i as u8; size]), HOOK_SUCCESS);
    }
    assert_eq!(channel.stats().unread_bytes, 100);

    assert_eq!(hook_publish(&channel, &[0xEE]), HOOK_FAILURE);
    assert_eq!(channel.overflow_count(), 1);

    let drained = drain(&channel);
    assert_eq!(
        drained.iter().map(Vec::len).collect::<Vec<_>>(),
        vec![40, 30, 20, 10]
    );

    assert_eq!(hook_publish(&channel, &[0xEE]), HOOK_SUCCESS);
    assert_eq!(drain(&channel), vec![vec![0xEE]]);
}

// ---- invalid descriptors ----

#[test]
fn invalid_descriptors_leave_existing_records_alone() {
    let channel = EventChannel::with_capacity(64).unwrap();
    assert_eq!(hook_publish(&channel, b"kept"), HOOK_SUCCESS);

    let data = [9u8; 4];
    let range = data.as_ptr_range();
    let monitor = NetEventMonitor::new(&channel);
    let bad = [
        EventContext::new(ptr::null(), range.end),
        EventContext::new(range.start, ptr::null()),
        EventContext::new(range.end, range.start),
    ];
    for ctx in &bad {
        assert_eq!(unsafe { monitor.on_event(ctx) }, HOOK_FAILURE);
    }
    assert_eq!(unsafe { monitor.on_event(ptr::null()) }, HOOK_FAILURE);

    assert_eq!(drain(&channel), vec![b"kept".to_vec()]);
}

#[test]
fn overflow_keeps_unread_records_intact() {
    let channel = EventChannel::with_capacity(10).unwrap();
    channel.publish(b"first").unwrap();
    channel.publish(b"2nd").unwrap();
    assert_eq!(channel.publish(b"toolong"), Err(Error::Overflow));

    assert_eq!(drain(&channel), vec![b"first".to_vec(), b"2nd".to_vec()]);
}

#[test]
fn later_consumer_sees_oldest_retained_records() {
    let channel = EventChannel::with_capacity(64).unwrap();
    channel.publish(b"early").unwrap();

    let late = thread::scope(|s| s.spawn(|| drain(&channel)).join().unwrap());
    assert_eq!(late, vec![b"early".to_vec()]);
    assert!(drain(&channel).is_empty());
}

// ---- concurrency ----

fn numbered(seq: u32) -> Vec<u8> {
    // 4-byte sequence number followed by a length derived from it
    let mut record = seq.to_le_bytes().to_vec();
    record.extend(std::iter::repeat((seq % 251) as u8).take((seq % 61) as usize + 1));
    record
}

fn check_numbered(record: &[u8]) -> u32 {
    let seq = u32::from_le_bytes(record[..4].try_into().unwrap());
    assert_eq!(record, numbered(seq).as_slice(), "record {seq} was torn");
    seq
}

#[test]
fn concurrent_consumers_get_each_record_once_in_order() {
    const EVENTS: u32 = 20_000;
    let channel = &EventChannel::with_capacity(4096).unwrap();
    let done = &AtomicBool::new(false);

    let (delivered, per_consumer) = thread::scope(|s| {
        let consumers: Vec<_> = (0..3)
            .map(|_| {
                s.spawn(move || {
                    let mut seen = Vec::new();
                    loop {
                        let finished = done.load(Ordering::Acquire);
                        seen.extend(channel.consume().map(|r| check_numbered(&r)));
                        if finished {
                            // one last poll after the producer stopped
                            seen.extend(channel.consume().map(|r| check_numbered(&r)));
                            break;
                        }
                        thread::yield_now();
                    }
                    seen
                })
            })
            .collect();

        let mut delivered = Vec::new();
        for seq in 0..EVENTS {
            let record = numbered(seq);
            // overflow just drops the event
            if hook_publish(channel, &record) == HOOK_SUCCESS {
                delivered.push(seq);
            }
        }
        done.store(true, Ordering::Release);

        let per_consumer: Vec<Vec<u32>> =
            consumers.into_iter().map(|c| c.join().unwrap()).collect();
        (delivered, per_consumer)
    });

    for seen in &per_consumer {
        assert!(seen.windows(2).all(|w| w[0] < w[1]), "consumer saw reordering");
    }
    let mut all: Vec<u32> = per_consumer.into_iter().flatten().collect();
    all.sort_unstable();
    assert_eq!(all, delivered);

    let stats = channel.stats();
    assert_eq!(stats.published as usize, delivered.len());
    assert_eq!(stats.overflows as usize, EVENTS as usize - delivered.len());
    assert_eq!(stats.unread_bytes, 0);
}

#[test]
fn producer_may_move_between_threads() {
    let channel = &EventChannel::with_capacity(256).unwrap();
    thread::scope(|s| {
        for part in [b"from-a".as_slice(), b"from-b".as_slice()] {
            s.spawn(move || channel.publish(part).unwrap())
                .join()
                .unwrap();
        }
    });
    assert_eq!(drain(channel), vec![b"from-a".to_vec(), b"from-b".to_vec()]);
}
