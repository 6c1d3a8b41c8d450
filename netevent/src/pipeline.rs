use std::sync::Arc;

use netevent_userspace_common::{EventRecord, EventSink};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Forwards drained records to the sink until every sender is gone, then
/// flushes it.
pub async fn run_sink(mut rx: mpsc::Receiver<EventRecord>, sink: Arc<dyn EventSink>) -> u64 {
    let mut emitted = 0;

    while let Some(record) = rx.recv().await {
        match sink.emit(&record).await {
            Ok(()) => emitted += 1,
            Err(e) => warn!("failed to emit record {}: {:#}", record.seq, e),
        }
    }

    if let Err(e) = sink.flush().await {
        warn!("failed to flush output on shutdown: {:#}", e);
    }
    debug!(emitted, "output sink drained");

    emitted
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Error};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FlakySink {
        seen: Mutex<Vec<u64>>,
        flushes: Mutex<u32>,
    }

    #[async_trait]
    impl EventSink for FlakySink {
        async fn emit(&self, record: &EventRecord) -> Result<(), Error> {
            if record.seq == 1 {
                return Err(anyhow!("disk full"));
            }
            self.seen.lock().unwrap().push(record.seq);
            Ok(())
        }

        async fn flush(&self) -> Result<(), Error> {
            *self.flushes.lock().unwrap() += 1;
            Ok(())
        }
    }

    #[tokio::test]
    async fn keeps_going_after_emit_errors_and_flushes_once() {
        let sink = Arc::new(FlakySink::default());
        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(run_sink(rx, sink.clone()));

        for seq in 0..4 {
            tx.send(EventRecord::new(seq, Bytes::from_static(b"pkt")))
                .await
                .unwrap();
        }
        drop(tx);

        assert_eq!(handle.await.unwrap(), 3);
        assert_eq!(*sink.seen.lock().unwrap(), vec![0, 2, 3]);
        assert_eq!(*sink.flushes.lock().unwrap(), 1);
    }
}
