//! Upload progress events
//!
//! Events fire synchronously with the transfer, in transfer order, so a
//! caller can render progress without polling. The sink runs on the upload
//! task; a slow sink slows the upload.

/// One step of an upload, reported just before the step runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadEvent {
    /// Hashing finished; the session request is about to go out.
    CreatingSession,
    /// First transfer attempt for a chunk is about to start.
    ChunkStarted { sequence: u64, total: u64 },
    /// A retry for a chunk is about to start. `attempt` counts retries
    /// from 1.
    ChunkRetried { sequence: u64, total: u64, attempt: u32 },
    /// All chunks sent; cross-checking against the server's part list.
    Verifying { total: u64 },
    /// Signalling end-of-upload to the server.
    Completing,
}

/// Receiver for upload progress events
pub trait ProgressSink: Send {
    /// Called once per event, synchronously with the transfer
    fn on_event(&mut self, event: UploadEvent);
}

impl<F> ProgressSink for F
where
    F: FnMut(UploadEvent) + Send,
{
    fn on_event(&mut self, event: UploadEvent) {
        self(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_is_a_sink() {
        let mut seen = Vec::new();
        {
            let mut sink = |event: UploadEvent| seen.push(event);
            let sink: &mut dyn ProgressSink = &mut sink;
            sink.on_event(UploadEvent::CreatingSession);
            sink.on_event(UploadEvent::ChunkStarted {
                sequence: 1,
                total: 3,
            });
        }
        assert_eq!(
            seen,
            vec![
                UploadEvent::CreatingSession,
                UploadEvent::ChunkStarted {
                    sequence: 1,
                    total: 3
                }
            ]
        );
    }
}
