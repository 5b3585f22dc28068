use std::time::Duration;

/// One observation per frame write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterStat {
    /// Event name of the frame (`hunk`, `done`, or `error` for an abort).
    pub event: String,
    /// Bytes handed to the response body. Zero when the write failed.
    pub bytes: usize,
    /// Time since the previous write completed, or since the writer was opened.
    pub duration: Duration,
    pub error: Option<String>,
}

/// Side-channel observer of frame writes.
///
/// Called synchronously, in write order, before the write returns. It cannot fail the
/// stream: a panicking hook is caught and ignored by the writer.
pub trait StatHook: Send + Sync {
    fn observe(&self, stat: &WriterStat);
}

impl<F> StatHook for F
where
    F: Fn(&WriterStat) + Send + Sync,
{
    fn observe(&self, stat: &WriterStat) {
        self(stat)
    }
}

/// Hook that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHook;

impl StatHook for NoopHook {
    fn observe(&self, _stat: &WriterStat) {}
}
