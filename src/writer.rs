use std::io::{Result, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::unit::ExecutionResult;

/// Shared output stream for reports.
///
/// Every call writes one complete block under the lock and flushes it, so blocks from concurrent
/// units never interleave. Blocks appear in the order units finish.
#[derive(Clone)]
pub struct ReportWriter {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl ReportWriter {
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }

    /// A writer backed by memory, plus a handle to read back what was written.
    pub fn capture() -> (Self, Captured) {
        let buffer = Captured::default();
        (Self::new(buffer.clone()), buffer)
    }

    /// Writes the attributed report block for one finished unit.
    pub fn report(&self, result: &ExecutionResult) -> Result<()> {
        self.puts(&result.report())
    }

    /// Writes `text` followed by a newline unless it already ends with one.
    pub fn puts(&self, text: &str) -> Result<()> {
        let mut guard = self.lock();
        guard.write_all(text.as_bytes())?;
        if !text.ends_with('\n') {
            guard.write_all(b"\n")?;
        }
        guard.flush()
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn Write + Send>> {
        // Poisoning is ignored.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// In-memory sink returned by `ReportWriter::capture`.
#[derive(Clone, Default, Debug)]
pub struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    pub fn contents(&self) -> String {
        let buffer = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .write(buf)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
