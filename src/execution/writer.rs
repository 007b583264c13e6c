//! Step Output Sinks
//!
//! Where steps send what they print. Command steps tee the child's streams
//! into these writers while also capturing them as outputs; `action/echo`
//! writes its message here. The default sinks are the process's own
//! stdout and stderr.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use log::warn;

/// A writer shared between every job of an action.
pub type SharedOutput = Arc<Mutex<dyn Write + Send>>;

/// Wraps `writer` so it can be shared across jobs.
pub fn shared<W: Write + Send + 'static>(writer: W) -> SharedOutput {
    Arc::new(Mutex::new(writer))
}

/// The stdout and stderr sinks of an action run.
#[derive(Clone)]
pub struct Writers {
    stdout: SharedOutput,
    stderr: SharedOutput,
}

impl Writers {
    pub fn new(stdout: SharedOutput, stderr: SharedOutput) -> Self {
        Self { stdout, stderr }
    }

    /// Sinks writing to the process's stdout and stderr.
    pub fn stdio() -> Self {
        Self::new(shared(io::stdout()), shared(io::stderr()))
    }

    pub fn stdout(&self) -> &SharedOutput {
        &self.stdout
    }

    pub fn stderr(&self) -> &SharedOutput {
        &self.stderr
    }

    pub fn set_stdout(&mut self, stdout: SharedOutput) {
        self.stdout = stdout;
    }

    pub fn set_stderr(&mut self, stderr: SharedOutput) {
        self.stderr = stderr;
    }

    pub fn write_stdout(&self, bytes: &[u8]) {
        write_to(&self.stdout, bytes);
    }

    pub fn write_stderr(&self, bytes: &[u8]) {
        write_to(&self.stderr, bytes);
    }
}

/// Writes and flushes `bytes`. A failing sink is logged, never fatal.
pub fn write_to(target: &SharedOutput, bytes: &[u8]) {
    let mut writer = target.lock().unwrap_or_else(PoisonError::into_inner);
    if let Err(e) = writer.write_all(bytes).and_then(|()| writer.flush()) {
        warn!("Failed to write step output: {}", e);
    }
}

impl Default for Writers {
    fn default() -> Self {
        Self::stdio()
    }
}

impl fmt::Debug for Writers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Writers").finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// In-memory sink whose contents stay readable after it is shared.
    #[derive(Clone, Default)]
    pub(crate) struct Buffer(pub(crate) Arc<Mutex<Vec<u8>>>);

    impl Buffer {
        pub(crate) fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_writes_reach_each_sink() {
        let out = Buffer::default();
        let err = Buffer::default();
        let writers = Writers::new(shared(out.clone()), shared(err.clone()));

        writers.write_stdout(b"to stdout\n");
        writers.write_stderr(b"to stderr\n");
        writers.clone().write_stdout(b"again\n");

        assert_eq!(out.contents(), "to stdout\nagain\n");
        assert_eq!(err.contents(), "to stderr\n");
    }

    #[test]
    fn test_failing_sink_is_not_fatal() {
        let mut writers = Writers::stdio();
        writers.set_stdout(shared(Broken));
        writers.write_stdout(b"dropped");
    }
}
