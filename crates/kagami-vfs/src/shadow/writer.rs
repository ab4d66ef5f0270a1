use std::fmt;
use std::fs;
use std::io::{self, BufWriter, Write};

/// Writes to the backend and mirrors every accepted byte into the shadow.
///
/// The backend sees each write first; the shadow only receives what the
/// backend accepted. Once the shadow fails it is detached and the backend
/// keeps going alone, so the byte counts reported to callers always match
/// what the backend took. A detached shadow is stale until refreshed.
pub struct MirrorWriter {
    backend: Box<dyn Write + Send>,
    shadow: Option<BufWriter<fs::File>>,
}

impl fmt::Debug for MirrorWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MirrorWriter")
            .field("mirroring", &self.is_mirroring())
            .finish_non_exhaustive()
    }
}

impl MirrorWriter {
    pub(crate) fn new(backend: Box<dyn Write + Send>, shadow: fs::File, buffer_size: usize) -> Self {
        Self {
            backend,
            shadow: Some(BufWriter::with_capacity(buffer_size, shadow)),
        }
    }

    /// Whether the shadow still receives writes.
    pub fn is_mirroring(&self) -> bool {
        self.shadow.is_some()
    }

    /// Flush both sides and close them, reporting a backend failure.
    pub fn finish(mut self) -> io::Result<()> {
        self.flush()
    }

    fn mirror(&mut self, op: impl FnOnce(&mut BufWriter<fs::File>) -> io::Result<()>) {
        let Some(shadow) = self.shadow.as_mut() else {
            return;
        };
        if let Err(e) = op(shadow) {
            tracing::warn!(error = %e, "shadow mirror failed, backend continues alone");
            self.shadow = None;
        }
    }
}

impl Write for MirrorWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.backend.write(buf)?;
        self.mirror(|shadow| shadow.write_all(&buf[..n]));
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.backend.flush()?;
        self.mirror(|shadow| shadow.flush());
        Ok(())
    }
}

impl Drop for MirrorWriter {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::debug!(error = %e, "mirror writer flush on drop failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    /// Backend that records everything it accepts.
    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<u8>>>);

    impl Write for Recorder {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_mirrors_accepted_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shadow");
        let backend = Recorder::default();

        let mut writer = MirrorWriter::new(Box::new(backend.clone()), fs::File::create(&path).unwrap(), 4);
        writer.write_all(b"hello mirror").unwrap();
        writer.finish().unwrap();

        assert_eq!(&*backend.0.lock(), b"hello mirror");
        assert_eq!(fs::read(&path).unwrap(), b"hello mirror");
    }

    #[test]
    fn test_shadow_failure_does_not_repeat_backend_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shadow");
        fs::write(&path, b"").unwrap();
        // Opened read-only, so every shadow write fails.
        let shadow = fs::File::open(&path).unwrap();
        let backend = Recorder::default();

        let mut writer = MirrorWriter::new(Box::new(backend.clone()), shadow, 1);
        assert_eq!(writer.write(b"first").unwrap(), 5);
        assert!(!writer.is_mirroring());
        writer.write_all(b" second").unwrap();
        writer.finish().unwrap();

        assert_eq!(&*backend.0.lock(), b"first second");
    }
}
