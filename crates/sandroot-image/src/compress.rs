//! Lazy gzip compression through a bounded pipe.
//!
//! A background thread reads the uncompressed input, gzips it, and hands
//! compressed chunks to the consumer over a bounded channel:
//! - the producer blocks once the channel is full, until the consumer reads;
//! - a producer failure is delivered to the consumer as a read error;
//! - normal completion ends the stream with EOF.

use std::io::{self, BufWriter, Read, Write};
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};

use flate2::Compression;
use flate2::write::GzEncoder;
use sandroot_common::constants::{COMPRESSION_BUF_SIZE, COMPRESSION_PIPE_DEPTH};

enum Chunk {
    Data(Vec<u8>),
    Done,
    Failed(io::Error),
}

/// Producer half: every write becomes one chunk on the channel.
struct PipeWriter {
    tx: SyncSender<Chunk>,
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx
            .send(Chunk::Data(buf.to_vec()))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "compressed stream closed"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Consumer half of the compression pipe.
pub struct CompressedStream {
    rx: Receiver<Chunk>,
    pending: Vec<u8>,
    pos: usize,
    failure: Option<(io::ErrorKind, String)>,
    finished: bool,
}

impl std::fmt::Debug for CompressedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressedStream")
            .field("buffered", &(self.pending.len() - self.pos))
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl Read for CompressedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.pos < self.pending.len() {
                let n = buf.len().min(self.pending.len() - self.pos);
                buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }
            if let Some((kind, message)) = &self.failure {
                return Err(io::Error::new(*kind, message.clone()));
            }
            if self.finished {
                return Ok(0);
            }
            match self.rx.recv() {
                Ok(Chunk::Data(data)) => {
                    self.pending = data;
                    self.pos = 0;
                }
                Ok(Chunk::Done) => self.finished = true,
                Ok(Chunk::Failed(e)) => {
                    tracing::debug!(error = %e, "compression failed");
                    self.failure = Some((e.kind(), e.to_string()));
                }
                Err(_) => {
                    self.failure = Some((
                        io::ErrorKind::UnexpectedEof,
                        "compression task exited before completing".into(),
                    ));
                }
            }
        }
    }
}

/// Returns a gzip-compressed view of `input`, produced on a background thread.
///
/// # Errors
///
/// Returns an error if the background thread cannot be spawned.
pub fn compress<R>(input: R) -> io::Result<CompressedStream>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = sync_channel(COMPRESSION_PIPE_DEPTH);
    let producer_tx = tx.clone();

    let _handle = std::thread::Builder::new()
        .name("sandroot-compress".into())
        .spawn(move || {
            let outcome = produce(input, producer_tx);
            let last = match outcome {
                Ok(()) => Chunk::Done,
                Err(e) => Chunk::Failed(e),
            };
            // The consumer may already be gone; nothing left to tell it.
            let _ = tx.send(last);
        })?;

    Ok(CompressedStream {
        rx,
        pending: Vec::new(),
        pos: 0,
        failure: None,
        finished: false,
    })
}

fn produce<R: Read>(mut input: R, tx: SyncSender<Chunk>) -> io::Result<()> {
    let writer = BufWriter::with_capacity(COMPRESSION_BUF_SIZE, PipeWriter { tx });
    let mut encoder = GzEncoder::new(writer, Compression::default());
    let _ = io::copy(&mut input, &mut encoder)?;
    let writer = encoder.finish()?;
    let _ = writer.into_inner().map_err(io::IntoInnerError::into_error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use flate2::read::GzDecoder;

    use super::*;

    fn decompress(stream: impl Read) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        let _ = GzDecoder::new(stream).read_to_end(&mut out)?;
        Ok(out)
    }

    /// Deterministic, poorly compressible bytes.
    fn noise(len: usize) -> Vec<u8> {
        let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                state.to_le_bytes()[0]
            })
            .collect()
    }

    struct CountingReader {
        inner: io::Cursor<Vec<u8>>,
        consumed: Arc<AtomicUsize>,
    }

    impl Read for CountingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.inner.read(buf)?;
            let _ = self.consumed.fetch_add(n, Ordering::SeqCst);
            Ok(n)
        }
    }

    struct FailingReader {
        served: bool,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.served {
                return Err(io::Error::other("source went away"));
            }
            self.served = true;
            let n = buf.len().min(16);
            buf[..n].fill(b'x');
            Ok(n)
        }
    }

    #[test]
    fn compressed_stream_decodes_to_input() {
        let input = b"hello from the compression pipe".repeat(1000);
        let stream = compress(io::Cursor::new(input.clone())).expect("spawn");
        assert_eq!(decompress(stream).expect("decode"), input);
    }

    #[test]
    fn empty_input_yields_valid_gzip() {
        let stream = compress(io::empty()).expect("spawn");
        assert!(decompress(stream).expect("decode").is_empty());
    }

    #[test]
    fn producer_error_reaches_consumer() {
        let mut stream = compress(FailingReader { served: false }).expect("spawn");
        let mut sink = Vec::new();
        let err = stream.read_to_end(&mut sink).expect_err("must fail");
        assert!(err.to_string().contains("source went away"));

        let again = stream.read(&mut [0u8; 8]).expect_err("error is sticky");
        assert_eq!(again.kind(), err.kind());
    }

    #[test]
    fn producer_blocks_until_consumer_drains() {
        let total = 8 * 1024 * 1024;
        let input = noise(total);
        let consumed = Arc::new(AtomicUsize::new(0));
        let reader = CountingReader {
            inner: io::Cursor::new(input.clone()),
            consumed: Arc::clone(&consumed),
        };

        let stream = compress(reader).expect("spawn");
        std::thread::sleep(Duration::from_millis(200));
        assert!(consumed.load(Ordering::SeqCst) < total / 2);

        assert_eq!(decompress(stream).expect("decode"), input);
        assert_eq!(consumed.load(Ordering::SeqCst), total);
    }
}
