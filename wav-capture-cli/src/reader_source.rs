use std::io::{self, Read};

use wav_capture_core::{AudioSource, CaptureError, ReadOutcome};

/// Raw s16le mono PCM from any byte stream (stdin, a pipe, a file).
///
/// Blocks are always whole frames: an odd trailing byte is held back until
/// its partner arrives, and dropped if the stream ends first.
pub struct ReaderSource<R> {
    label: String,
    reader: R,
    pending: Option<u8>,
    eof: bool,
}

impl<R: Read + Send> ReaderSource<R> {
    pub fn new(label: impl Into<String>, reader: R) -> Self {
        Self {
            label: label.into(),
            reader,
            pending: None,
            eof: false,
        }
    }

    /// Fill `buffer` until it is full or the stream ends.
    fn fill(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        if let Some(byte) = self.pending.take() {
            buffer[0] = byte;
            filled = 1;
        }
        while filled < buffer.len() && !self.eof {
            match self.reader.read(&mut buffer[filled..]) {
                Ok(0) => self.eof = true,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

impl<R: Read + Send> AudioSource for ReaderSource<R> {
    fn description(&self) -> String {
        self.label.clone()
    }

    fn open(&mut self, sample_rate: u32) -> Result<usize, CaptureError> {
        if sample_rate == 0 {
            return Err(CaptureError::DeviceUnavailable("sample rate must be positive".into()));
        }
        // 100 ms of audio per read.
        let frames = (sample_rate as usize / 10).max(1);
        Ok(frames * 2)
    }

    fn read_block(&mut self, buffer: &mut [u8]) -> Result<ReadOutcome, CaptureError> {
        if buffer.is_empty() {
            return Ok(ReadOutcome::Data(0));
        }
        let filled = self
            .fill(buffer)
            .map_err(|e| CaptureError::AudioSourceError(format!("failed to read {}: {}", self.label, e)))?;

        let whole = filled - filled % 2;
        if whole < filled {
            self.pending = Some(buffer[whole]);
        }
        if whole == 0 && self.eof {
            if self.pending.take().is_some() {
                log::debug!("Dropping trailing half frame from {}", self.label);
            }
            return Ok(ReadOutcome::EndOfStream);
        }
        Ok(ReadOutcome::Data(whole))
    }

    fn close(&mut self) -> Result<(), CaptureError> {
        log::debug!("Closed {}", self.label);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hands out at most `chunk` bytes per `read` call.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        chunk: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.chunk.min(buf.len()).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    fn drain<R: Read + Send>(source: &mut ReaderSource<R>, block: usize) -> Vec<Vec<u8>> {
        let mut blocks = Vec::new();
        let mut buffer = vec![0u8; block];
        while let ReadOutcome::Data(n) = source.read_block(&mut buffer).unwrap() {
            blocks.push(buffer[..n].to_vec());
        }
        blocks
    }

    #[test]
    fn short_reads_are_gathered_into_full_blocks() {
        let data: Vec<u8> = (0..20).collect();
        let mut source = ReaderSource::new(
            "trickle",
            Trickle {
                data: data.clone(),
                pos: 0,
                chunk: 3,
            },
        );

        let blocks = drain(&mut source, 8);
        assert_eq!(blocks.iter().map(Vec::len).collect::<Vec<_>>(), vec![8, 8, 4]);
        assert_eq!(blocks.concat(), data);
    }

    #[test]
    fn odd_trailing_byte_is_dropped() {
        let data: Vec<u8> = (0..7).collect();
        let mut source = ReaderSource::new("odd", io::Cursor::new(data));

        let blocks = drain(&mut source, 4);
        assert_eq!(blocks.concat(), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn odd_boundary_carries_into_next_block() {
        let data: Vec<u8> = (0..10).collect();
        let mut source = ReaderSource::new("cursor", io::Cursor::new(data.clone()));

        // a 5-byte buffer yields 4 whole bytes and carries the fifth
        let blocks = drain(&mut source, 5);
        assert!(blocks.iter().all(|b| b.len() % 2 == 0));
        assert_eq!(blocks.concat(), data);
    }

    #[test]
    fn open_reports_a_tenth_of_a_second() {
        let mut source = ReaderSource::new("empty", io::empty());
        assert_eq!(source.open(8000).unwrap(), 1600);
        assert!(matches!(source.open(0), Err(CaptureError::DeviceUnavailable(_))));
        assert_eq!(source.read_block(&mut [0u8; 16]).unwrap(), ReadOutcome::EndOfStream);
    }
}
