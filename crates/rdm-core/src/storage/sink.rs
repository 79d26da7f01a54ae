use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};

/// Destination of a pump.
pub trait OutputSink: Write {
    /// Position the next write at `offset`. Returns false for sinks that cannot seek.
    fn seek_to(&mut self, _offset: u64) -> io::Result<bool> {
        Ok(false)
    }

    /// Current length, if the sink has one.
    fn current_len(&mut self) -> io::Result<Option<u64>> {
        Ok(None)
    }

    /// Make sure the sink can hold `end` bytes. Never shrinks.
    fn reserve(&mut self, _end: u64) -> io::Result<()> {
        Ok(())
    }

    /// Push written data to durable storage.
    fn sync_data(&mut self) -> io::Result<()> {
        self.flush()
    }
}

impl OutputSink for File {
    fn seek_to(&mut self, offset: u64) -> io::Result<bool> {
        self.seek(SeekFrom::Start(offset))?;
        Ok(true)
    }

    fn current_len(&mut self) -> io::Result<Option<u64>> {
        Ok(Some(self.metadata()?.len()))
    }

    fn reserve(&mut self, end: u64) -> io::Result<()> {
        if self.metadata()?.len() < end {
            self.set_len(end)?;
        }
        Ok(())
    }

    fn sync_data(&mut self) -> io::Result<()> {
        File::sync_data(self)
    }
}

impl<S: OutputSink + ?Sized> OutputSink for &mut S {
    fn seek_to(&mut self, offset: u64) -> io::Result<bool> {
        (**self).seek_to(offset)
    }

    fn current_len(&mut self) -> io::Result<Option<u64>> {
        (**self).current_len()
    }

    fn reserve(&mut self, end: u64) -> io::Result<()> {
        (**self).reserve(end)
    }

    fn sync_data(&mut self) -> io::Result<()> {
        (**self).sync_data()
    }
}

/// Any `Write + Seek` (e.g. `Cursor<Vec<u8>>`) as a seekable sink.
#[derive(Debug)]
pub struct SeekableSink<W>(pub W);

impl<W: Write> Write for SeekableSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl<W: Write + Seek> OutputSink for SeekableSink<W> {
    fn seek_to(&mut self, offset: u64) -> io::Result<bool> {
        self.0.seek(SeekFrom::Start(offset))?;
        Ok(true)
    }

    fn current_len(&mut self) -> io::Result<Option<u64>> {
        let pos = self.0.stream_position()?;
        let len = self.0.seek(SeekFrom::End(0))?;
        self.0.seek(SeekFrom::Start(pos))?;
        Ok(Some(len))
    }
}

/// A forward-only writer (stdout, pipes, sockets). Bytes are appended in order.
#[derive(Debug)]
pub struct ForwardSink<W>(pub W);

impl<W: Write> Write for ForwardSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl<W: Write> OutputSink for ForwardSink<W> {}
