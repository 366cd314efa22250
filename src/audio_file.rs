//! Buffered reader over a streaming HTTP download.
//!
//! Internet radio streams have no end and usually no `Content-Length`. The
//! download runs in the background through `stream-download` while the
//! decoder reads from the front through a 32 KiB buffer. Files of known
//! length spill to a temporary file. Live streams go through a fixed-size
//! ring buffer instead, so storage does not grow while a station plays.

use std::{
    io::{BufReader, Read, Seek},
    num::NonZeroUsize,
};

use stream_download::{
    http::HttpStream,
    source::SourceStream,
    storage::{adaptive::AdaptiveStorageProvider, temp::TempStorageProvider},
    Settings, StreamDownload,
};
use url::Url;

use crate::error::Result;

/// Combines `Read` and `Seek` with the thread-safety rodio's decoder needs.
pub trait ReadSeek: Read + Seek + Send + Sync {}

impl<T: Read + Seek + Send + Sync> ReadSeek for T {}

/// Read buffer size, matching Symphonia's largest sequential read.
pub const BUFFER_LEN: usize = 32 * 1024;

/// Bytes to download before the decoder may start probing. Roughly three
/// seconds of a 128 kbps stream.
pub const PREFETCH_BYTES: u64 = 48 * 1024;

/// Storage kept for a live stream. Must hold the prefetch with room to spare,
/// or the download waits on a reader that is itself waiting for the prefetch.
pub const LIVE_BUFFER_BYTES: NonZeroUsize = match NonZeroUsize::new(512 * 1024) {
    Some(len) => len,
    None => panic!("live buffer must not be empty"),
};

pub struct AudioFile {
    inner: Box<dyn ReadSeek>,

    /// Known for on-demand files, `None` for live streams.
    byte_len: Option<u64>,
}

impl AudioFile {
    /// Connects to `url` and starts the background download.
    ///
    /// Returns once the response headers have arrived and the prefetch
    /// buffer is filled, not when the download completes.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails or the server responds with
    /// a non-success status.
    pub async fn open(client: reqwest::Client, url: Url) -> Result<Self> {
        let stream = HttpStream::new(client, url.clone()).await?;

        let byte_len = stream.content_length();
        match byte_len {
            Some(len) => debug!("streaming {len} bytes from {url}"),
            None => debug!("streaming live from {url}"),
        }

        // Bounded when the stream reports no length, temporary file otherwise.
        let storage =
            AdaptiveStorageProvider::new(TempStorageProvider::default(), LIVE_BUFFER_BYTES);
        let download = StreamDownload::from_stream(
            stream,
            storage,
            Settings::default().prefetch_bytes(PREFETCH_BYTES),
        )
        .await?;

        Ok(Self {
            inner: Box::new(BufReader::with_capacity(BUFFER_LEN, download)),
            byte_len,
        })
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.byte_len.is_none()
    }
}

impl Read for AudioFile {
    #[inline]
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for AudioFile {
    #[inline]
    fn seek(&mut self, pos: std::io::SeekFrom) -> std::io::Result<u64> {
        self.inner.seek(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_buffer_outgrows_prefetch() {
        let live = u64::try_from(LIVE_BUFFER_BYTES.get()).unwrap();
        assert!(live >= 4 * PREFETCH_BYTES);
        assert!(live >= 4 * BUFFER_LEN as u64);
    }
}
