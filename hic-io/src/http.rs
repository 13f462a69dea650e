use std::io::{BufReader, Error, ErrorKind, Read, Result, Seek, SeekFrom};

use reqwest::{blocking::Client, IntoUrl, Url};

use crate::source::{ByteSource, SourceHandle};

/// Bytes fetched with the first request; every container is parsed from its head
const PREFETCH_SIZE: u64 = 16384;
const READ_BUFFER_SIZE: usize = 64 * 1024;

fn other_err<E: std::error::Error + Sync + Send + 'static>(e: E) -> Error {
    Error::new(ErrorKind::Other, e)
}

/// Parse the total length out of a `Content-Range: bytes a-b/total` header
fn total_length(content_range: &str) -> Result<u64> {
    content_range
        .rsplit('/')
        .next()
        .and_then(|t| t.trim().parse().ok())
        .ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidData,
                format!("Malformed content-range header {:?}", content_range),
            )
        })
}

/// One cursor over a remote object. Each `read` becomes one range request, except for
/// reads inside the prefetched head.
struct RangeReader {
    client: Client,
    url: Url,
    length: u64,
    cursor: u64,
    head: Vec<u8>,
}

impl RangeReader {
    fn connect(client: Client, url: Url) -> Result<Self> {
        let mut response = client
            .get(url.clone())
            .header("range", format!("bytes=0-{}", PREFETCH_SIZE - 1))
            .send()
            .map_err(other_err)?;
        if !response.status().is_success() {
            return Err(Error::new(
                ErrorKind::Other,
                format!("HTTP status {} for {}", response.status(), url),
            ));
        }
        let content_range = response
            .headers()
            .get("content-range")
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());
        let mut head = vec![];
        response.read_to_end(&mut head)?;
        // no content-range: the server ignored the range and sent the whole object
        let length = match content_range {
            Some(text) => total_length(&text)?,
            None => head.len() as u64,
        };
        log::debug!("Connected to {} ({} bytes)", url, length);
        Ok(Self {
            client,
            url,
            length,
            cursor: 0,
            head,
        })
    }

    fn fetch(&self, from: u64, buf: &mut [u8]) -> Result<usize> {
        let to = from + buf.len() as u64 - 1;
        log::debug!("HTTP range {}-{} of {}", from, to, self.url);
        let mut response = self
            .client
            .get(self.url.clone())
            .header("range", format!("bytes={}-{}", from, to))
            .send()
            .map_err(other_err)?;
        let mut filled = 0;
        while filled < buf.len() {
            match response.read(&mut buf[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        Ok(filled)
    }
}

impl Read for RangeReader {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || self.cursor >= self.length {
            return Ok(0);
        }
        let wanted = (self.length - self.cursor).min(buf.len() as u64) as usize;
        let buf = &mut buf[..wanted];
        let read = if self.cursor < self.head.len() as u64 {
            let start = self.cursor as usize;
            let n = wanted.min(self.head.len() - start);
            buf[..n].copy_from_slice(&self.head[start..start + n]);
            n
        } else {
            self.fetch(self.cursor, buf)?
        };
        self.cursor += read as u64;
        Ok(read)
    }
}

impl Seek for RangeReader {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let target = match pos {
            SeekFrom::Start(pos) => Some(pos),
            SeekFrom::Current(delta) => self.cursor.checked_add_signed(delta),
            SeekFrom::End(delta) => self.length.checked_add_signed(delta),
        };
        self.cursor = target
            .ok_or_else(|| Error::new(ErrorKind::InvalidInput, "Seek before start"))?;
        Ok(self.cursor)
    }
}

/// A remote container served over HTTP(S) with range request support. Every handle
/// is its own connection and cursor.
pub struct HttpSource {
    client: Client,
    url: Url,
}

impl HttpSource {
    pub fn new<U: IntoUrl>(url: U) -> Result<Self> {
        Ok(Self {
            client: Client::new(),
            url: url.into_url().map_err(other_err)?,
        })
    }
}

impl ByteSource for HttpSource {
    fn open(&self) -> Result<SourceHandle> {
        let reader = RangeReader::connect(self.client.clone(), self.url.clone())?;
        Ok(Box::new(BufReader::with_capacity(READ_BUFFER_SIZE, reader)))
    }

    fn describe(&self) -> String {
        self.url.to_string()
    }
}
