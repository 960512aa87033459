//! `multipart/form-data` request bodies for firmware upload.

use std::{
    io,
    path::{Path, PathBuf},
};

use tokio::{fs::File, io::AsyncReadExt};

use crate::{
    error::{ClientError, Result},
    http::HttpConnection,
    metrics,
    transport::ClientStream,
};

/// Boundary used for firmware uploads. Some models accept only this value.
pub const UPLOAD_BOUNDARY: &str = "ab0c85f4-6d89-4a7f-a0a5-115d7f43b5f1";

/// Bytes read from disk and written to the socket per step.
pub const UPLOAD_CHUNK: usize = 8 * 1024;

/// One file of a firmware upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadPart {
    path: PathBuf,
    file_name: String,
    header_block: String,
    size: u64,
}

impl UploadPart {
    /// Inspect `path` and build the part header block for it.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::UploadFile`] when the path has no file name, is
    /// not a regular file, or cannot be inspected.
    pub async fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let Some(file_name) = file_name_of(&path) else {
            return Err(upload_error(path, invalid_input("path has no file name")));
        };
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(source) => return Err(upload_error(path, source)),
        };
        if !metadata.is_file() {
            return Err(upload_error(path, invalid_input("not a regular file")));
        }
        Ok(Self {
            header_block: part_header_block(&file_name),
            file_name,
            size: metadata.len(),
            path,
        })
    }

    /// Source path.
    #[must_use]
    pub fn path(&self) -> &Path { &self.path }

    /// File name announced in `Content-Disposition`.
    #[must_use]
    pub fn file_name(&self) -> &str { &self.file_name }

    /// Part headers including the terminating blank line.
    #[must_use]
    pub fn header_block(&self) -> &str { &self.header_block }

    /// File size in bytes at inspection time.
    #[must_use]
    pub const fn size(&self) -> u64 { self.size }
}

/// Reports upload progress as a whole percentage of file bytes sent.
///
/// The callback only fires when the percentage grows, so a retried upload
/// sharing the tracker never reports a value twice. An upload with no file
/// bytes reports 100 once.
pub struct ProgressTracker<'a> {
    callback: Option<&'a mut (dyn FnMut(u8) + Send)>,
    total: u64,
    sent: u64,
    last: Option<u8>,
}

impl<'a> ProgressTracker<'a> {
    /// Track `total` file bytes.
    pub fn new(total: u64, callback: Option<&'a mut (dyn FnMut(u8) + Send)>) -> Self {
        Self {
            callback,
            total,
            sent: 0,
            last: None,
        }
    }

    /// Restart byte counting for a new attempt. Reported values stay
    /// monotonic.
    pub fn restart(&mut self) { self.sent = 0; }

    /// Account for `count` more bytes sent.
    pub fn advance(&mut self, count: u64) {
        self.sent = self.sent.saturating_add(count);
        let percent = if self.total == 0 {
            100
        } else {
            u8::try_from(self.sent.min(self.total) * 100 / self.total).unwrap_or(100)
        };
        if self.last.is_some_and(|last| percent <= last) {
            return;
        }
        self.last = Some(percent);
        if let Some(callback) = self.callback.as_deref_mut() {
            callback(percent);
        }
    }

    /// Last reported percentage.
    #[must_use]
    pub const fn last(&self) -> Option<u8> { self.last }
}

impl std::fmt::Debug for ProgressTracker<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("total", &self.total)
            .field("sent", &self.sent)
            .field("last", &self.last)
            .finish_non_exhaustive()
    }
}

/// Writes a `multipart/form-data` body whose length is known up front.
///
/// Layout: for each part a delimiter (`--boundary\r\n`, preceded by `\r\n`
/// after the first part), the part header block and the raw file bytes;
/// then the close delimiter `\r\n--boundary--\r\n`.
#[derive(Clone, Debug)]
pub struct MultipartEncoder {
    boundary: String,
    parts: Vec<UploadPart>,
}

impl MultipartEncoder {
    /// Create an encoder for `parts`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NoUploadFiles`] when `parts` is empty.
    pub fn new(boundary: impl Into<String>, parts: Vec<UploadPart>) -> Result<Self> {
        if parts.is_empty() {
            return Err(ClientError::NoUploadFiles);
        }
        Ok(Self {
            boundary: boundary.into(),
            parts,
        })
    }

    /// Parts in upload order.
    #[must_use]
    pub fn parts(&self) -> &[UploadPart] { &self.parts }

    /// Value of the request `Content-Type` header.
    #[must_use]
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Sum of all file sizes.
    #[must_use]
    pub fn file_bytes(&self) -> u64 { self.parts.iter().map(UploadPart::size).sum() }

    /// Exact number of body bytes [`write_body`](Self::write_body) produces.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use osclink::multipart::{MultipartEncoder, UploadPart};
    ///
    /// # async fn demo() -> osclink::Result<()> {
    /// let part = UploadPart::from_path("fw.bin").await?;
    /// let encoder = MultipartEncoder::new("abc123", vec![part])?;
    /// println!("Content-Length: {}", encoder.content_length());
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    pub fn content_length(&self) -> u64 {
        let parts: u64 = (0..self.parts.len())
            .map(|index| self.preamble(index).len() as u64 + self.parts[index].size)
            .sum();
        parts + self.close_delimiter().len() as u64
    }

    fn preamble(&self, index: usize) -> String {
        let separator = if index == 0 { "" } else { "\r\n" };
        format!(
            "{separator}--{}\r\n{}",
            self.boundary, self.parts[index].header_block
        )
    }

    fn close_delimiter(&self) -> String { format!("\r\n--{}--\r\n", self.boundary) }

    /// Stream the body to `conn`, reading each file in [`UPLOAD_CHUNK`]
    /// pieces. Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::UploadFile`] when a file cannot be read or its
    /// size changed since inspection, and propagates write failures.
    pub async fn write_body<S: ClientStream>(
        &self,
        conn: &mut HttpConnection<S>,
        progress: &mut ProgressTracker<'_>,
    ) -> Result<u64> {
        let mut written = 0u64;
        let mut chunk = vec![0u8; UPLOAD_CHUNK];
        for (index, part) in self.parts.iter().enumerate() {
            let preamble = self.preamble(index);
            conn.write_all(preamble.as_bytes()).await?;
            written += preamble.len() as u64;

            let mut file = File::open(&part.path)
                .await
                .map_err(|source| upload_error(part.path.clone(), source))?;
            let mut remaining = part.size;
            while remaining > 0 {
                let want =
                    usize::try_from(remaining).map_or(UPLOAD_CHUNK, |r| r.min(UPLOAD_CHUNK));
                let count = fill_chunk(&mut file, &mut chunk[..want])
                    .await
                    .map_err(|source| upload_error(part.path.clone(), source))?;
                if count < want {
                    return Err(upload_error(
                        part.path.clone(),
                        io::Error::new(io::ErrorKind::UnexpectedEof, "file shrank during upload"),
                    ));
                }
                conn.write_all(&chunk[..count]).await?;
                remaining -= count as u64;
                written += count as u64;
                metrics::inc_upload_bytes(count as u64);
                progress.advance(count as u64);
            }
            tracing::debug!(file = %part.file_name, size = part.size, "upload part written");
        }
        let close = self.close_delimiter();
        conn.write_all(close.as_bytes()).await?;
        written += close.len() as u64;
        progress.advance(0);
        Ok(written)
    }
}

/// Fill `buf` from `file`, stopping early only at end of file.
async fn fill_chunk(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let count = file.read(&mut buf[filled..]).await?;
        if count == 0 {
            break;
        }
        filled += count;
    }
    Ok(filled)
}

fn part_header_block(file_name: &str) -> String {
    format!(
        "Content-Disposition: form-data; name=\"firmware\"; filename=\"{file_name}\"\r\n\
         Content-Type: application/octet-stream\r\n\
         Content-Transfer-Encoding: binary\r\n\r\n"
    )
}

fn file_name_of(path: &Path) -> Option<String> {
    path.to_string_lossy()
        .rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
}

fn invalid_input(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, message.to_owned())
}

fn upload_error(path: PathBuf, source: io::Error) -> ClientError {
    ClientError::UploadFile { path, source }
}
