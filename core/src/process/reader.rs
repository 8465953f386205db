use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Size limits for [`LineReader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineReaderLimits {
    /// Longest line the line-oriented path accepts.
    pub line_limit: usize,
    /// Fixed size of one read once a line overflowed `line_limit`.
    pub chunk_size: usize,
    /// Hard cap on chunked reads for a single line.
    pub max_chunks: usize,
}

impl Default for LineReaderLimits {
    fn default() -> Self {
        Self {
            line_limit: 64 * 1024,
            chunk_size: 8 * 1024,
            max_chunks: 1_000,
        }
    }
}

impl LineReaderLimits {
    fn chunk_cap_bytes(&self) -> usize {
        self.chunk_size.max(1).saturating_mul(self.max_chunks)
    }
}

/// One line read from the child, without its trailing newline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadLine {
    Line(Vec<u8>),
    /// The line overflowed the normal limit and was reassembled from chunks.
    /// `capped` is set when the chunk cap was hit before a newline showed up.
    Reassembled {
        bytes: Vec<u8>,
        chunks: usize,
        capped: bool,
    },
}

impl ReadLine {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ReadLine::Line(bytes) | ReadLine::Reassembled { bytes, .. } => bytes,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            ReadLine::Line(bytes) | ReadLine::Reassembled { bytes, .. } => bytes,
        }
    }

    /// Lossy UTF-8 decode with surrounding whitespace stripped.
    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(self.as_bytes()).trim().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Lines,
    Chunked { bytes: usize },
}

/// Newline-delimited reader that survives arbitrarily long lines.
///
/// `next_line` is cancel safe: every byte taken from the underlying buffer is
/// moved into `pending` within the same poll, so wrapping the call in
/// `tokio::time::timeout` and retrying never loses data.
pub struct LineReader<R> {
    inner: BufReader<R>,
    pending: Vec<u8>,
    mode: Mode,
    limits: LineReaderLimits,
    eof: bool,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(reader: R, limits: LineReaderLimits) -> Self {
        Self {
            inner: BufReader::with_capacity(limits.chunk_size.max(1), reader),
            pending: Vec::new(),
            mode: Mode::Lines,
            limits,
            eof: false,
        }
    }

    pub fn limits(&self) -> LineReaderLimits {
        self.limits
    }

    /// Returns the next line, or `None` once the reader is exhausted.
    ///
    /// A trailing line without a newline is returned at EOF.
    pub async fn next_line(&mut self) -> std::io::Result<Option<ReadLine>> {
        loop {
            if self.eof {
                return Ok(self.flush_pending());
            }

            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                self.eof = true;
                continue;
            }

            match self.mode {
                Mode::Lines => {
                    let room = self.limits.line_limit.saturating_sub(self.pending.len());
                    // One byte past the limit so a newline sitting exactly on it still counts.
                    let window = available.len().min(room.saturating_add(1));
                    let newline = available[..window].iter().position(|b| *b == b'\n');

                    if let Some(pos) = newline {
                        self.pending.extend_from_slice(&available[..pos]);
                        self.inner.consume(pos + 1);
                        return Ok(Some(ReadLine::Line(std::mem::take(&mut self.pending))));
                    }

                    self.pending.extend_from_slice(&available[..window]);
                    self.inner.consume(window);

                    if self.pending.len() > self.limits.line_limit {
                        tracing::warn!(
                            target: "aris.process",
                            line_limit = self.limits.line_limit,
                            chunk_size = self.limits.chunk_size,
                            "line exceeded buffer limit, switching to chunked reads"
                        );
                        self.mode = Mode::Chunked { bytes: 0 };
                    }
                }
                Mode::Chunked { bytes } => {
                    let cap = self.limits.chunk_cap_bytes();
                    let chunk_size = self.limits.chunk_size.max(1);
                    let window = available
                        .len()
                        .min(chunk_size)
                        .min(cap.saturating_sub(bytes));
                    let newline = available[..window].iter().position(|b| *b == b'\n');
                    let take = newline.unwrap_or(window);

                    self.pending.extend_from_slice(&available[..take]);
                    self.inner.consume(newline.map_or(window, |pos| pos + 1));

                    let bytes = bytes + take;
                    let chunks = bytes.div_ceil(chunk_size).max(1);

                    if newline.is_some() {
                        tracing::debug!(
                            target: "aris.process",
                            chunks,
                            total_bytes = self.pending.len(),
                            "chunked line reassembled"
                        );
                        return Ok(Some(self.finish_chunked(chunks, false)));
                    }

                    if bytes >= cap {
                        tracing::warn!(
                            target: "aris.process",
                            max_chunks = self.limits.max_chunks,
                            total_bytes = self.pending.len(),
                            "chunk cap reached before newline, returning partial line"
                        );
                        return Ok(Some(self.finish_chunked(chunks, true)));
                    }

                    self.mode = Mode::Chunked { bytes };
                }
            }
        }
    }

    fn finish_chunked(&mut self, chunks: usize, capped: bool) -> ReadLine {
        self.mode = Mode::Lines;
        ReadLine::Reassembled {
            bytes: std::mem::take(&mut self.pending),
            chunks,
            capped,
        }
    }

    fn flush_pending(&mut self) -> Option<ReadLine> {
        if self.pending.is_empty() {
            self.mode = Mode::Lines;
            return None;
        }
        match self.mode {
            Mode::Lines => Some(ReadLine::Line(std::mem::take(&mut self.pending))),
            Mode::Chunked { bytes } => {
                let chunks = bytes.div_ceil(self.limits.chunk_size.max(1)).max(1);
                Some(self.finish_chunked(chunks, false))
            }
        }
    }
}
