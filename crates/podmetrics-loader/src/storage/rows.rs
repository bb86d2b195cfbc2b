//! Tab-delimited rows from (possibly compressed) result objects
//!
//! Compression is chosen by key suffix: `.gz` (flate2) or `.bz2` (bzip2).
//! Multi-member streams are read to the end, since upstream writers may
//! concatenate compressed parts.
//!
//! Decoding is blocking, so [`RowReader::into_stream`] runs it on the blocking
//! pool and hands rows to async callers through a bounded channel. At most
//! `buffer` decoded rows are held in memory at once.

use bzip2::read::MultiBzDecoder;
use flate2::read::MultiGzDecoder;
use std::io::{BufRead, BufReader, Cursor, Read};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{LoaderError, LoaderResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    Bzip2,
    None,
}

impl Compression {
    pub fn from_key(key: &str) -> Self {
        if key.ends_with(".gz") {
            Compression::Gzip
        } else if key.ends_with(".bz2") {
            Compression::Bzip2
        } else {
            Compression::None
        }
    }
}

/// One non-empty line, split on tabs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// 1-based line number in the decompressed object
    pub line: usize,
    pub fields: Vec<String>,
}

/// Iterator over the non-empty lines of one object, split on tabs.
pub struct RowReader {
    key: String,
    lines: Box<dyn BufRead + Send>,
    line_no: usize,
}

impl RowReader {
    /// Rows of `source`, decompressed according to `key`'s suffix.
    pub fn new(key: &str, source: impl Read + Send + 'static) -> Self {
        let reader: Box<dyn Read + Send> = match Compression::from_key(key) {
            Compression::Gzip => Box::new(MultiGzDecoder::new(source)),
            Compression::Bzip2 => Box::new(MultiBzDecoder::new(source)),
            Compression::None => Box::new(source),
        };
        Self {
            key: key.to_string(),
            lines: Box::new(BufReader::new(reader)),
            line_no: 0,
        }
    }

    pub fn from_bytes(key: &str, data: Vec<u8>) -> Self {
        Self::new(key, Cursor::new(data))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// 1-based number of the line most recently returned.
    pub fn line_number(&self) -> usize {
        self.line_no
    }

    /// Decode on the blocking pool, yielding rows as they are read. Must be
    /// called from within a Tokio runtime.
    pub fn into_stream(mut self, buffer: usize) -> RowStream {
        let key = self.key.clone();
        let (tx, rx) = mpsc::channel(buffer.max(1));

        let producer = tokio::task::spawn_blocking(move || {
            while let Some(fields) = self.next() {
                let failed = fields.is_err();
                let row = fields.map(|fields| Row {
                    line: self.line_no,
                    fields,
                });
                // a closed channel means the consumer gave up
                if tx.blocking_send(row).is_err() || failed {
                    break;
                }
            }
        });

        RowStream {
            key,
            rx,
            producer: Some(producer),
        }
    }
}

impl Iterator for RowReader {
    type Item = LoaderResult<Vec<String>>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut line = String::new();
        loop {
            line.clear();
            match self.lines.read_line(&mut line) {
                Ok(0) => return None,
                Ok(_) => {
                    self.line_no += 1;
                    let trimmed = line.trim_end_matches(['\n', '\r']);
                    if trimmed.is_empty() {
                        continue;
                    }
                    return Some(Ok(trimmed.split('\t').map(str::to_string).collect()));
                }
                Err(source) => {
                    return Some(Err(LoaderError::Decompression {
                        key: self.key.clone(),
                        source,
                    }))
                }
            }
        }
    }
}

/// Async side of [`RowReader::into_stream`]
pub struct RowStream {
    key: String,
    rx: mpsc::Receiver<LoaderResult<Row>>,
    producer: Option<JoinHandle<()>>,
}

impl RowStream {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Next row, or `None` once the object is exhausted.
    pub async fn next(&mut self) -> Option<LoaderResult<Row>> {
        if let Some(row) = self.rx.recv().await {
            return Some(row);
        }

        let producer = self.producer.take()?;
        match producer.await {
            Ok(()) => None,
            Err(e) => Some(Err(LoaderError::storage(format!(
                "Row decoder for {} failed: {}",
                self.key, e
            )))),
        }
    }
}
