// ============================================================================
// Record Stream
// ============================================================================
//
// Sequential reader over one manifest file: one record identifier per line,
// no header, no trailer.
//
// State: Opened -> (reading)* -> Exhausted | Closed
//
// - first()       rewinds to the start and reads the first identifier
// - next_record() reads the following identifier, Ok(None) once exhausted
// - close()       releases the file; safe to call repeatedly
// - validate()    full pass that checks every identifier against the cache
//
// Each line has its terminator ("\n" or "\r\n") removed. An empty line is a
// BadRecord, a line failing the identifier shape is a BadRecordId. A last
// line without a terminator is still a record.
//
// Files are read twice: once by validate(), once more from first() when the
// records are streamed into the pipeline.
//
// ============================================================================

use crate::cache_proxy::CacheProxy;
use reprocess_error::{ReprocessError, ReprocessResult};
use reprocess_metrics::RECORDS_VALIDATED_TOTAL;
use reprocess_types::{Identifier, IdentifierShape};
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tracing::{error, warn};

pub struct RecordStream {
    path: PathBuf,
    reader: Option<BufReader<File>>,
    shape: IdentifierShape,
    /// Index of the next record to be read
    index: usize,
    line: String,
}

impl RecordStream {
    /// Open a manifest for reading
    pub async fn open(path: impl AsRef<Path>, shape: IdentifierShape) -> ReprocessResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).await?;

        Ok(Self {
            path,
            reader: Some(BufReader::new(file)),
            shape,
            index: 0,
            line: String::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewind and read the first identifier
    pub async fn first(&mut self) -> ReprocessResult<Option<Identifier>> {
        let reader = self.reader.as_mut().ok_or(ReprocessError::FileNotOpen)?;
        reader.seek(SeekFrom::Start(0)).await?;
        self.index = 0;
        self.next_record().await
    }

    /// Read the next identifier; Ok(None) at end of file
    pub async fn next_record(&mut self) -> ReprocessResult<Option<Identifier>> {
        let reader = self.reader.as_mut().ok_or(ReprocessError::FileNotOpen)?;
        let index = self.index;

        self.line.clear();
        let read = match reader.read_line(&mut self.line).await {
            Ok(read) => read,
            // Not text: the line cannot be an identifier
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                return Err(ReprocessError::BadRecord { index });
            }
            Err(e) => return Err(e.into()),
        };

        if read == 0 {
            return Ok(None);
        }

        let raw = self
            .line
            .strip_suffix('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
            .unwrap_or(&self.line);

        if raw.is_empty() {
            return Err(ReprocessError::BadRecord { index });
        }

        let id = Identifier::parse(raw, self.shape).map_err(|_| {
            error!(record_index = index, id = %raw, "Record id is suspect");
            ReprocessError::BadRecordId {
                index,
                id: raw.to_string(),
            }
        })?;

        self.index += 1;
        Ok(Some(id))
    }

    /// Release the file
    pub fn close(&mut self) {
        self.reader = None;
    }

    pub fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    /// Read the whole file and confirm every identifier is in the cache
    ///
    /// Identifiers are checked `lookup_size` at a time. Returns the number of
    /// records in the file. The file is always read to the end on success.
    pub async fn validate(
        &mut self,
        cache: &dyn CacheProxy,
        lookup_size: usize,
    ) -> ReprocessResult<usize> {
        let lookup_size = lookup_size.max(1);
        let mut pending: Vec<Identifier> = Vec::with_capacity(lookup_size);
        let mut count = 0usize;

        let mut next = self.first().await;
        loop {
            let id = match next {
                Ok(Some(id)) => id,
                Ok(None) => break,
                Err(e) => {
                    error!(
                        file = %self.path.display(),
                        record_index = count,
                        "Validation failure"
                    );
                    return Err(e);
                }
            };

            pending.push(id);
            count += 1;

            if pending.len() == lookup_size {
                Self::check_present(cache, &pending, count).await?;
                pending.clear();
            }

            next = self.next_record().await;
        }

        if !pending.is_empty() {
            Self::check_present(cache, &pending, count).await?;
        }

        if count == 0 {
            warn!(file = %self.path.display(), "EOF on first read, looks like an empty file");
        }

        Ok(count)
    }

    /// `read_so_far` counts every record up to and including this batch
    async fn check_present(
        cache: &dyn CacheProxy,
        batch: &[Identifier],
        read_so_far: usize,
    ) -> ReprocessResult<()> {
        match cache.exists(batch).await {
            Ok(()) => {
                RECORDS_VALIDATED_TOTAL.inc_by(batch.len() as u64);
                Ok(())
            }
            Err(ReprocessError::NotInCache { missing }) => {
                let first = read_so_far - batch.len();
                let last = read_so_far - 1;
                error!(
                    first_index = first,
                    last_index = last,
                    missing = ?missing,
                    "One or more records not in cache"
                );
                Err(ReprocessError::RecordNotInCache { first, last })
            }
            Err(e) => Err(e),
        }
    }
}
