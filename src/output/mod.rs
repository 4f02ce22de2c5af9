//! Result sinks.

use std::path::Path;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::app::Result;
use crate::domain::Entry;

/// Column order of [`CsvWriter`] output.
pub const CSV_HEADERS: [&str; 16] = [
    "id",
    "title",
    "category",
    "categories",
    "address",
    "link",
    "latitude",
    "longitude",
    "review_count",
    "rating",
    "phone",
    "data_id",
    "website",
    "emails",
    "reviews",
    "fetched_at",
];

#[async_trait]
pub trait ResultWriter: Send {
    async fn write(&mut self, entry: &Entry) -> Result<()>;

    async fn flush(&mut self) -> Result<()>;
}

/// Writes one JSON object per line
pub struct JsonLinesWriter {
    out: BufWriter<Box<dyn AsyncWrite + Send + Unpin>>,
}

impl JsonLinesWriter {
    pub fn new(out: Box<dyn AsyncWrite + Send + Unpin>) -> Self {
        Self {
            out: BufWriter::new(out),
        }
    }

    /// Create (or truncate) the file at `path`.
    pub async fn create(path: &Path) -> Result<Self> {
        let file = tokio::fs::File::create(path).await?;
        Ok(Self::new(Box::new(file)))
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(tokio::io::stdout()))
    }
}

#[async_trait]
impl ResultWriter for JsonLinesWriter {
    async fn write(&mut self, entry: &Entry) -> Result<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        self.out.write_all(&line).await?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.out.flush().await?;
        Ok(())
    }
}

/// Writes a header row followed by one row per entry.
///
/// List columns are joined with `", "`; reviews are embedded as JSON.
pub struct CsvWriter {
    out: BufWriter<Box<dyn AsyncWrite + Send + Unpin>>,
    header_written: bool,
}

impl CsvWriter {
    pub fn new(out: Box<dyn AsyncWrite + Send + Unpin>) -> Self {
        Self {
            out: BufWriter::new(out),
            header_written: false,
        }
    }

    /// Create (or truncate) the file at `path`.
    pub async fn create(path: &Path) -> Result<Self> {
        let file = tokio::fs::File::create(path).await?;
        Ok(Self::new(Box::new(file)))
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(tokio::io::stdout()))
    }
}

fn csv_row(entry: &Entry) -> Result<Vec<String>> {
    let (latitude, longitude) = match entry.coordinates {
        Some(ref coords) => (coords.latitude.to_string(), coords.longitude.to_string()),
        None => (String::new(), String::new()),
    };

    Ok(vec![
        entry.id.clone(),
        entry.title.clone(),
        entry.category.clone(),
        entry.categories.join(", "),
        entry.address.clone(),
        entry.link.clone(),
        latitude,
        longitude,
        entry.review_count.to_string(),
        entry.rating.map(|r| r.to_string()).unwrap_or_default(),
        entry.phone.clone(),
        entry.data_id.clone(),
        entry.website.clone().unwrap_or_default(),
        entry.emails.iter().cloned().collect::<Vec<_>>().join(", "),
        serde_json::to_string(&entry.reviews)?,
        entry.fetched_at.to_rfc3339(),
    ])
}

/// Encode one record with CSV quoting rules.
fn encode_record<I, T>(fields: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut record = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    record.write_record(fields)?;
    Ok(record.into_inner().map_err(|e| e.into_error())?)
}

#[async_trait]
impl ResultWriter for CsvWriter {
    async fn write(&mut self, entry: &Entry) -> Result<()> {
        if !self.header_written {
            self.out.write_all(&encode_record(CSV_HEADERS)?).await?;
            self.header_written = true;
        }
        let row = encode_record(&csv_row(entry)?)?;
        self.out.write_all(&row).await?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.out.flush().await?;
        Ok(())
    }
}

/// Write every entry received on `rx` until all senders are gone.
pub async fn write_all(
    mut rx: mpsc::Receiver<Entry>,
    mut writer: Box<dyn ResultWriter>,
) -> Result<usize> {
    let mut written = 0;
    while let Some(entry) = rx.recv().await {
        writer.write(&entry).await?;
        written += 1;
        debug!("Wrote entry {:?}", entry.title);
    }
    writer.flush().await?;

    info!("Wrote {} entries", written);
    Ok(written)
}
