//! Tabular record archiving
//!
//! Records are written as comma delimited text with a fixed header row. An
//! [`Archiver`] streams records into one file, [`write_table`] writes a whole
//! table in one call.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use std::fs::File;
use std::path::{Path, PathBuf};
use csv::WriterBuilder;
pub use csv::Writer;
use serde::Serialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// An object used to write CSV archive files.
pub struct Archiver {
    writer: Writer<File>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors which can occur while archiving records.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Cannot create the archive file {0:?}: {1}")]
    CreateError(PathBuf, std::io::Error),

    #[error("Cannot write to the archive file: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Cannot flush the archive file: {0}")]
    FlushError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Archiver {
    /// Create (or truncate) an archive at an absolute path, writing `header`
    /// as the first row.
    pub fn create<P: AsRef<Path>>(
        path: P, header: &[&str]
    ) -> Result<Self, ArchiveError> {
        let path = path.as_ref().to_path_buf();

        let file = File::create(&path)
            .map_err(|e| ArchiveError::CreateError(path.clone(), e))?;

        // Column names come from `header`, not from the record's fields
        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.write_record(header)?;

        Ok(Self { writer })
    }

    /// Serialise a record into the archive.
    pub fn serialise<T: Serialize>(
        &mut self, record: T
    ) -> Result<(), ArchiveError> {
        self.writer.serialize(record)?;
        Ok(())
    }

    /// Flush all buffered records to disk.
    pub fn flush(&mut self) -> Result<(), ArchiveError> {
        self.writer.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Write a complete delimited table, header first, then one line per row.
pub fn write_table<P, R>(
    path: P, header: &[&str], rows: &[R]
) -> Result<(), ArchiveError>
where
    P: AsRef<Path>,
    R: Serialize
{
    let mut archiver = Archiver::create(path, header)?;

    for row in rows {
        archiver.serialise(row)?;
    }

    archiver.flush()
}
