//! Document store error types

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::engine::relational::SampleId;

#[derive(Error, Debug)]
pub enum NoSqlError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Collection not found: {0}")]
    CollectionNotFound(PathBuf),

    #[error("Document for sample {0} already exists")]
    DuplicateId(SampleId),
}

pub type Result<T> = std::result::Result<T, NoSqlError>;
