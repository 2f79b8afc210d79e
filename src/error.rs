use thiserror::Error;

#[derive(Debug, Error)]
pub enum GalleryError {
    #[error("unrecognized gallery request")]
    UnrecognizedRequest,

    #[error("invalid gallery record: {0}")]
    InvalidRecord(#[from] serde_json::Error),

    #[error("failed to open archive: {0}")]
    ArchiveOpen(#[from] std::io::Error),

    #[error("failed to read archive: {0}")]
    ArchiveRead(#[from] zip::result::ZipError),

    #[error("archive contains no image entries")]
    EmptyArchive,

    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),

    #[error("animated image has no frames")]
    EmptyAnimation,

    #[error("decode pool is shut down")]
    PoolShutDown,
}

pub type Result<T> = std::result::Result<T, GalleryError>;
