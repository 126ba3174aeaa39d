use crate::rdb::AssetId;

#[derive(Debug)]
pub enum ArchiveErr {
    NotFound,
    Truncated { needed: usize, actual: usize },
    BadHeader,
    OutOfRange { offset: u64, len: u64, size: usize },
    Io(std::io::Error),
}

impl From<std::io::Error> for ArchiveErr {
    fn from(value: std::io::Error) -> Self {
        match value.kind() {
            std::io::ErrorKind::NotFound => ArchiveErr::NotFound,
            _ => ArchiveErr::Io(value),
        }
    }
}

impl std::fmt::Display for ArchiveErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchiveErr::NotFound => write!(f, "archive not found"),
            ArchiveErr::Truncated { needed, actual } => {
                write!(f, "archive truncated: need {needed} bytes, have {actual}")
            }
            ArchiveErr::BadHeader => write!(f, "archive header is malformed"),
            ArchiveErr::OutOfRange { offset, len, size } => write!(
                f,
                "read of {len} bytes at {offset} is outside the {size} byte archive"
            ),
            ArchiveErr::Io(err) => write!(f, "archive io: {err}"),
        }
    }
}

impl std::error::Error for ArchiveErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ArchiveErr::Io(err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum KuraError {
    ArchiveUnavailable(String),
    InvalidAssetId(AssetId),
    CorruptRecord { id: AssetId, reason: String },
    UnsupportedFormat { id: AssetId, flags: u8 },
    CapacityExceeded { width: u32, height: u32, max_dimension: u32 },
    UploadFailure(),
    DashiContext(),
    JSONError(serde_json::Error),
    IOFailure(std::io::Error),
    ImageError(image::ImageError),
    ArchiveError(ArchiveErr),
}

impl KuraError {
    pub fn corrupt(id: AssetId, reason: impl Into<String>) -> Self {
        KuraError::CorruptRecord {
            id,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for KuraError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KuraError::ArchiveUnavailable(path) => write!(f, "archive unavailable: {path}"),
            KuraError::InvalidAssetId(id) => write!(f, "no asset with id {id}"),
            KuraError::CorruptRecord { id, reason } => {
                write!(f, "asset {id} has a corrupt record: {reason}")
            }
            KuraError::UnsupportedFormat { id, flags } => {
                write!(f, "asset {id} uses unsupported record flags {flags:#04x}")
            }
            KuraError::CapacityExceeded {
                width,
                height,
                max_dimension,
            } => write!(
                f,
                "{width}x{height} sprite does not fit atlas surfaces of {max_dimension}x{max_dimension}"
            ),
            KuraError::UploadFailure() => write!(f, "failed to upload atlas surface"),
            KuraError::DashiContext() => write!(f, "no dashi context was provided"),
            KuraError::JSONError(err) => write!(f, "layout parse error: {err}"),
            KuraError::IOFailure(err) => write!(f, "io error: {err}"),
            KuraError::ImageError(err) => write!(f, "image error: {err}"),
            KuraError::ArchiveError(err) => write!(f, "{err}"),
        }
    }
}

impl From<ArchiveErr> for KuraError {
    fn from(value: ArchiveErr) -> Self {
        KuraError::ArchiveError(value)
    }
}

impl From<serde_json::Error> for KuraError {
    fn from(value: serde_json::Error) -> Self {
        KuraError::JSONError(value)
    }
}

impl From<std::io::Error> for KuraError {
    fn from(value: std::io::Error) -> Self {
        KuraError::IOFailure(value)
    }
}

impl From<image::ImageError> for KuraError {
    fn from(value: image::ImageError) -> Self {
        KuraError::ImageError(value)
    }
}

impl std::error::Error for KuraError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            KuraError::JSONError(err) => Some(err),
            KuraError::IOFailure(err) => Some(err),
            KuraError::ImageError(err) => Some(err),
            KuraError::ArchiveError(err) => Some(err),
            _ => None,
        }
    }
}
