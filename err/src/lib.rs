#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] IoError),
    #[error("FS: {0}")]
    Fs(#[from] FsError),
}

#[derive(thiserror::Error, Debug)]
pub enum IoError {
    #[error("short read at offset {offset}: wanted {wanted} bytes, got {got}")]
    ShortRead {
        offset: u64,
        wanted: usize,
        got: usize,
    },
    #[error("short write at offset {offset}: wanted {wanted} bytes, wrote {wrote}")]
    ShortWrite {
        offset: u64,
        wanted: usize,
        wrote: usize,
    },
    #[error(transparent)]
    Os(#[from] std::io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum FsError {
    #[error("invalid layout: {0}")]
    InvalidLayout(&'static str),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("not a file: {0}")]
    NotAFile(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("directory is full")]
    DirectoryFull,
    #[error("no free cluster available")]
    NoSpace,
    #[error("cluster chain ended before declared file size")]
    TruncatedChain,
    #[error("cluster chain forms a cycle")]
    CycleDetected,
    #[error("duplicate entry: {0}")]
    AlreadyExists(String),
}

pub type Result<T> = core::result::Result<T, Error>;
