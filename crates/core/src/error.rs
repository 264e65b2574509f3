#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image decode error: {0}")]
    Decode(#[from] image::ImageError),

    #[error("could not fingerprint decoded pixels")]
    Fingerprint,

    #[error("an image with fingerprint {0:#018x} already exists")]
    DuplicateFingerprint(u64),

    #[error("an image is already stored at {0}")]
    DuplicatePath(String),

    #[error("url already linked to an image: {0}")]
    DuplicateUrl(String),

    #[error("tag already exists: {0}")]
    DuplicateTag(String),

    #[error("image {fingerprint:#018x} already carries tag {label:?}")]
    DuplicateLink { label: String, fingerprint: u64 },

    #[error("referenced row does not exist: {0}")]
    DanglingReference(String),

    #[error("no image with fingerprint {0:#018x}")]
    ImageNotFound(u64),

    #[error("url not known: {0}")]
    UrlNotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;
