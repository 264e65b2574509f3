use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use image::ImageReader;

use crate::error::{Error, Result};
use crate::hasher;
use crate::store::ImageStore;

/// Suffix distinguishing files written in the same nanosecond.
static NAME_SEQ: AtomicU64 = AtomicU64::new(0);

/// What happened to the incoming copy once its identity was known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// No image with this fingerprint existed; the new file is canonical.
    Stored,
    /// A visually identical image existed but was smaller; its file was
    /// deleted and the record now points at the new file.
    ReplacedSmaller,
    /// A visually identical image of equal or larger size existed; the new
    /// file was discarded.
    KeptExisting,
}

/// Result of a successful ingestion. `size` is the byte length of the
/// surviving copy, which is not necessarily the one just uploaded.
#[derive(Debug)]
pub struct Ingested {
    pub fingerprint: u64,
    pub size: u64,
    pub outcome: IngestOutcome,
    /// The surviving image already carried the declared tag.
    pub already_tagged: bool,
}

/// Writes incoming byte streams under the storage root, fingerprints them,
/// and resolves identity conflicts against the store.
///
/// The engine owns the files below `root`: it creates them, and it alone
/// deletes a copy that loses conflict resolution.
pub struct Ingestor {
    store: Arc<dyn ImageStore>,
    root: PathBuf,
}

impl Ingestor {
    /// Create an ingestor over `root`, creating the directory if needed.
    pub fn new(store: Arc<dyn ImageStore>, root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { store, root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Ingest one image: persist the stream to disk, fingerprint it, and
    /// resolve identity. `ext` is the advisory file extension (decode sniffs
    /// the real format); `label` is the tag applied to whichever image
    /// survives, created on first use.
    ///
    /// Conflict policy: of two files with the same fingerprint, the larger
    /// one survives. Exactly one copy exists on disk afterwards; a stream
    /// that fails to decode is deleted before the error propagates, so no
    /// unrecorded file is ever left behind.
    pub fn ingest(&self, src: impl Read, ext: &str, label: &str) -> Result<Ingested> {
        let (path, size) = self.save_stream(src, ext)?;

        let fingerprint = match self.fingerprint_file(&path) {
            Ok(fingerprint) => fingerprint,
            Err(err) => {
                remove_if_present(&path)?;
                return Err(err);
            }
        };

        let (outcome, size) = match self.store.add(fingerprint, &path, size) {
            Ok(()) => (IngestOutcome::Stored, size),
            Err(Error::DuplicateFingerprint(_)) => self.resolve_conflict(fingerprint, &path, size)?,
            Err(err) => return Err(err),
        };

        let already_tagged = self.apply_tag(fingerprint, label)?;

        Ok(Ingested {
            fingerprint,
            size,
            outcome,
            already_tagged,
        })
    }

    /// Copy the stream into the root under a collision-resistant name:
    /// nanosecond timestamp plus an atomic sequence number.
    fn save_stream(&self, mut src: impl Read, ext: &str) -> Result<(PathBuf, u64)> {
        let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0);
        let seq = NAME_SEQ.fetch_add(1, Ordering::Relaxed);
        let path = self.root.join(format!("{nanos:x}-{seq:x}.{ext}"));

        let mut dest = File::create(&path)?;
        let size = io::copy(&mut src, &mut dest)?;
        Ok((path, size))
    }

    fn fingerprint_file(&self, path: &Path) -> Result<u64> {
        let img = ImageReader::open(path)?.with_guessed_format()?.decode()?;
        hasher::difference_hash(&img).ok_or(Error::Fingerprint)
    }

    /// Larger stored size wins. Returns the outcome and the surviving size.
    fn resolve_conflict(
        &self,
        fingerprint: u64,
        path: &Path,
        size: u64,
    ) -> Result<(IngestOutcome, u64)> {
        let existing = self.store.find(fingerprint)?;
        if size > existing.size {
            remove_if_present(&existing.path)?;
            self.store.replace(fingerprint, path, size)?;
            Ok((IngestOutcome::ReplacedSmaller, size))
        } else {
            fs::remove_file(path)?;
            Ok((IngestOutcome::KeptExisting, existing.size))
        }
    }

    /// Ensure the tag exists, then link it. A pre-existing tag or link is
    /// expected and not a failure.
    fn apply_tag(&self, fingerprint: u64, label: &str) -> Result<bool> {
        match self.store.create_tag(label, None) {
            Ok(()) | Err(Error::DuplicateTag(_)) => {}
            Err(err) => return Err(err),
        }
        match self.store.add_tag(fingerprint, label) {
            Ok(()) => Ok(false),
            Err(Error::DuplicateLink { .. }) => Ok(true),
            Err(err) => Err(err),
        }
    }
}

/// A superseded file may have been swept away externally; that is not a
/// reason to fail the ingestion replacing it.
fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err.into()),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use std::io::Cursor;

    fn ingestor() -> (Ingestor, Arc<dyn ImageStore>, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let store: Arc<dyn ImageStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let ingestor = Ingestor::new(store.clone(), tmp.path().join("images")).unwrap();
        (ingestor, store, tmp)
    }

    fn gradient_png() -> Vec<u8> {
        let img = image::RgbImage::from_fn(64, 64, |x, y| {
            image::Rgb([(x * 4) as u8, (y * 4) as u8, 0])
        });
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    /// Same pixels, strictly more bytes: PNG decoders stop at the end-of-image
    /// chunk, so trailing padding changes the file size but not the content.
    fn padded(mut png: Vec<u8>, extra: usize) -> Vec<u8> {
        png.extend(std::iter::repeat(0u8).take(extra));
        png
    }

    fn stored_files(ingestor: &Ingestor) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = fs::read_dir(ingestor.root())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        files.sort();
        files
    }

    #[test]
    fn test_ingest_stores_file_and_record() {
        let (ingestor, store, _tmp) = ingestor();
        let png = gradient_png();

        let report = ingestor.ingest(png.as_slice(), "png", "art").unwrap();

        assert_eq!(report.outcome, IngestOutcome::Stored);
        assert_eq!(report.size, png.len() as u64);
        assert!(!report.already_tagged);

        let record = store.find(report.fingerprint).unwrap();
        assert_eq!(record.size, png.len() as u64);
        assert!(record.path.exists());
        assert_eq!(fs::read(&record.path).unwrap(), png);
    }

    #[test]
    fn test_ingest_creates_declared_tag() {
        let (ingestor, store, _tmp) = ingestor();

        let report = ingestor
            .ingest(gradient_png().as_slice(), "png", "fresh-tag")
            .unwrap();

        let tagged = store.find_by_tag("fresh-tag", 0, 10).unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].fingerprint, report.fingerprint);
    }

    #[test]
    fn test_larger_duplicate_replaces_smaller() {
        let (ingestor, store, _tmp) = ingestor();
        let small = gradient_png();
        let large = padded(small.clone(), 4096);

        let first = ingestor.ingest(small.as_slice(), "png", "art").unwrap();
        let second = ingestor.ingest(large.as_slice(), "png", "art").unwrap();

        assert_eq!(first.fingerprint, second.fingerprint);
        assert_eq!(second.outcome, IngestOutcome::ReplacedSmaller);
        assert_eq!(second.size, large.len() as u64);

        let record = store.find(first.fingerprint).unwrap();
        assert_eq!(record.size, large.len() as u64);

        // Only the winning copy remains on disk.
        let files = stored_files(&ingestor);
        assert_eq!(files, vec![record.path.clone()]);
    }

    #[test]
    fn test_smaller_duplicate_is_discarded() {
        let (ingestor, store, _tmp) = ingestor();
        let small = gradient_png();
        let large = padded(small.clone(), 4096);

        let first = ingestor.ingest(large.as_slice(), "png", "art").unwrap();
        let second = ingestor.ingest(small.as_slice(), "png", "art").unwrap();

        assert_eq!(second.outcome, IngestOutcome::KeptExisting);
        // The reported size is the surviving copy's, not the upload's.
        assert_eq!(second.size, large.len() as u64);

        let record = store.find(first.fingerprint).unwrap();
        assert_eq!(record.size, large.len() as u64);
        assert_eq!(stored_files(&ingestor), vec![record.path]);
    }

    #[test]
    fn test_duplicate_keeps_tagging_survivor() {
        let (ingestor, store, _tmp) = ingestor();
        let small = gradient_png();
        let large = padded(small.clone(), 4096);

        ingestor.ingest(small.as_slice(), "png", "first").unwrap();
        let report = ingestor.ingest(large.as_slice(), "png", "second").unwrap();

        // Both labels now annotate the surviving image.
        assert_eq!(store.find_by_tag("first", 0, 10).unwrap().len(), 1);
        assert_eq!(store.find_by_tag("second", 0, 10).unwrap().len(), 1);
        assert!(!report.already_tagged);
    }

    #[test]
    fn test_repeated_tag_is_reported_not_fatal() {
        let (ingestor, _store, _tmp) = ingestor();
        let png = gradient_png();

        ingestor.ingest(png.as_slice(), "png", "art").unwrap();
        let report = ingestor
            .ingest(padded(png, 1024).as_slice(), "png", "art")
            .unwrap();

        assert!(report.already_tagged);
    }

    #[test]
    fn test_undecodable_stream_is_cleaned_up() {
        let (ingestor, _store, _tmp) = ingestor();

        let err = ingestor
            .ingest(Cursor::new(b"not an image at all"), "png", "art")
            .unwrap_err();

        assert!(matches!(err, Error::Decode(_)));
        assert!(stored_files(&ingestor).is_empty());
    }

    #[test]
    fn test_saved_names_do_not_collide() {
        let (ingestor, _store, _tmp) = ingestor();
        let a = ingestor.save_stream(Cursor::new(b"aa"), "png").unwrap();
        let b = ingestor.save_stream(Cursor::new(b"bb"), "png").unwrap();
        assert_ne!(a.0, b.0);
    }

    #[test]
    fn test_extension_is_advisory_only() {
        // A PNG stream declared as jpeg still decodes via format sniffing.
        let (ingestor, _store, _tmp) = ingestor();
        let report = ingestor
            .ingest(gradient_png().as_slice(), "jpeg", "art")
            .unwrap();
        assert_eq!(report.outcome, IngestOutcome::Stored);
    }
}
