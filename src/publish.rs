//! Durable storage for the finished artifacts

use crate::error::*;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Stores a named blob. Implementations must not leave a partially written blob
/// visible under `key` when they fail.
pub trait Publish {
    fn publish(&self, content: &mut dyn Read, key: &str, content_type: &str) -> CatResult<()>;
}

/// Publishes the contents of a local file
pub fn publish_file(publisher: &dyn Publish, path: &Path, key: &str, content_type: &str) -> CatResult<()> {
    let mut file = File::open(path).map_err(|e| Error::Publish(key.to_owned(), e))?;
    publisher.publish(&mut file, key, content_type)
}

/// Stores blobs as files under a root directory, with keys used as relative paths.
///
/// Each blob is written to a temporary file next to its destination first,
/// and renamed into place once complete.
#[derive(Debug, Clone)]
pub struct DirPublisher {
    root: PathBuf,
}

impl DirPublisher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Where `key` is (or would be) stored
    pub fn path_for(&self, key: &str) -> CatResult<PathBuf> {
        let rel = Path::new(key);
        let is_plain = !key.is_empty() && rel.components().all(|c| matches!(c, Component::Normal(_)));
        if !is_plain {
            return Err(Error::BadKey(key.to_owned()));
        }
        Ok(self.root.join(rel))
    }
}

impl Publish for DirPublisher {
    fn publish(&self, content: &mut dyn Read, key: &str, content_type: &str) -> CatResult<()> {
        let dest = self.path_for(key)?;
        let dir = dest.parent().unwrap_or(&self.root);
        let mut store = || -> io::Result<u64> {
            fs::create_dir_all(dir)?;
            let mut tmp = tempfile::Builder::new().prefix(".publish-").tempfile_in(dir)?;
            let len = io::copy(&mut *content, &mut tmp)?;
            tmp.as_file_mut().flush()?;
            tmp.as_file().sync_all()?;
            tmp.persist(&dest).map_err(|e| e.error)?;
            Ok(len)
        };
        let len = store().map_err(|e| Error::Publish(key.to_owned(), e))?;
        debug!(key, content_type, bytes = len, path = %dest.display(), "published");
        Ok(())
    }
}
