//! Concurrent, order-preserving download of animation frames

use crate::cancel::CancelToken;
use crate::error::*;
use crate::fetch::Fetch;
use crate::minipool;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Number of simultaneous downloads used when nothing else is configured
pub const DEFAULT_CONCURRENCY: usize = 3;

/// One frame to download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameTask {
    pub url: String,
    pub path: PathBuf,
}

/// Last path segment of the URL, ignoring the query string, fragment and trailing slashes.
pub fn file_name_for_url(url: &str) -> Option<&str> {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    let name = url[..end].trim_end_matches('/').rsplit('/').next()?;
    match name {
        "" | "." | ".." => None,
        name if name.contains('\\') => None,
        name => Some(name),
    }
}

/// One task per URL, in input order. File names must be unique within `workdir`.
pub fn frame_tasks(urls: &[String], workdir: &Path) -> CatResult<Vec<FrameTask>> {
    let mut seen = HashSet::with_capacity(urls.len());
    urls.iter().map(|url| {
        let name = file_name_for_url(url).ok_or_else(|| Error::BadUrl(url.clone()))?;
        if !seen.insert(name) {
            return Err(Error::DuplicateFileName(name.to_owned()));
        }
        Ok(FrameTask {
            url: url.clone(),
            path: workdir.join(name),
        })
    }).collect()
}

/// Downloads every URL into `workdir` using `concurrency` worker threads.
///
/// The returned paths are in the same order as `urls`, regardless of the order in which
/// the downloads finish. They're decided before anything is fetched.
///
/// The first failed download stops the dispatch of further URLs, and its error is returned.
/// Downloads already in progress are allowed to finish. After an error, none of the files
/// should be assumed to be complete.
pub fn download_all(urls: &[String], workdir: &Path, concurrency: usize, fetcher: &dyn Fetch, cancel: &CancelToken) -> CatResult<Vec<PathBuf>> {
    if concurrency == 0 {
        return Err(Error::InvalidSettings("concurrency must be at least 1"));
    }
    let tasks = frame_tasks(urls, workdir)?;
    let paths: Vec<_> = tasks.iter().map(|t| t.path.clone()).collect();
    if tasks.is_empty() {
        return Ok(paths);
    }

    info!(frames = tasks.len(), concurrency, "downloading frames");
    minipool::new(concurrency, "fetch", cancel, |queue| {
        for task in tasks {
            if !queue.send(task) {
                debug!("stopped dispatching frames early");
                break;
            }
        }
        Ok(())
    }, |task: FrameTask| {
        fetcher.fetch_to_file(&task.url, &task.path, cancel)
    })?;

    // a worker may have dropped its task on seeing the cancellation
    if cancel.is_cancelled() {
        return Err(Error::Aborted);
    }
    Ok(paths)
}
