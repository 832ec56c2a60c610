/*
 radarloop weather radar animation builder
 © 2026 radarloop contributors

 This program is free software: you can redistribute it and/or modify
 it under the terms of the GNU Affero General Public License as
 published by the Free Software Foundation, either version 3 of the
 License, or (at your option) any later version.

 This program is distributed in the hope that it will be useful,
 but WITHOUT ANY WARRANTY; without even the implied warranty of
 MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 GNU Affero General Public License for more details.

 You should have received a copy of the GNU Affero General Public License
 along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/
//! Downloads a sequence of radar frames concurrently, assembles them into
//! a dithered animated GIF, and publishes it together with a forecast chart.

mod error;
pub use crate::error::*;
mod minipool;
mod encoder;
pub mod assemble;
pub mod cancel;
pub mod dither;
pub mod download;
pub mod fetch;
pub mod palette;
pub mod progress;
pub mod publish;
pub mod scrape;

pub use crate::assemble::{assemble, Animation, Assembler, PalettedFrame};
pub use crate::cancel::CancelToken;
pub use crate::download::{download_all, FrameTask};
pub use crate::fetch::{Fetch, HttpFetcher};
pub use crate::publish::{publish_file, DirPublisher, Publish};
pub use crate::scrape::ScrapeOutput;
pub use gif::Repeat;

use crate::progress::ProgressReporter;
use std::io::Cursor;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

pub const ANIMATION_CONTENT_TYPE: &str = "image/gif";
pub const CHART_CONTENT_TYPE: &str = "image/png";

#[derive(Debug, Clone)]
pub struct Settings {
    /// Number of frames downloaded at the same time. At least 1.
    pub concurrency: usize,
    /// How long each frame is shown
    pub frame_delay_ms: u32,
    pub repeat: Repeat,
    /// Storage key of the animation
    pub animation_key: String,
    /// Storage key of the forecast chart
    pub chart_key: String,
    /// Limit for each HTTP request. If `None`, only cancellation stops a request.
    pub timeout: Option<Duration>,
    pub user_agent: String,
    /// Where the scratch directory for frames is created. Defaults to the system's temp dir.
    pub temp_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            concurrency: download::DEFAULT_CONCURRENCY,
            frame_delay_ms: assemble::DEFAULT_DELAY_MS,
            repeat: Repeat::Infinite,
            animation_key: "radarloop/latest.gif".into(),
            chart_key: "radarloop/meteogram.png".into(),
            timeout: None,
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).into(),
            temp_dir: None,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> CatResult<()> {
        if self.concurrency == 0 {
            return Err(Error::InvalidSettings("concurrency must be at least 1"));
        }
        Ok(())
    }
}

/// Downloads the frames, assembles and publishes the animation, then fetches and publishes the chart.
///
/// Frames are kept in a temporary directory that is removed when this returns, whether it
/// succeeded or not. The first error stops the run, so nothing after it gets published.
pub fn run(scrape: &ScrapeOutput, settings: &Settings, fetcher: &dyn Fetch, publisher: &dyn Publish, cancel: &CancelToken, reporter: &mut dyn ProgressReporter) -> CatResult<()> {
    settings.validate()?;

    let mut workdir = tempfile::Builder::new();
    workdir.prefix("radarloop-");
    let workdir = match &settings.temp_dir {
        Some(dir) => workdir.tempdir_in(dir)?,
        None => workdir.tempdir()?,
    };

    let frames = download_all(&scrape.frame_urls, workdir.path(), settings.concurrency, fetcher, cancel)?;

    let gif_path = workdir.path().join("latest.gif");
    info!(path = %gif_path.display(), "making animation");
    Assembler::new(settings.frame_delay_ms)
        .with_repeat(settings.repeat)
        .assemble(&frames, &gif_path, reporter)?;

    if cancel.is_cancelled() {
        return Err(Error::Aborted);
    }
    info!(key = %settings.animation_key, "uploading animation");
    publish_file(publisher, &gif_path, &settings.animation_key, ANIMATION_CONTENT_TYPE)?;

    info!(url = %scrape.meteogram_url, "downloading meteogram");
    let chart = fetcher.fetch_bytes(&scrape.meteogram_url, cancel)?;

    info!(key = %settings.chart_key, "uploading meteogram");
    publisher.publish(&mut Cursor::new(chart), &settings.chart_key, CHART_CONTENT_TYPE)?;

    let workdir_path = workdir.path().to_path_buf();
    if let Err(e) = workdir.close() {
        warn!(path = %workdir_path.display(), "can't remove temporary files: {e}");
    }
    Ok(())
}
