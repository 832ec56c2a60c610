//! Reporting how far the GIF writer has got, and stopping it early

/// Snapshot taken after a frame (or the whole file) has been written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameProgress {
    /// Frames written so far
    pub written: usize,
    /// Frames in the animation
    pub total: usize,
    /// Size of the GIF so far
    pub bytes: u64,
}

pub trait ProgressReporter: Send {
    /// Called after each frame. Returning `false` stops the writer,
    /// and the incomplete animation is discarded.
    fn frame_written(&mut self, progress: FrameProgress) -> bool;

    /// Called once, after the trailer. `bytes` is the final file size.
    fn finished(&mut self, _progress: FrameProgress) {}
}

/// Never stops the writer
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn frame_written(&mut self, _: FrameProgress) -> bool {
        true
    }
}

#[cfg(feature = "pbr")]
impl<T> ProgressReporter for pbr::ProgressBar<T> where T: std::io::Write + Send {
    fn frame_written(&mut self, progress: FrameProgress) -> bool {
        self.total = progress.total as u64;
        self.set(progress.written as u64);
        true
    }

    fn finished(&mut self, progress: FrameProgress) {
        self.finish_print(&format!("{} frames, {}KB", progress.written, (progress.bytes + 999) / 1000));
    }
}
