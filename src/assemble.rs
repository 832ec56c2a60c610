//! Turns downloaded frames into one animated GIF

use crate::dither;
use crate::encoder::GifWriter;
use crate::error::*;
use crate::palette;
use crate::progress::{FrameProgress, NoProgress, ProgressReporter};
use gif::Repeat;
use imgref::ImgVec;
use rgb::{RGB8, RGBA8};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Per-frame delay used when nothing else is configured
pub const DEFAULT_DELAY_MS: u32 = 750;

/// Indices into the animation's shared palette
pub type PalettedFrame = ImgVec<u8>;

/// Decoded, validated and quantized frames, ready to be written
pub struct Animation {
    pub frames: Vec<PalettedFrame>,
    pub palette: Vec<RGB8>,
    pub width: u16,
    pub height: u16,
    /// In hundredths of a second, the same for every frame
    pub delay: u16,
    pub repeat: Repeat,
}

/// Decodes frames, checks they're all the same size, dithers them to a fixed palette,
/// and writes them as a GIF.
///
/// Everything happens on the calling thread, in frame order.
#[derive(Clone)]
pub struct Assembler {
    palette: Vec<RGB8>,
    delay_ms: u32,
    repeat: Repeat,
}

/// Assembles `paths` (in that order) into a GIF at `output`, showing each frame for `delay_ms`.
///
/// Nothing is written unless every frame decodes and has the same size as the first one.
pub fn assemble(paths: &[PathBuf], output: &Path, delay_ms: u32) -> CatResult<()> {
    Assembler::new(delay_ms).assemble(paths, output, &mut NoProgress)
}

impl Assembler {
    /// Uses the Plan 9 palette and loops forever
    pub fn new(delay_ms: u32) -> Self {
        Self {
            palette: palette::plan9(),
            delay_ms,
            repeat: Repeat::Infinite,
        }
    }

    #[must_use]
    pub fn with_repeat(mut self, repeat: Repeat) -> Self {
        self.repeat = repeat;
        self
    }

    /// Custom palette of 1 to 256 colours
    pub fn with_palette(mut self, palette: Vec<RGB8>) -> CatResult<Self> {
        if palette.is_empty() || palette.len() > 256 {
            return Err(Error::InvalidSettings("the palette must have between 1 and 256 colours"));
        }
        self.palette = palette;
        Ok(self)
    }

    /// GIF delays are in hundredths of a second. Rounds to the nearest one, at least 1.
    pub fn delay_centiseconds(&self) -> u16 {
        ((self.delay_ms.saturating_add(5)) / 10).clamp(1, u16::MAX.into()) as u16
    }

    pub fn assemble(&self, paths: &[PathBuf], output: &Path, reporter: &mut dyn ProgressReporter) -> CatResult<()> {
        let anim = self.load(paths)?;

        info!(path = %output.display(), "writing animation");
        let file = File::create(output)?;
        let res = anim.write(BufWriter::new(file), reporter).and_then(|mut w| {
            w.flush()?;
            Ok(())
        });
        if res.is_err() {
            if let Err(e) = fs::remove_file(output) {
                warn!(path = %output.display(), "can't remove incomplete animation: {e}");
            }
        }
        res
    }

    /// Decodes and quantizes every frame, failing on the first bad one
    pub fn load(&self, paths: &[PathBuf]) -> CatResult<Animation> {
        let mut frames = Vec::with_capacity(paths.len());
        let mut size = None;
        for (index, path) in paths.iter().enumerate() {
            let image = decode_frame(path)?;
            let (width, height) = (image.width() as u32, image.height() as u32);
            let (expected_width, expected_height) = *size.get_or_insert((width, height));
            if (width, height) != (expected_width, expected_height) {
                return Err(Error::FrameSizeMismatch(index, width, height, expected_width, expected_height));
            }
            debug!(index, path = %path.display(), width, height, "quantizing frame");
            frames.push(dither::floyd_steinberg(image.as_ref(), &self.palette));
        }

        let (width, height) = size.ok_or(Error::NoFrames)?;
        let (width, height) = match (u16::try_from(width), u16::try_from(height)) {
            (Ok(w), Ok(h)) => (w, h),
            _ => return Err(Error::WrongSize(format!("{width}×{height} is too large for a GIF"))),
        };
        info!(frames = frames.len(), width, height, "frames quantized");

        Ok(Animation {
            frames,
            palette: self.palette.clone(),
            width,
            height,
            delay: self.delay_centiseconds(),
            repeat: self.repeat,
        })
    }
}

impl Animation {
    /// `writer` can be any writer, such as `File` or `&mut Vec`.
    ///
    /// `reporter` hears about every frame as soon as it's written, and can stop the writer.
    pub fn write<W: Write>(&self, writer: W, reporter: &mut dyn ProgressReporter) -> CatResult<W> {
        if self.frames.is_empty() {
            return Err(Error::NoFrames);
        }
        let total = self.frames.len();
        let mut enc = GifWriter::new(writer, self.width, self.height, &palette::to_rgb_bytes(&self.padded_palette()), self.repeat)?;
        for (n, frame) in self.frames.iter().enumerate() {
            enc.write_frame(frame.as_ref(), self.delay)?;
            let progress = FrameProgress { written: n + 1, total, bytes: enc.written_bytes() };
            if !reporter.frame_written(progress) {
                debug!(written = n + 1, total, "stopped writing the animation");
                return Err(Error::Aborted);
            }
        }
        let (writer, bytes) = enc.finish()?;
        reporter.finished(FrameProgress { written: total, total, bytes });
        Ok(writer)
    }

    // GIF palettes must have a power-of-two size
    fn padded_palette(&self) -> Vec<RGB8> {
        let mut pal = self.palette.clone();
        let needed = pal.len().max(2).next_power_of_two();
        pal.resize(needed, RGB8::default());
        pal
    }
}

/// Decodes an image file, guessing the format from its contents rather than its name
pub fn decode_frame(path: &Path) -> CatResult<ImgVec<RGBA8>> {
    let decode_err = |e: image::ImageError| Error::Decode(path.to_path_buf(), e);
    let img = image::ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|e| decode_err(e.into()))?
        .decode()
        .map_err(decode_err)?
        .into_rgba8();

    let (width, height) = img.dimensions();
    let buf = img.into_raw()
        .chunks_exact(4)
        .map(|px| RGBA8::new(px[0], px[1], px[2], px[3]))
        .collect();
    Ok(ImgVec::new(buf, width as usize, height as usize))
}
