use crate::error::CatResult;
use gif::Repeat;
use imgref::ImgRef;
use std::borrow::Cow;
use std::cell::Cell;
use std::io::Write;
use std::rc::Rc;

struct CountingWriter<W> {
    writer: W,
    written: Rc<Cell<u64>>,
}

impl<W: Write> Write for CountingWriter<W> {
    #[inline(always)]
    fn write(&mut self, buf: &[u8]) -> Result<usize, std::io::Error> {
        let len = self.writer.write(buf)?;
        self.written.set(self.written.get() + len as u64);
        Ok(len)
    }

    #[inline(always)]
    fn flush(&mut self) -> Result<(), std::io::Error> {
        self.writer.flush()
    }
}

/// Writes paletted frames that all use the global palette and cover the whole screen
pub(crate) struct GifWriter<W: Write> {
    written: Rc<Cell<u64>>,
    gif_enc: gif::Encoder<CountingWriter<W>>,
    width: u16,
    height: u16,
}

impl<W: Write> GifWriter<W> {
    /// Writes the header right away. `palette` is `[r, g, b, …]`.
    pub fn new(writer: W, width: u16, height: u16, palette: &[u8], repeat: Repeat) -> CatResult<Self> {
        let written = Rc::new(Cell::new(0));
        let w = CountingWriter {
            writer,
            written: written.clone(),
        };
        let mut gif_enc = gif::Encoder::new(w, width, height, palette)?;
        gif_enc.set_repeat(repeat)?;
        Ok(Self { written, gif_enc, width, height })
    }

    #[cfg_attr(debug_assertions, track_caller)]
    pub fn write_frame(&mut self, image: ImgRef<'_, u8>, delay: u16) -> CatResult<()> {
        debug_assert_eq!((image.width(), image.height()), (self.width.into(), self.height.into()));
        debug_assert_eq!(image.width(), image.stride());

        let frame = gif::Frame {
            delay,
            dispose: gif::DisposalMethod::Keep,
            width: self.width,
            height: self.height,
            buffer: Cow::Borrowed(image.buf()),
            ..gif::Frame::default()
        };
        self.gif_enc.write_frame(&frame)?;
        Ok(())
    }

    /// Bytes passed to the underlying writer so far
    #[inline]
    pub fn written_bytes(&self) -> u64 {
        self.written.get()
    }

    /// Writes the trailer. Returns the writer and the total number of bytes written.
    pub fn finish(self) -> CatResult<(W, u64)> {
        let written = self.written;
        let writer = self.gif_enc.into_inner()?.writer;
        Ok((writer, written.get()))
    }
}
