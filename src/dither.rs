//! Floyd–Steinberg remapping to a fixed palette

use imgref::{ImgRef, ImgVec};
use rgb::{RGB8, RGBA8};
use std::collections::HashMap;

/// Remaps `image` to indices into `palette`, diffusing the quantization error to
/// neighbouring pixels (7/16 right, 3/16 below-left, 5/16 below, 1/16 below-right).
///
/// Rows are scanned top to bottom, each left to right, so the output is fully determined
/// by the input. Translucent pixels are composited onto black first, because the palette
/// has no transparent entry.
pub fn floyd_steinberg(image: ImgRef<'_, RGBA8>, palette: &[RGB8]) -> ImgVec<u8> {
    assert!(!palette.is_empty() && palette.len() <= 256);

    let width = image.width();
    let mut out = Vec::with_capacity(width * image.height());
    let mut nearest = Nearest::new(palette);

    // Errors are kept ×16, with a padding column on either side
    let mut curr_err = vec![[0_i32; 3]; width + 2];
    let mut next_err = vec![[0_i32; 3]; width + 2];

    for row in image.rows() {
        for (x, &px) in row.iter().enumerate() {
            let px = composite_on_black(px);
            let e = curr_err[x + 1];
            let wanted = [
                (i32::from(px.r) + e[0] / 16).clamp(0, 255),
                (i32::from(px.g) + e[1] / 16).clamp(0, 255),
                (i32::from(px.b) + e[2] / 16).clamp(0, 255),
            ];
            let idx = nearest.index_of(RGB8::new(wanted[0] as u8, wanted[1] as u8, wanted[2] as u8));
            out.push(idx);

            let got = palette[usize::from(idx)];
            let err = [
                wanted[0] - i32::from(got.r),
                wanted[1] - i32::from(got.g),
                wanted[2] - i32::from(got.b),
            ];
            for c in 0..3 {
                curr_err[x + 2][c] += err[c] * 7;
                next_err[x][c] += err[c] * 3;
                next_err[x + 1][c] += err[c] * 5;
                next_err[x + 2][c] += err[c];
            }
        }
        std::mem::swap(&mut curr_err, &mut next_err);
        next_err.fill([0; 3]);
    }

    ImgVec::new(out, width, image.height())
}

#[inline]
fn composite_on_black(px: RGBA8) -> RGB8 {
    if px.a == 255 {
        return RGB8::new(px.r, px.g, px.b);
    }
    let a = u16::from(px.a);
    let mul = |c: u8| ((u16::from(c) * a + 127) / 255) as u8;
    RGB8::new(mul(px.r), mul(px.g), mul(px.b))
}

/// Exhaustive nearest-colour search, memoized per colour.
///
/// Ties go to the lowest palette index.
struct Nearest<'pal> {
    palette: &'pal [RGB8],
    cache: HashMap<[u8; 3], u8>,
}

impl<'pal> Nearest<'pal> {
    fn new(palette: &'pal [RGB8]) -> Self {
        Self { palette, cache: HashMap::new() }
    }

    fn index_of(&mut self, c: RGB8) -> u8 {
        let palette = self.palette;
        *self.cache.entry([c.r, c.g, c.b]).or_insert_with(|| {
            let mut best = 0;
            let mut best_diff = u32::MAX;
            for (i, p) in palette.iter().enumerate() {
                let diff = sq_diff(c.r, p.r) + sq_diff(c.g, p.g) + sq_diff(c.b, p.b);
                if diff < best_diff {
                    best = i;
                    best_diff = diff;
                    if diff == 0 {
                        break;
                    }
                }
            }
            best as u8
        })
    }
}

#[inline]
fn sq_diff(a: u8, b: u8) -> u32 {
    let d = i32::from(a) - i32::from(b);
    (d * d) as u32
}
