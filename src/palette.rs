//! The fixed palette shared by every frame

use rgb::RGB8;

/// The 256-colour Plan 9 palette.
///
/// It's a 4×4×4 colour cube where each cell is subdivided into 4 intensity levels,
/// so it covers both saturated colours and greys reasonably evenly.
pub fn plan9() -> Vec<RGB8> {
    let mut pal = vec![RGB8::default(); 256];
    let mut i = 0;
    for r in 0..4_i32 {
        for v in 0..4_i32 {
            let mut j = v - r;
            for g in 0..4_i32 {
                for b in 0..4_i32 {
                    let den = r.max(g).max(b);
                    let c = if den == 0 {
                        let grey = (0x11 * v) as u8;
                        RGB8::new(grey, grey, grey)
                    } else {
                        let num = 17 * (4 * den + v);
                        RGB8::new((r * num / den) as u8, (g * num / den) as u8, (b * num / den) as u8)
                    };
                    pal[i + (j & 0x0f) as usize] = c;
                    j += 1;
                }
            }
            i += 16;
        }
    }
    pal
}

/// Palette as the flat `[r, g, b, r, g, b, …]` bytes GIF headers use
pub fn to_rgb_bytes(pal: &[RGB8]) -> Vec<u8> {
    pal.iter().flat_map(|c| [c.r, c.g, c.b]).collect()
}
