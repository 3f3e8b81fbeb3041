use crate::error::{Result, SynthError};
use crate::model::RegionResult;
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, Rgba, RgbaImage};

/// Blend `src` over `dst` with stencil value `m` (0 keeps `dst`, 255 takes `src`).
/// Colour channels only; the destination keeps its own alpha.
#[inline]
pub fn blend_px(dst: Rgba<u8>, src: Rgba<u8>, m: u8) -> Rgba<u8> {
    match m {
        0 => dst,
        255 => Rgba([src[0], src[1], src[2], dst[3]]),
        _ => {
            let m = u16::from(m);
            let inv = 255 - m;
            let mut out = dst;
            for i in 0..3 {
                out[i] = mul_div255(u16::from(src[i]), m)
                    .saturating_add(mul_div255(u16::from(dst[i]), inv));
            }
            out
        }
    }
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

/// Destination/source overlap of a `sw x sh` sprite placed at (dx, dy) on a `cw x ch` canvas.
/// Returns `(canvas_x0, canvas_y0, src_x0, src_y0, w, h)` or None when fully outside.
fn clip(cw: u32, ch: u32, sw: u32, sh: u32, dx: i64, dy: i64) -> Option<(u32, u32, u32, u32, u32, u32)> {
    let x0 = dx.max(0);
    let y0 = dy.max(0);
    let x1 = (dx + i64::from(sw)).min(i64::from(cw));
    let y1 = (dy + i64::from(sh)).min(i64::from(ch));
    if x0 >= x1 || y0 >= y1 {
        return None;
    }
    Some((
        x0 as u32,
        y0 as u32,
        (x0 - dx) as u32,
        (y0 - dy) as u32,
        (x1 - x0) as u32,
        (y1 - y0) as u32,
    ))
}

/// Alpha-composite `src` onto `canvas` with its top-left at (dx, dy), using the
/// sprite's own alpha channel as stencil. Pixels outside the canvas are dropped.
pub fn paste_alpha(src: &RgbaImage, canvas: &mut RgbaImage, dx: i64, dy: i64) {
    let (cw, ch) = canvas.dimensions();
    let (sw, sh) = src.dimensions();
    let Some((cx, cy, sx, sy, w, h)) = clip(cw, ch, sw, sh, dx, dy) else {
        return;
    };
    for yy in 0..h {
        for xx in 0..w {
            let s = *src.get_pixel(sx + xx, sy + yy);
            let d = *canvas.get_pixel(cx + xx, cy + yy);
            canvas.put_pixel(cx + xx, cy + yy, blend_px(d, s, s[3]));
        }
    }
}

/// Canvas-sized mask holding the sprite's alpha at (dx, dy) and zero elsewhere.
pub fn instance_mask(src: &RgbaImage, width: u32, height: u32, dx: i64, dy: i64) -> GrayImage {
    let mut mask = GrayImage::new(width, height);
    if let Some((cx, cy, sx, sy, w, h)) = clip(width, height, src.width(), src.height(), dx, dy) {
        for yy in 0..h {
            for xx in 0..w {
                let a = src.get_pixel(sx + xx, sy + yy)[3];
                mask.put_pixel(cx + xx, cy + yy, Luma([a]));
            }
        }
    }
    mask
}

/// Per-pixel maximum of `mask` into `acc` (union of soft masks).
pub fn union_mask(acc: &mut GrayImage, mask: &GrayImage) -> Result<()> {
    if acc.dimensions() != mask.dimensions() {
        return Err(SynthError::InvalidConfig(format!(
            "mask size {:?} does not match accumulator {:?}",
            mask.dimensions(),
            acc.dimensions()
        )));
    }
    for (a, m) in acc.pixels_mut().zip(mask.pixels()) {
        if m[0] > a[0] {
            *a = *m;
        }
    }
    Ok(())
}

/// Composite `src` over `dst` everywhere, weighted by `stencil`.
pub fn composite_masked(dst: &mut RgbaImage, src: &RgbaImage, stencil: &GrayImage) -> Result<()> {
    if dst.dimensions() != src.dimensions() || dst.dimensions() != stencil.dimensions() {
        return Err(SynthError::InvalidConfig(format!(
            "cannot composite {:?} over {:?} with stencil {:?}",
            src.dimensions(),
            dst.dimensions(),
            stencil.dimensions()
        )));
    }
    for ((d, s), m) in dst.pixels_mut().zip(src.pixels()).zip(stencil.pixels()) {
        *d = blend_px(*d, *s, m[0]);
    }
    Ok(())
}

/// Merge per-region layers (top to bottom) into the final canvas.
///
/// The first region's image is the base; each later region is laid over the
/// accumulator through its own combined mask. Region masks are consumed here.
pub fn compose_regions(regions: Vec<RegionResult>) -> Result<RgbaImage> {
    let mut iter = regions.into_iter();
    let Some(first) = iter.next() else {
        return Err(SynthError::InvalidConfig(
            "no shelf region produced an image".into(),
        ));
    };
    let mut acc = first.image;
    for region in iter {
        composite_masked(&mut acc, &region.image, &region.mask)?;
    }
    Ok(acc)
}

/// Resize a cutout to exactly `w x h` (Lanczos3).
pub fn scale_cutout(src: &RgbaImage, w: u32, h: u32) -> RgbaImage {
    if src.dimensions() == (w, h) {
        return src.clone();
    }
    imageops::resize(src, w, h, FilterType::Lanczos3)
}

/// Rotate counter-clockwise by `degrees`, growing the canvas so no pixel is cut off.
/// Nearest-neighbour sampling; uncovered corners are transparent.
pub fn rotate_expand(src: &RgbaImage, degrees: f64) -> RgbaImage {
    let (sw, sh) = src.dimensions();
    if sw == 0 || sh == 0 {
        return src.clone();
    }
    let (sin, cos) = degrees.to_radians().sin_cos();
    let (fw, fh) = (f64::from(sw), f64::from(sh));
    // bounding box of the rotated rectangle; trim float noise before ceil
    let ow = ((fw * cos.abs() + fh * sin.abs()) - 1e-6).ceil().max(1.0) as u32;
    let oh = ((fw * sin.abs() + fh * cos.abs()) - 1e-6).ceil().max(1.0) as u32;
    let (scx, scy) = (fw / 2.0, fh / 2.0);
    let (ocx, ocy) = (f64::from(ow) / 2.0, f64::from(oh) / 2.0);

    let mut out = RgbaImage::new(ow, oh);
    for oy in 0..oh {
        for ox in 0..ow {
            let x = f64::from(ox) + 0.5 - ocx;
            let y = f64::from(oy) + 0.5 - ocy;
            // inverse of the y-down counter-clockwise rotation
            let sx = x * cos - y * sin + scx;
            let sy = x * sin + y * cos + scy;
            if sx < 0.0 || sy < 0.0 {
                continue;
            }
            let (ix, iy) = (sx.floor() as u32, sy.floor() as u32);
            if ix < sw && iy < sh {
                out.put_pixel(ox, oy, *src.get_pixel(ix, iy));
            }
        }
    }
    out
}
