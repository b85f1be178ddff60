//! Resampling of native-resolution waterfall tiles onto display pixels.

use vitahub_messages::ViewportExtent;

/// Frequency layout of a completed tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGeometry {
    /// Frequency of native bin 0, in Hz.
    pub frame_low_freq: u64,
    /// Width of one native bin, in Hz.
    pub bin_bandwidth: u64,
    /// Native bins the tile declares.
    pub total_bins: u32,
}

impl TileGeometry {
    fn bin_hz(&self, index: usize) -> f64 {
        self.frame_low_freq as f64 + self.bin_bandwidth as f64 * index as f64
    }
}

/// Crop `samples` to the viewport: one little-endian u16 per display pixel.
///
/// Every pixel takes the last native bin whose frequency is below the pixel's
/// right edge, rounded down to a whole Hz. Bins are scanned once, front to
/// back. The output always has `viewport.pixel_width` pixels; if fewer samples
/// arrived than the geometry declares, cropping stops early and the remaining
/// pixels stay zero.
pub fn crop_to_viewport(geometry: &TileGeometry, samples: &[u16], viewport: &ViewportExtent) -> Vec<u8> {
    if viewport.is_empty() {
        return Vec::new();
    }
    let mut out = vec![0u8; viewport.pixel_width as usize * 2];
    scan(geometry, samples.len(), viewport, |pixel, bin| {
        match out.get_mut(pixel * 2..pixel * 2 + 2) {
            Some(dst) => {
                dst.copy_from_slice(&samples[bin].to_le_bytes());
                true
            }
            // viewport resized under us
            None => false,
        }
    });
    out
}

/// Walk the pixels, calling `write(pixel, bin)` with the source bin of each.
/// Stops when `write` returns false or a source bin lies past `available`.
fn scan(
    geometry: &TileGeometry,
    available: usize,
    viewport: &ViewportExtent,
    mut write: impl FnMut(usize, usize) -> bool,
) {
    let left = viewport.left_bound_hz();
    let span = viewport.pixel_span_hz();
    let total = geometry.total_bins as usize;

    let mut next = 0usize;
    let mut below: Option<usize> = None;

    for pixel in 0..viewport.pixel_width as usize {
        // pixel edges are whole Hz
        let target = (left + span * (pixel + 1) as f64).floor();
        while next < total && geometry.bin_hz(next) < target {
            below = Some(next);
            next += 1;
        }
        let Some(bin) = below else {
            continue;
        };
        if bin >= available {
            return;
        }
        if !write(pixel, bin) {
            return;
        }
    }
}
