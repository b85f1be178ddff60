use serde::{Deserialize, Serialize};

use crate::{Hertz, StreamKey};

/// What the display currently shows: the crop target for waterfall tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportExtent {
    /// Center frequency
    pub center_frequency: Hertz,
    /// Displayed span
    pub bandwidth: Hertz,
    /// Horizontal display pixels
    pub pixel_width: u32,
}

impl ViewportExtent {
    /// Left edge of the display in Hz. May be negative for a malformed extent.
    pub fn left_bound_hz(&self) -> f64 {
        self.center_frequency.as_f64() - self.bandwidth.as_f64() / 2.0
    }

    /// Span of a single display pixel in Hz.
    pub fn pixel_span_hz(&self) -> f64 {
        self.bandwidth.as_f64() / f64::from(self.pixel_width)
    }

    /// An extent with no pixels or no span has nothing to crop to.
    pub fn is_empty(&self) -> bool {
        self.pixel_width == 0 || self.bandwidth.as_hz() == 0
    }
}

/// Geometry of one panadapter, as reported by the radio.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PanadapterDescriptor {
    pub stream: StreamKey,
    pub center: Hertz,
    pub bandwidth: Hertz,
    pub x_pixels: u32,
    pub y_pixels: u32,
    /// Waterfall stream paired with this panadapter, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waterfall: Option<StreamKey>,
}

impl PanadapterDescriptor {
    pub fn new(stream: StreamKey) -> Self {
        Self {
            stream,
            center: Hertz(0),
            bandwidth: Hertz(0),
            x_pixels: 0,
            y_pixels: 0,
            waterfall: None,
        }
    }

    pub fn extent(&self) -> ViewportExtent {
        ViewportExtent {
            center_frequency: self.center,
            bandwidth: self.bandwidth,
            pixel_width: self.x_pixels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent_geometry() {
        let extent = ViewportExtent {
            center_frequency: Hertz::mhz(14),
            bandwidth: Hertz::khz(200),
            pixel_width: 100,
        };
        assert_eq!(extent.left_bound_hz(), 13_900_000.0);
        assert_eq!(extent.pixel_span_hz(), 2_000.0);
        assert!(!extent.is_empty());
    }

    #[test]
    fn test_descriptor_json_shape() {
        let mut pan = PanadapterDescriptor::new(StreamKey(0x4000_0000));
        pan.center = Hertz::mhz(14);
        pan.bandwidth = Hertz::khz(200);
        pan.x_pixels = 1024;
        pan.y_pixels = 700;

        let json = serde_json::to_value(&pan).unwrap();
        assert_eq!(json["stream"], 0x4000_0000u32);
        assert_eq!(json["center"], 14_000_000u64);
        assert_eq!(json["x_pixels"], 1024);
        assert!(json.get("waterfall").is_none());
    }
}
