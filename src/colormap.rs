use serde::Serialize;
use std::fmt;

/// Simple RGB color.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const YELLOW: Rgb = Rgb { r: 255, g: 255, b: 0 };
    pub const RED: Rgb = Rgb { r: 255, g: 0, b: 0 };

    fn lerp(self, other: Rgb, t: f64) -> Rgb {
        let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
        Rgb {
            r: mix(self.r, other.r),
            g: mix(self.g, other.g),
            b: mix(self.b, other.b),
        }
    }
}

impl fmt::Display for Rgb {
    /// Format as CSS hex: #rrggbb
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl Serialize for Rgb {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Maps values in `[vmin, vmax]` linearly from `low` to `high`.
///
/// When `vmin == vmax` the scale is degenerate and every value maps to `low`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinearColormap {
    pub low: Rgb,
    pub high: Rgb,
    pub vmin: f64,
    pub vmax: f64,
}

impl LinearColormap {
    pub fn new(low: Rgb, high: Rgb, vmin: f64, vmax: f64) -> Self {
        let (vmin, vmax) = if vmin <= vmax { (vmin, vmax) } else { (vmax, vmin) };
        Self { low, high, vmin, vmax }
    }

    /// Yellow to red over the min and max of `values`. An empty input gives a
    /// degenerate scale at zero.
    pub fn yellow_to_red(values: impl IntoIterator<Item = f64>) -> Self {
        let (vmin, vmax) = values
            .into_iter()
            .filter(|v| v.is_finite())
            .fold(None, |acc: Option<(f64, f64)>, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
            .unwrap_or((0.0, 0.0));
        Self::new(Rgb::YELLOW, Rgb::RED, vmin, vmax)
    }

    pub fn is_degenerate(&self) -> bool {
        self.vmax - self.vmin <= f64::EPSILON * self.vmax.abs().max(1.0)
    }

    /// Position of `value` in the domain, clamped to [0, 1].
    fn position(&self, value: f64) -> f64 {
        if self.is_degenerate() || !value.is_finite() {
            return 0.0;
        }
        ((value - self.vmin) / (self.vmax - self.vmin)).clamp(0.0, 1.0)
    }

    pub fn color(&self, value: f64) -> Rgb {
        self.low.lerp(self.high, self.position(value))
    }

    /// `n` evenly spaced tick values across the domain, or one tick if degenerate.
    pub fn ticks(&self, n: usize) -> Vec<f64> {
        if self.is_degenerate() || n < 2 {
            return vec![self.vmin];
        }
        let step = (self.vmax - self.vmin) / (n - 1) as f64;
        (0..n).map(|i| self.vmin + step * i as f64).collect()
    }
}
