//! # Resample Options
//!
//! Resolves an ordered list of [`OptionFlag`]s into a canonical
//! [`ResampleOptions`] triple of method, filter and output format.

use std::fmt;
use std::str::FromStr;

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// How the source is mapped onto the target box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResampleMethod {
    FillCenter,
    FillTopLeft,
    FillBottomRight,
    Fit,
    Resize,
}

impl ResampleMethod {
    /// Short name used in logs and in the canonical cache key form.
    pub fn name(self) -> &'static str {
        match self {
            ResampleMethod::FillCenter => "center",
            ResampleMethod::FillTopLeft => "left",
            ResampleMethod::FillBottomRight => "right",
            ResampleMethod::Fit => "fit",
            ResampleMethod::Resize => "resize",
        }
    }
}

impl fmt::Display for ResampleMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Interpolation kernel for the scaling step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResampleFilter {
    /// High quality Lanczos3 kernel.
    Default,
    NearestNeighbor,
}

impl ResampleFilter {
    pub fn name(self) -> &'static str {
        match self {
            ResampleFilter::Default => "lanczos3",
            ResampleFilter::NearestNeighbor => "nearest",
        }
    }

    pub fn filter_type(self) -> FilterType {
        match self {
            ResampleFilter::Default => FilterType::Lanczos3,
            ResampleFilter::NearestNeighbor => FilterType::Nearest,
        }
    }
}

/// Encoded output format of a thumbnail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThumbFormat {
    Jpeg,
    Png,
}

impl ThumbFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ThumbFormat::Jpeg => "jpg",
            ThumbFormat::Png => "png",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ThumbFormat::Jpeg => "image/jpeg",
            ThumbFormat::Png => "image/png",
        }
    }
}

/// A single resample flag as accepted from callers. Each flag touches exactly
/// one axis of [`ResampleOptions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionFlag {
    FillCenter,
    FillTopLeft,
    FillBottomRight,
    Fit,
    Resize,
    NearestNeighbor,
    DefaultFilter,
    Png,
    Jpeg,
}

impl OptionFlag {
    /// Parses a comma-separated flag list such as `"center,png"`.
    ///
    /// Unknown names are skipped so that older servers keep working with newer
    /// clients.
    pub fn parse_list(raw: &str) -> Vec<OptionFlag> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| match s.parse() {
                Ok(flag) => Some(flag),
                Err(_) => {
                    trace!(flag = s, "Ignoring unknown resample flag");
                    None
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFlag(pub String);

impl FromStr for OptionFlag {
    type Err = UnknownFlag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let flag = match s.to_ascii_lowercase().as_str() {
            "center" | "fill_center" => OptionFlag::FillCenter,
            "left" | "fill_top_left" => OptionFlag::FillTopLeft,
            "right" | "fill_bottom_right" => OptionFlag::FillBottomRight,
            "fit" => OptionFlag::Fit,
            "resize" => OptionFlag::Resize,
            "nearest" => OptionFlag::NearestNeighbor,
            "default" => OptionFlag::DefaultFilter,
            "png" => OptionFlag::Png,
            "jpeg" | "jpg" => OptionFlag::Jpeg,
            _ => return Err(UnknownFlag(s.to_string())),
        };
        Ok(flag)
    }
}

/// Canonical, immutable resample settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResampleOptions {
    pub method: ResampleMethod,
    pub filter: ResampleFilter,
    pub format: ThumbFormat,
}

impl Default for ResampleOptions {
    fn default() -> Self {
        Self {
            method: ResampleMethod::Fit,
            filter: ResampleFilter::Default,
            format: ThumbFormat::Jpeg,
        }
    }
}

impl ResampleOptions {
    /// Folds `flags` into a triple. Later flags win over earlier ones on the
    /// same axis.
    pub fn resolve(flags: &[OptionFlag]) -> Self {
        let defaults = Self::default();
        let mut method = defaults.method;
        let mut filter = defaults.filter;
        let mut format = defaults.format;

        for flag in flags {
            match flag {
                OptionFlag::FillCenter => method = ResampleMethod::FillCenter,
                OptionFlag::FillTopLeft => method = ResampleMethod::FillTopLeft,
                OptionFlag::FillBottomRight => method = ResampleMethod::FillBottomRight,
                OptionFlag::Fit => method = ResampleMethod::Fit,
                OptionFlag::Resize => method = ResampleMethod::Resize,
                OptionFlag::NearestNeighbor => filter = ResampleFilter::NearestNeighbor,
                OptionFlag::DefaultFilter => filter = ResampleFilter::Default,
                OptionFlag::Png => format = ThumbFormat::Png,
                OptionFlag::Jpeg => format = ThumbFormat::Jpeg,
            }
        }

        Self {
            method,
            filter,
            format,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_flags_resolve_to_defaults() {
        let opts = ResampleOptions::resolve(&[]);
        assert_eq!(opts.method, ResampleMethod::Fit);
        assert_eq!(opts.filter, ResampleFilter::Default);
        assert_eq!(opts.format, ThumbFormat::Jpeg);
    }

    #[test]
    fn last_flag_wins_per_axis() {
        let opts = ResampleOptions::resolve(&[
            OptionFlag::FillTopLeft,
            OptionFlag::NearestNeighbor,
            OptionFlag::Png,
            OptionFlag::FillBottomRight,
            OptionFlag::DefaultFilter,
        ]);
        assert_eq!(opts.method, ResampleMethod::FillBottomRight);
        assert_eq!(opts.filter, ResampleFilter::Default);
        assert_eq!(opts.format, ThumbFormat::Png);
    }

    #[test]
    fn axes_are_independent() {
        let opts = ResampleOptions::resolve(&[OptionFlag::Png, OptionFlag::Resize]);
        assert_eq!(opts.method, ResampleMethod::Resize);
        assert_eq!(opts.filter, ResampleFilter::Default);
        assert_eq!(opts.format, ThumbFormat::Png);
    }

    #[test]
    fn parse_list_skips_unknown_names() {
        let flags = OptionFlag::parse_list("center, sepia,PNG,,nearest");
        assert_eq!(
            flags,
            vec![
                OptionFlag::FillCenter,
                OptionFlag::Png,
                OptionFlag::NearestNeighbor
            ]
        );
    }

    #[test]
    fn method_names_are_stable() {
        assert_eq!(ResampleMethod::FillCenter.to_string(), "center");
        assert_eq!(ResampleMethod::FillTopLeft.name(), "left");
        assert_eq!(ResampleMethod::FillBottomRight.name(), "right");
        assert_eq!(ResampleMethod::Fit.name(), "fit");
        assert_eq!(ResampleMethod::Resize.name(), "resize");
    }
}
