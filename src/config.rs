//! Configuration types for a stamping run.
//!
//! All run behaviour is controlled through [`StampConfig`], built via its
//! [`StampConfigBuilder`]. Every knob lives in one struct so a config can be
//! shared across threads, logged, and diffed between two runs.
//!
//! The two scale factors of the pipeline (supersampling before OCR, shrinking
//! back afterwards) are deliberately *one* value: [`ScaleFactor`] stores the
//! forward factor and derives its inverse, so the two can never drift apart.

use crate::error::PipelineError;
use crate::progress::StampProgressCallback;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

// ── Scale factor ─────────────────────────────────────────────────────────

/// Supersampling factor applied before rasterisation, together with the
/// inverse the stamper applies afterwards.
///
/// Construction only accepts powers of two. Their inverse is exact in binary
/// floating point, so `size × forward × inverse == size` for every page size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f32", into = "f32")]
pub struct ScaleFactor {
    forward: f32,
}

impl ScaleFactor {
    pub const MIN: f32 = 1.0;
    pub const MAX: f32 = 8.0;

    /// Validate and wrap a forward supersampling factor.
    pub fn new(forward: f32) -> Result<Self, PipelineError> {
        if !forward.is_finite() || !(Self::MIN..=Self::MAX).contains(&forward) {
            return Err(PipelineError::InvalidConfig(format!(
                "scale factor must be within {}–{}, got {forward}",
                Self::MIN,
                Self::MAX
            )));
        }
        if forward.log2().fract() != 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "scale factor {forward} has no exact reciprocal; use 1, 2, 4 or 8"
            )));
        }
        Ok(Self { forward })
    }

    /// The factor applied when rasterising.
    pub fn forward(&self) -> f32 {
        self.forward
    }

    /// The factor applied when shrinking OCR pages back to source size.
    pub fn inverse(&self) -> f32 {
        1.0 / self.forward
    }
}

impl Default for ScaleFactor {
    fn default() -> Self {
        Self { forward: 4.0 }
    }
}

impl TryFrom<f32> for ScaleFactor {
    type Error = PipelineError;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ScaleFactor> for f32 {
    fn from(value: ScaleFactor) -> Self {
        value.forward
    }
}

// ── Raster encoding ──────────────────────────────────────────────────────

/// How rasterised pages are encoded before OCR and embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RasterFormat {
    /// Lossy JPEG; embedded into the OCR page verbatim as `DCTDecode`.
    Jpeg { quality: u8 },
    /// Lossless PNG; embedded as Flate-compressed RGB samples.
    Png,
}

impl Default for RasterFormat {
    fn default() -> Self {
        RasterFormat::Jpeg { quality: 92 }
    }
}

// ── Label ────────────────────────────────────────────────────────────────

/// The text of the filing stamp: `"{prefix} {date} {organization}"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StampLabel {
    pub prefix: String,
    pub organization: String,
    /// `chrono` strftime pattern for the date. Default: US short date.
    pub date_format: String,
}

impl Default for StampLabel {
    fn default() -> Self {
        Self {
            prefix: "FILED".to_string(),
            organization: "NYS Department of State".to_string(),
            date_format: "%-m/%-d/%Y".to_string(),
        }
    }
}

impl StampLabel {
    /// Render the label for the given run date.
    ///
    /// Fails when `date_format` names fields a calendar date does not have
    /// (`%H`, `%Z`, ...) or is not a valid strftime pattern.
    pub fn render(&self, date: NaiveDate) -> Result<String, PipelineError> {
        let mut text = String::new();
        write!(
            text,
            "{} {} {}",
            self.prefix,
            date.format(&self.date_format),
            self.organization
        )
        .map_err(|_| PipelineError::Stamp {
            detail: format!(
                "date format '{}' cannot be applied to a calendar date",
                self.date_format
            ),
        })?;
        Ok(text)
    }
}

/// Placement and appearance of the label on the first page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StampStyle {
    /// Distance of the baseline origin from the left edge.
    pub offset_x: f32,
    /// Distance of the baseline origin from the top edge.
    pub offset_top: f32,
    /// One of the standard 14 fonts, e.g. `Helvetica`.
    pub font: String,
    pub font_size: f32,
    /// Fill colour as RGB components in 0.0–1.0.
    pub color: [f32; 3],
}

impl Default for StampStyle {
    fn default() -> Self {
        Self {
            offset_x: 50.0,
            offset_top: 50.0,
            font: "Helvetica".to_string(),
            font_size: 11.0,
            color: [0.95, 0.1, 0.1],
        }
    }
}

// ── OCR ──────────────────────────────────────────────────────────────────

/// Settings fixed when the OCR engine is initialised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrSettings {
    /// Language model, e.g. `eng` or `eng+deu`.
    pub language: String,
    /// Directory holding the language models (tessdata). `None` uses the
    /// engine's built-in location.
    pub model_dir: Option<PathBuf>,
    /// Tesseract page segmentation mode.
    pub page_segmentation_mode: u8,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            model_dir: None,
            page_segmentation_mode: 3,
        }
    }
}

// ── Run configuration ────────────────────────────────────────────────────

/// Configuration for a stamping run.
///
/// Built via [`StampConfig::builder()`] or using [`StampConfig::default()`].
///
/// # Example
/// ```rust
/// use pdf_filing_stamp::StampConfig;
///
/// let config = StampConfig::builder()
///     .scale(4.0)
///     .organization("NYS Department of State")
///     .language("eng")
///     .build()
///     .unwrap();
/// assert_eq!(config.scale.inverse(), 0.25);
/// ```
#[derive(Clone)]
pub struct StampConfig {
    /// Supersampling factor (and its derived inverse). Default: 4.0.
    pub scale: ScaleFactor,

    /// Encoding of rasterised pages. Default: JPEG, quality 92.
    pub raster_format: RasterFormat,

    /// Uniform scale applied to the embedded first page. Default: 0.9.
    pub fit_scale: f32,

    /// Stamp text.
    pub label: StampLabel,

    /// Stamp placement and appearance.
    pub style: StampStyle,

    /// Date printed in the stamp. `None` uses today's local date.
    pub stamp_date: Option<NaiveDate>,

    /// OCR engine settings.
    pub ocr: OcrSettings,

    /// Explicit libpdfium location. Falls back to `PDFIUM_LIB_PATH`, then to
    /// the system library.
    pub pdfium_library: Option<PathBuf>,

    /// User password for encrypted input documents.
    pub password: Option<String>,

    /// Title written into the output document info. Default: "Stamped PDF".
    pub document_title: String,

    /// Optional per-page progress events.
    pub progress_callback: Option<Arc<dyn StampProgressCallback>>,

    /// Cooperative cancellation flag, checked between pages.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for StampConfig {
    fn default() -> Self {
        Self {
            scale: ScaleFactor::default(),
            raster_format: RasterFormat::default(),
            fit_scale: 0.9,
            label: StampLabel::default(),
            style: StampStyle::default(),
            stamp_date: None,
            ocr: OcrSettings::default(),
            pdfium_library: None,
            password: None,
            document_title: "Stamped PDF".to_string(),
            progress_callback: None,
            cancel: None,
        }
    }
}

impl fmt::Debug for StampConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StampConfig")
            .field("scale", &self.scale)
            .field("raster_format", &self.raster_format)
            .field("fit_scale", &self.fit_scale)
            .field("label", &self.label)
            .field("style", &self.style)
            .field("stamp_date", &self.stamp_date)
            .field("ocr", &self.ocr)
            .field("pdfium_library", &self.pdfium_library)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("document_title", &self.document_title)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn StampProgressCallback>"),
            )
            .field("cancel", &self.cancel.is_some())
            .finish()
    }
}

impl StampConfig {
    /// Create a new builder for `StampConfig`.
    pub fn builder() -> StampConfigBuilder {
        StampConfigBuilder {
            config: Self::default(),
            scale: None,
        }
    }

    /// The date the label will carry for a run started now.
    pub fn effective_date(&self) -> NaiveDate {
        self.stamp_date
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }
}

/// Builder for [`StampConfig`].
#[derive(Debug)]
pub struct StampConfigBuilder {
    config: StampConfig,
    /// Raw forward factor, validated in `build()`.
    scale: Option<f32>,
}

impl StampConfigBuilder {
    pub fn scale(mut self, forward: f32) -> Self {
        self.scale = Some(forward);
        self
    }

    pub fn raster_format(mut self, format: RasterFormat) -> Self {
        self.config.raster_format = format;
        self
    }

    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.raster_format = RasterFormat::Jpeg {
            quality: quality.clamp(1, 100),
        };
        self
    }

    pub fn fit_scale(mut self, fit: f32) -> Self {
        self.config.fit_scale = fit;
        self
    }

    pub fn label(mut self, label: StampLabel) -> Self {
        self.config.label = label;
        self
    }

    pub fn organization(mut self, organization: impl Into<String>) -> Self {
        self.config.label.organization = organization.into();
        self
    }

    pub fn label_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.label.prefix = prefix.into();
        self
    }

    pub fn date_format(mut self, format: impl Into<String>) -> Self {
        self.config.label.date_format = format.into();
        self
    }

    pub fn style(mut self, style: StampStyle) -> Self {
        self.config.style = style;
        self
    }

    pub fn stamp_date(mut self, date: NaiveDate) -> Self {
        self.config.stamp_date = Some(date);
        self
    }

    pub fn ocr(mut self, ocr: OcrSettings) -> Self {
        self.config.ocr = ocr;
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.config.ocr.language = language.into();
        self
    }

    pub fn model_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.ocr.model_dir = Some(dir.into());
        self
    }

    pub fn pdfium_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library = Some(path.into());
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn document_title(mut self, title: impl Into<String>) -> Self {
        self.config.document_title = title.into();
        self
    }

    pub fn progress_callback(mut self, cb: Arc<dyn StampProgressCallback>) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.config.cancel = Some(flag);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(mut self) -> Result<StampConfig, PipelineError> {
        if let Some(forward) = self.scale {
            self.config.scale = ScaleFactor::new(forward)?;
        }

        let c = &self.config;
        if !(c.fit_scale > 0.0 && c.fit_scale <= 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "fit scale must be within (0, 1], got {}",
                c.fit_scale
            )));
        }
        if let RasterFormat::Jpeg { quality } = c.raster_format {
            if quality == 0 || quality > 100 {
                return Err(PipelineError::InvalidConfig(format!(
                    "JPEG quality must be 1–100, got {quality}"
                )));
            }
        }
        if !(c.style.font_size > 0.0) {
            return Err(PipelineError::InvalidConfig(
                "label font size must be positive".into(),
            ));
        }
        if c.style.color.iter().any(|v| !(0.0..=1.0).contains(v)) {
            return Err(PipelineError::InvalidConfig(
                "label colour components must be within 0.0–1.0".into(),
            ));
        }
        if let Err(e) = c.label.render(NaiveDate::default()) {
            return Err(PipelineError::InvalidConfig(match e {
                PipelineError::Stamp { detail } => detail,
                other => other.to_string(),
            }));
        }
        if c.ocr.language.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "OCR language must not be empty".into(),
            ));
        }
        if c.ocr.page_segmentation_mode > 13 {
            return Err(PipelineError::InvalidConfig(format!(
                "page segmentation mode must be 0–13, got {}",
                c.ocr.page_segmentation_mode
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_scale_is_reciprocal() {
        let s = ScaleFactor::default();
        assert_eq!(s.forward(), 4.0);
        assert_eq!(s.inverse(), 0.25);
        assert_eq!(s.forward() * s.inverse(), 1.0);
    }

    #[test]
    fn scale_round_trips_page_sizes() {
        let s = ScaleFactor::new(4.0).unwrap();
        for size in [612.0_f32, 792.0, 595.28, 841.89, 1.0] {
            assert_eq!(size * s.forward() * s.inverse(), size);
        }
    }

    #[test]
    fn scale_out_of_range_rejected() {
        assert!(ScaleFactor::new(0.5).is_err());
        assert!(ScaleFactor::new(16.0).is_err());
        assert!(ScaleFactor::new(f32::NAN).is_err());
        assert!(ScaleFactor::new(f32::INFINITY).is_err());
    }

    #[test]
    fn scale_without_exact_inverse_rejected() {
        for forward in [3.0_f32, 5.0, 6.0, 7.0, 1.5] {
            assert!(ScaleFactor::new(forward).is_err(), "{forward} accepted");
        }
        for forward in [1.0_f32, 2.0, 4.0, 8.0] {
            assert!(ScaleFactor::new(forward).is_ok(), "{forward} rejected");
        }
    }

    #[test]
    fn accepted_scales_round_trip_every_size() {
        for forward in [1.0_f32, 2.0, 4.0, 8.0] {
            let s = ScaleFactor::new(forward).unwrap();
            for i in 1..2000 {
                let size = i as f32 * 0.37;
                assert_eq!(size * s.forward() * s.inverse(), size, "{forward}× drifts at {size}");
            }
        }
    }

    #[test]
    fn scale_deserialises_through_validation() {
        let s: ScaleFactor = serde_json::from_str("2.0").unwrap();
        assert_eq!(s.inverse(), 0.5);
        assert!(serde_json::from_str::<ScaleFactor>("0.1").is_err());
    }

    #[test]
    fn label_renders_us_short_date() {
        let label = StampLabel::default();
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(
            label.render(date).unwrap(),
            "FILED 3/7/2024 NYS Department of State"
        );
    }

    #[test]
    fn label_custom_format() {
        let label = StampLabel {
            prefix: "RECEIVED".into(),
            organization: "Acme Corp".into(),
            date_format: "%Y-%m-%d".into(),
        };
        let date = NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
        assert_eq!(label.render(date).unwrap(), "RECEIVED 2025-12-31 Acme Corp");
    }

    #[test]
    fn time_only_date_format_fails_to_render() {
        let label = StampLabel {
            date_format: "%H:%M".into(),
            ..StampLabel::default()
        };
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        let err = label.render(date).unwrap_err();
        assert!(matches!(err, PipelineError::Stamp { .. }), "got {err:?}");
    }

    #[test]
    fn builder_rejects_unusable_date_format() {
        for pattern in ["%H:%M", "%Q", "%Y-%"] {
            let err = StampConfig::builder().date_format(pattern).build().unwrap_err();
            assert!(matches!(err, PipelineError::InvalidConfig(_)), "{pattern}: {err:?}");
        }
        assert!(StampConfig::builder().date_format("%d %B %Y").build().is_ok());
    }

    #[test]
    fn builder_defaults() {
        let c = StampConfig::builder().build().unwrap();
        assert_eq!(c.scale.forward(), 4.0);
        assert_eq!(c.fit_scale, 0.9);
        assert_eq!(c.style.font_size, 11.0);
        assert_eq!(c.ocr.language, "eng");
        assert_eq!(c.document_title, "Stamped PDF");
        assert_eq!(c.raster_format, RasterFormat::Jpeg { quality: 92 });
    }

    #[test]
    fn builder_rejects_bad_values() {
        assert!(StampConfig::builder().scale(0.0).build().is_err());
        assert!(StampConfig::builder().fit_scale(1.5).build().is_err());
        assert!(StampConfig::builder().fit_scale(0.0).build().is_err());
        assert!(StampConfig::builder().language("  ").build().is_err());
    }

    #[test]
    fn builder_jpeg_quality_is_clamped() {
        let c = StampConfig::builder().jpeg_quality(0).build().unwrap();
        assert_eq!(c.raster_format, RasterFormat::Jpeg { quality: 1 });
    }

    #[test]
    fn injected_date_wins() {
        let date = NaiveDate::from_ymd_opt(2020, 1, 2).unwrap();
        let c = StampConfig::builder().stamp_date(date).build().unwrap();
        assert_eq!(c.effective_date(), date);
    }

    #[test]
    fn debug_redacts_password() {
        let c = StampConfig::builder().password("hunter2").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("hunter2"));
    }
}
