//! Result types returned by the controller.

use serde::{Deserialize, Serialize};

/// Size of a page in PDF units (points, 1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Both dimensions multiplied by `factor`.
    pub fn scaled(self, factor: f32) -> Self {
        Self {
            width: self.width * factor,
            height: self.height * factor,
        }
    }
}

/// Per-page information reported by [`crate::inspect`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageInfo {
    /// 0-based page index.
    pub index: usize,
    pub size: PageSize,
}

/// Structural information about a PDF, gathered without rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub page_count: usize,
    pub pdf_version: String,
    pub is_encrypted: bool,
    pub title: Option<String>,
    pub pages: Vec<PageInfo>,
}

/// Timing and volume statistics for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub page_count: usize,
    /// Words placed in the text layers across all pages.
    pub total_words: usize,
    pub render_duration_ms: u64,
    pub ocr_duration_ms: u64,
    pub stamp_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// The stamped document together with what went into it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StampReport {
    /// Serialised output PDF.
    #[serde(skip)]
    pub pdf: Vec<u8>,
    /// The exact label drawn on the first page.
    pub label: String,
    pub stats: RunStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_scaling() {
        let s = PageSize::new(612.0, 792.0).scaled(4.0);
        assert_eq!(s, PageSize::new(2448.0, 3168.0));
        assert_eq!(s.scaled(0.25), PageSize::new(612.0, 792.0));
    }

    #[test]
    fn report_json_omits_pdf_bytes() {
        let report = StampReport {
            pdf: vec![1, 2, 3],
            label: "FILED 1/1/2024 Acme".into(),
            stats: RunStats {
                page_count: 2,
                ..Default::default()
            },
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("FILED 1/1/2024 Acme"));
        assert!(!json.contains("\"pdf\""));
    }
}
