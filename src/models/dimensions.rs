//! Print geometry derived from pixel dimensions.
//!
//! Everything here is pure: pixel width/height in, ratio class, maximum
//! printable size and sellable size variants out.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Pixels per centimetre at the store's reference print resolution.
pub const PX_PER_CM: f64 = 35.43;
/// Pixels per inch derived from [`PX_PER_CM`].
pub const PX_PER_INCH: f64 = PX_PER_CM * 2.54;
/// Lowest effective DPI a stored variant may have.
pub const MIN_DPI: f64 = 150.0;

const CM_PER_INCH: f64 = 2.54;
const CUSTOM_MAX_WIDTH_CM: f64 = 30.0;

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RatioClass {
    Square,
    #[serde(rename = "landscape_4_3")]
    Landscape4x3,
    #[serde(rename = "landscape_3_2")]
    Landscape3x2,
    #[serde(rename = "landscape_16_9")]
    Landscape16x9,
    PanoramicWide,
    #[serde(rename = "portrait_4_5")]
    Portrait4x5,
    #[serde(rename = "portrait_3_4")]
    Portrait3x4,
    #[serde(rename = "portrait_2_3")]
    Portrait2x3,
    PanoramicTall,
}

impl RatioClass {
    pub const ALL: [RatioClass; 9] = [
        RatioClass::Square,
        RatioClass::Landscape4x3,
        RatioClass::Landscape3x2,
        RatioClass::Landscape16x9,
        RatioClass::PanoramicWide,
        RatioClass::Portrait4x5,
        RatioClass::Portrait3x4,
        RatioClass::Portrait2x3,
        RatioClass::PanoramicTall,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RatioClass::Square => "square",
            RatioClass::Landscape4x3 => "landscape_4_3",
            RatioClass::Landscape3x2 => "landscape_3_2",
            RatioClass::Landscape16x9 => "landscape_16_9",
            RatioClass::PanoramicWide => "panoramic_wide",
            RatioClass::Portrait4x5 => "portrait_4_5",
            RatioClass::Portrait3x4 => "portrait_3_4",
            RatioClass::Portrait2x3 => "portrait_2_3",
            RatioClass::PanoramicTall => "panoramic_tall",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }

    /// Portrait classes hold the catalog height and derive the width.
    pub fn is_portrait(&self) -> bool {
        matches!(
            self,
            RatioClass::Portrait4x5
                | RatioClass::Portrait3x4
                | RatioClass::Portrait2x3
                | RatioClass::PanoramicTall
        )
    }

    /// Nominal (width, height) in cm for Small, Medium, Large, X-Large.
    fn catalog(&self) -> [(f64, f64); 4] {
        match self {
            RatioClass::Square => [(30.0, 30.0), (50.0, 50.0), (70.0, 70.0), (100.0, 100.0)],
            RatioClass::Landscape4x3 => [(40.0, 30.0), (60.0, 45.0), (80.0, 60.0), (120.0, 90.0)],
            RatioClass::Landscape3x2 => [(30.0, 20.0), (45.0, 30.0), (60.0, 40.0), (90.0, 60.0)],
            RatioClass::Landscape16x9 => [(40.0, 22.5), (64.0, 36.0), (96.0, 54.0), (128.0, 72.0)],
            RatioClass::PanoramicWide => [(40.0, 15.0), (80.0, 30.0), (120.0, 45.0), (160.0, 60.0)],
            RatioClass::Portrait4x5 => [(24.0, 30.0), (40.0, 50.0), (56.0, 70.0), (80.0, 100.0)],
            RatioClass::Portrait3x4 => [(30.0, 40.0), (45.0, 60.0), (60.0, 80.0), (90.0, 120.0)],
            RatioClass::Portrait2x3 => [(20.0, 30.0), (40.0, 60.0), (60.0, 90.0), (80.0, 120.0)],
            RatioClass::PanoramicTall => [(15.0, 40.0), (30.0, 80.0), (45.0, 120.0), (60.0, 160.0)],
        }
    }
}

impl std::fmt::Display for RatioClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const SIZE_LABELS: [&str; 4] = ["Small", "Medium", "Large", "X-Large"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum QualityGrade {
    Excellent,
    Good,
    Acceptable,
    Low,
}

impl QualityGrade {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityGrade::Excellent => "excellent",
            QualityGrade::Good => "good",
            QualityGrade::Acceptable => "acceptable",
            QualityGrade::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct PrintSize {
    pub width_cm: f64,
    pub height_cm: f64,
    pub width_inches: f64,
    pub height_inches: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SizeVariant {
    pub label: String,
    pub width_cm: f64,
    pub height_cm: f64,
    pub width_inches: f64,
    pub height_inches: f64,
    pub effective_dpi: f64,
    pub quality_grade: QualityGrade,
}

/// Everything derivable from a pair of positive pixel dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    pub aspect_ratio: f64,
    pub ratio_class: RatioClass,
    pub max_print: PrintSize,
    pub variants: Vec<SizeVariant>,
}

pub fn classify_ratio(width_px: u32, height_px: u32) -> RatioClass {
    if width_px == 0 || height_px == 0 {
        return RatioClass::Landscape4x3;
    }
    let r = width_px as f64 / height_px as f64;

    if (0.95..=1.05).contains(&r) {
        RatioClass::Square
    } else if r > 1.05 && r <= 1.4 {
        RatioClass::Landscape4x3
    } else if r > 1.4 && r <= 1.65 {
        RatioClass::Landscape3x2
    } else if r > 1.65 && r <= 2.0 {
        RatioClass::Landscape16x9
    } else if r > 2.0 {
        RatioClass::PanoramicWide
    } else if (0.7..0.95).contains(&r) {
        RatioClass::Portrait4x5
    } else if (0.6..0.7).contains(&r) {
        RatioClass::Portrait3x4
    } else if (0.5..0.6).contains(&r) {
        RatioClass::Portrait2x3
    } else if r < 0.5 {
        RatioClass::PanoramicTall
    } else {
        RatioClass::Landscape4x3
    }
}

pub fn max_print_size(width_px: u32, height_px: u32) -> PrintSize {
    let (w, h) = (width_px as f64, height_px as f64);
    PrintSize {
        width_cm: round2(w / PX_PER_CM),
        height_cm: round2(h / PX_PER_CM),
        width_inches: round2(w / PX_PER_INCH),
        height_inches: round2(h / PX_PER_INCH),
    }
}

pub fn effective_dpi(width_px: u32, height_px: u32, print_w_cm: f64, print_h_cm: f64) -> f64 {
    let dpi_w = width_px as f64 / (print_w_cm / CM_PER_INCH);
    let dpi_h = height_px as f64 / (print_h_cm / CM_PER_INCH);
    round2(dpi_w.min(dpi_h))
}

pub fn grade_quality(dpi: f64) -> QualityGrade {
    if dpi >= 300.0 {
        QualityGrade::Excellent
    } else if dpi >= 200.0 {
        QualityGrade::Good
    } else if dpi >= MIN_DPI {
        QualityGrade::Acceptable
    } else {
        QualityGrade::Low
    }
}

fn build_variant(label: &str, width_px: u32, height_px: u32, w_cm: f64, h_cm: f64) -> SizeVariant {
    let dpi = effective_dpi(width_px, height_px, w_cm, h_cm);
    SizeVariant {
        label: label.to_string(),
        width_cm: w_cm,
        height_cm: h_cm,
        width_inches: round2(w_cm / CM_PER_INCH),
        height_inches: round2(h_cm / CM_PER_INCH),
        effective_dpi: dpi,
        quality_grade: grade_quality(dpi),
    }
}

/// Sellable sizes ordered Small to X-Large, or a lone `Custom` size when the
/// resolution supports none of the catalog entries.
pub fn compute_variants(width_px: u32, height_px: u32) -> Vec<SizeVariant> {
    if width_px == 0 || height_px == 0 {
        return Vec::new();
    }
    let ratio = width_px as f64 / height_px as f64;
    let class = classify_ratio(width_px, height_px);

    let variants: Vec<SizeVariant> = class
        .catalog()
        .iter()
        .zip(SIZE_LABELS)
        .map(|(&(cat_w, cat_h), label)| {
            let (w_cm, h_cm) = if class.is_portrait() {
                (round2(cat_h * ratio), cat_h)
            } else {
                (cat_w, round2(cat_w / ratio))
            };
            build_variant(label, width_px, height_px, w_cm, h_cm)
        })
        .filter(|v| v.effective_dpi >= MIN_DPI)
        .collect();

    if !variants.is_empty() {
        return variants;
    }

    let max = max_print_size(width_px, height_px);
    let w_cm = max.width_cm.min(CUSTOM_MAX_WIDTH_CM);
    let h_cm = round2(w_cm / ratio);
    vec![build_variant("Custom", width_px, height_px, w_cm, h_cm)]
}

/// Full derivation, or `None` when either dimension is missing.
pub fn derive_geometry(width_px: u32, height_px: u32) -> Option<Geometry> {
    if width_px == 0 || height_px == 0 {
        return None;
    }
    Some(Geometry {
        aspect_ratio: width_px as f64 / height_px as f64,
        ratio_class: classify_ratio(width_px, height_px),
        max_print: max_print_size(width_px, height_px),
        variants: compute_variants(width_px, height_px),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_bands() {
        assert_eq!(classify_ratio(1000, 1000), RatioClass::Square);
        assert_eq!(classify_ratio(1050, 1000), RatioClass::Square);
        assert_eq!(classify_ratio(1200, 1000), RatioClass::Landscape4x3);
        assert_eq!(classify_ratio(1500, 1000), RatioClass::Landscape3x2);
        assert_eq!(classify_ratio(1778, 1000), RatioClass::Landscape16x9);
        assert_eq!(classify_ratio(2000, 1000), RatioClass::Landscape16x9);
        assert_eq!(classify_ratio(3000, 1000), RatioClass::PanoramicWide);
        assert_eq!(classify_ratio(800, 1000), RatioClass::Portrait4x5);
        assert_eq!(classify_ratio(650, 1000), RatioClass::Portrait3x4);
        assert_eq!(classify_ratio(550, 1000), RatioClass::Portrait2x3);
        assert_eq!(classify_ratio(400, 1000), RatioClass::PanoramicTall);
        assert_eq!(classify_ratio(0, 1000), RatioClass::Landscape4x3);
    }

    #[test]
    fn ratio_is_scale_invariant() {
        let dims = [
            (21, 20),
            (7, 5),
            (33, 20),
            (2, 1),
            (19, 20),
            (7, 10),
            (3, 5),
            (1, 2),
            (4000, 6000),
            (9000, 3000),
            (1234, 987),
        ];
        for (w, h) in dims {
            let base = classify_ratio(w, h);
            for k in [2u32, 3, 7, 10, 31] {
                assert_eq!(classify_ratio(w * k, h * k), base, "{w}x{h} scaled by {k}");
            }
        }
    }

    #[test]
    fn equal_sides_are_square() {
        for s in [1u32, 17, 500, 4096, 20000] {
            assert_eq!(classify_ratio(s, s), RatioClass::Square);
        }
    }

    #[test]
    fn max_print_matches_reference_density() {
        for (w, h) in [(4000u32, 6000u32), (35, 70), (10057, 12926), (1, 1)] {
            let size = max_print_size(w, h);
            assert_eq!(size.width_cm, round2(w as f64 / 35.43));
            assert_eq!(size.height_cm, round2(h as f64 / 35.43));
        }
    }

    #[test]
    fn portrait_two_three() {
        let g = derive_geometry(4000, 6000).unwrap();
        assert_eq!(g.ratio_class, RatioClass::Portrait2x3);
        assert_eq!(g.max_print.width_cm, 112.9);
        assert_eq!(g.max_print.height_cm, 169.35);

        let small = &g.variants[0];
        assert_eq!(small.label, "Small");
        assert_eq!(small.width_cm, 20.0);
        assert_eq!(small.height_cm, 30.0);
        assert!((small.effective_dpi - 508.0).abs() < 0.01);
        assert_eq!(small.quality_grade, QualityGrade::Excellent);
    }

    #[test]
    fn panoramic_wide_small() {
        let g = derive_geometry(9000, 3000).unwrap();
        assert_eq!(g.ratio_class, RatioClass::PanoramicWide);
        let small = &g.variants[0];
        assert_eq!(small.width_cm, 40.0);
        assert_eq!(small.height_cm, 13.33);
        assert!((small.effective_dpi - 571.5).abs() < 0.1);
        assert_eq!(small.quality_grade, QualityGrade::Excellent);
    }

    #[test]
    fn variants_respect_minimum_dpi_or_fall_back_to_custom() {
        for (w, h) in [(400u32, 300u32), (1200, 1600), (2400, 2400), (8000, 4000), (300, 3000), (12000, 9000)] {
            let variants = compute_variants(w, h);
            assert!(!variants.is_empty());
            let lone_custom = variants.len() == 1 && variants[0].label == "Custom";
            if !lone_custom {
                assert!(variants.iter().all(|v| v.effective_dpi >= MIN_DPI), "{w}x{h}");
            }
        }
    }

    #[test]
    fn low_resolution_gets_custom_variant() {
        let variants = compute_variants(400, 300);
        assert_eq!(variants.len(), 1);
        let custom = &variants[0];
        assert_eq!(custom.label, "Custom");
        // 400px / 35.43 = 11.29cm, under the 30cm cap
        assert_eq!(custom.width_cm, 11.29);
        assert_eq!(custom.height_cm, round2(11.29 / (400.0 / 300.0)));
    }

    #[test]
    fn variants_keep_catalog_order() {
        let labels: Vec<_> = compute_variants(12000, 9000).into_iter().map(|v| v.label).collect();
        assert_eq!(labels, ["Small", "Medium", "Large", "X-Large"]);
    }

    #[test]
    fn grades() {
        assert_eq!(grade_quality(300.0), QualityGrade::Excellent);
        assert_eq!(grade_quality(299.99), QualityGrade::Good);
        assert_eq!(grade_quality(200.0), QualityGrade::Good);
        assert_eq!(grade_quality(150.0), QualityGrade::Acceptable);
        assert_eq!(grade_quality(149.99), QualityGrade::Low);
    }

    #[test]
    fn ratio_class_names_round_trip() {
        for class in RatioClass::ALL {
            assert_eq!(RatioClass::parse(class.as_str()), Some(class));
            let json = serde_json::to_string(&class).unwrap();
            assert_eq!(json, format!("\"{}\"", class.as_str()));
        }
    }
}
