//! Color-mapping policies for the result figures.
//!
//! The map choice is resolved into a [`ColorMap`] variant once, at
//! configuration time. Continuous maps interpolate a sampled ramp; the
//! qualitative maps reproduce the usual plotting-library palettes by binning
//! the normalized value onto a fixed color list, and `custom` is the
//! five-color injury palette used throughout this experiment family
//! (normal, ankle, knee, hip, aggregate gait disorder).

use itertools::Itertools;
use log::warn;
use ndarray::Array1;
use plotters::style::RGBColor;

const INJURY_PALETTE: &[(u8, u8, u8)] = &[
    (27, 158, 119),
    (217, 95, 2),
    (230, 171, 2),
    (231, 41, 138),
    (117, 112, 179),
];

const PASTEL1: &[(u8, u8, u8)] = &[
    (251, 180, 174),
    (179, 205, 227),
    (204, 235, 197),
    (222, 203, 228),
    (254, 217, 166),
    (255, 255, 204),
    (229, 216, 189),
    (253, 218, 236),
    (242, 242, 242),
];

const PASTEL2: &[(u8, u8, u8)] = &[
    (179, 226, 205),
    (253, 205, 172),
    (203, 213, 232),
    (244, 202, 228),
    (230, 245, 201),
    (255, 242, 174),
    (241, 226, 204),
    (204, 204, 204),
];

const PAIRED: &[(u8, u8, u8)] = &[
    (166, 206, 227),
    (31, 120, 180),
    (178, 223, 138),
    (51, 160, 44),
    (251, 154, 153),
    (227, 26, 28),
    (253, 191, 111),
    (255, 127, 0),
    (202, 178, 214),
    (106, 61, 154),
    (255, 255, 153),
    (177, 89, 40),
];

const ACCENT: &[(u8, u8, u8)] = &[
    (127, 201, 127),
    (190, 174, 212),
    (253, 192, 134),
    (255, 255, 153),
    (56, 108, 176),
    (240, 2, 127),
    (191, 91, 23),
    (102, 102, 102),
];

const DARK2: &[(u8, u8, u8)] = &[
    (27, 158, 119),
    (217, 95, 2),
    (117, 112, 179),
    (231, 41, 138),
    (102, 166, 30),
    (230, 171, 2),
    (166, 118, 29),
    (102, 102, 102),
];

const SET1: &[(u8, u8, u8)] = &[
    (228, 26, 28),
    (55, 126, 184),
    (77, 175, 74),
    (152, 78, 163),
    (255, 127, 0),
    (255, 255, 51),
    (166, 86, 40),
    (247, 129, 191),
    (153, 153, 153),
];

const SET2: &[(u8, u8, u8)] = &[
    (102, 194, 165),
    (252, 141, 98),
    (141, 160, 203),
    (231, 138, 195),
    (166, 216, 84),
    (255, 217, 47),
    (229, 196, 148),
    (179, 179, 179),
];

const SET3: &[(u8, u8, u8)] = &[
    (141, 211, 199),
    (255, 255, 179),
    (190, 186, 218),
    (251, 128, 114),
    (128, 177, 211),
    (253, 180, 98),
    (179, 222, 105),
    (252, 205, 229),
    (217, 217, 217),
    (188, 128, 189),
    (204, 235, 197),
    (255, 237, 111),
];

const TAB10: &[(u8, u8, u8)] = &[
    (31, 119, 180),
    (255, 127, 14),
    (44, 160, 44),
    (214, 39, 40),
    (148, 103, 189),
    (140, 86, 75),
    (227, 119, 194),
    (127, 127, 127),
    (188, 189, 34),
    (23, 190, 207),
];

const TAB20: &[(u8, u8, u8)] = &[
    (31, 119, 180),
    (174, 199, 232),
    (255, 127, 14),
    (255, 187, 120),
    (44, 160, 44),
    (152, 223, 138),
    (214, 39, 40),
    (255, 152, 150),
    (148, 103, 189),
    (197, 176, 213),
    (140, 86, 75),
    (196, 156, 148),
    (227, 119, 194),
    (247, 182, 210),
    (127, 127, 127),
    (199, 199, 199),
    (188, 189, 34),
    (219, 219, 141),
    (23, 190, 207),
    (158, 218, 229),
];

const TAB20B: &[(u8, u8, u8)] = &[
    (57, 59, 121),
    (82, 84, 163),
    (107, 110, 207),
    (156, 158, 222),
    (99, 121, 57),
    (140, 162, 82),
    (181, 207, 107),
    (206, 219, 156),
    (140, 109, 49),
    (189, 158, 57),
    (231, 186, 82),
    (231, 203, 148),
    (132, 60, 57),
    (173, 73, 74),
    (214, 97, 107),
    (231, 150, 156),
    (123, 65, 115),
    (165, 81, 148),
    (206, 109, 189),
    (222, 158, 214),
];

const TAB20C: &[(u8, u8, u8)] = &[
    (49, 130, 189),
    (107, 174, 214),
    (158, 202, 225),
    (198, 219, 239),
    (230, 85, 13),
    (253, 141, 60),
    (253, 174, 107),
    (253, 208, 162),
    (49, 163, 84),
    (116, 196, 118),
    (161, 217, 155),
    (199, 233, 192),
    (117, 107, 177),
    (158, 154, 200),
    (188, 189, 220),
    (218, 218, 235),
    (99, 99, 99),
    (150, 150, 150),
    (189, 189, 189),
    (217, 217, 217),
];

const VIRIDIS: &[(u8, u8, u8)] = &[
    (68, 1, 84),
    (72, 40, 120),
    (62, 73, 137),
    (49, 104, 142),
    (38, 130, 142),
    (31, 158, 137),
    (53, 183, 121),
    (110, 206, 88),
    (181, 222, 43),
    (253, 231, 37),
];

const PLASMA: &[(u8, u8, u8)] = &[
    (13, 8, 135),
    (70, 3, 159),
    (114, 1, 168),
    (156, 23, 158),
    (189, 55, 134),
    (216, 87, 107),
    (237, 121, 83),
    (251, 159, 58),
    (253, 202, 38),
    (240, 249, 33),
];

const INFERNO: &[(u8, u8, u8)] = &[
    (0, 0, 4),
    (27, 12, 65),
    (74, 12, 107),
    (120, 28, 109),
    (165, 44, 96),
    (207, 68, 70),
    (237, 105, 37),
    (251, 155, 6),
    (247, 209, 61),
    (252, 255, 164),
];

const MAGMA: &[(u8, u8, u8)] = &[
    (0, 0, 4),
    (24, 15, 61),
    (68, 15, 118),
    (114, 31, 129),
    (158, 47, 127),
    (205, 64, 113),
    (241, 96, 93),
    (253, 150, 104),
    (254, 202, 141),
    (252, 253, 191),
];

const GRAY: &[(u8, u8, u8)] = &[(0, 0, 0), (255, 255, 255)];

/// Discrete palettes with a fixed number of distinguishable entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualitativeMap {
    Pastel1,
    Pastel2,
    Paired,
    Accent,
    Dark2,
    Set1,
    Set2,
    Set3,
    Tab10,
    Tab20,
    Tab20b,
    Tab20c,
}

impl QualitativeMap {
    fn entries(&self) -> &'static [(u8, u8, u8)] {
        match self {
            QualitativeMap::Pastel1 => PASTEL1,
            QualitativeMap::Pastel2 => PASTEL2,
            QualitativeMap::Paired => PAIRED,
            QualitativeMap::Accent => ACCENT,
            QualitativeMap::Dark2 => DARK2,
            QualitativeMap::Set1 => SET1,
            QualitativeMap::Set2 => SET2,
            QualitativeMap::Set3 => SET3,
            QualitativeMap::Tab10 => TAB10,
            QualitativeMap::Tab20 => TAB20,
            QualitativeMap::Tab20b => TAB20B,
            QualitativeMap::Tab20c => TAB20C,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            QualitativeMap::Pastel1 => "Pastel1",
            QualitativeMap::Pastel2 => "Pastel2",
            QualitativeMap::Paired => "Paired",
            QualitativeMap::Accent => "Accent",
            QualitativeMap::Dark2 => "Dark2",
            QualitativeMap::Set1 => "Set1",
            QualitativeMap::Set2 => "Set2",
            QualitativeMap::Set3 => "Set3",
            QualitativeMap::Tab10 => "tab10",
            QualitativeMap::Tab20 => "tab20",
            QualitativeMap::Tab20b => "tab20b",
            QualitativeMap::Tab20c => "tab20c",
        }
    }
}

/// Smooth ramps sampled at ten anchor colors and interpolated in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuousMap {
    Viridis,
    Plasma,
    Inferno,
    Magma,
    Gray,
}

impl ContinuousMap {
    fn anchors(&self) -> &'static [(u8, u8, u8)] {
        match self {
            ContinuousMap::Viridis => VIRIDIS,
            ContinuousMap::Plasma => PLASMA,
            ContinuousMap::Inferno => INFERNO,
            ContinuousMap::Magma => MAGMA,
            ContinuousMap::Gray => GRAY,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ContinuousMap::Viridis => "viridis",
            ContinuousMap::Plasma => "plasma",
            ContinuousMap::Inferno => "inferno",
            ContinuousMap::Magma => "magma",
            ContinuousMap::Gray => "gray",
        }
    }
}

/// A resolved color-map choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMap {
    /// The fixed five-color injury palette.
    Custom,
    Qualitative(QualitativeMap),
    Continuous(ContinuousMap),
}

impl ColorMap {
    /// The full closed vocabulary accepted on the command line.
    pub const NAMES: [&'static str; 18] = [
        "custom", "viridis", "plasma", "inferno", "magma", "gray", "Pastel1", "Pastel2",
        "Paired", "Accent", "Dark2", "Set1", "Set2", "Set3", "tab10", "tab20", "tab20b",
        "tab20c",
    ];

    pub fn from_name(name: &str) -> Option<ColorMap> {
        let map = match name {
            "custom" => ColorMap::Custom,
            "viridis" => ColorMap::Continuous(ContinuousMap::Viridis),
            "plasma" => ColorMap::Continuous(ContinuousMap::Plasma),
            "inferno" => ColorMap::Continuous(ContinuousMap::Inferno),
            "magma" => ColorMap::Continuous(ContinuousMap::Magma),
            "gray" => ColorMap::Continuous(ContinuousMap::Gray),
            "Pastel1" => ColorMap::Qualitative(QualitativeMap::Pastel1),
            "Pastel2" => ColorMap::Qualitative(QualitativeMap::Pastel2),
            "Paired" => ColorMap::Qualitative(QualitativeMap::Paired),
            "Accent" => ColorMap::Qualitative(QualitativeMap::Accent),
            "Dark2" => ColorMap::Qualitative(QualitativeMap::Dark2),
            "Set1" => ColorMap::Qualitative(QualitativeMap::Set1),
            "Set2" => ColorMap::Qualitative(QualitativeMap::Set2),
            "Set3" => ColorMap::Qualitative(QualitativeMap::Set3),
            "tab10" => ColorMap::Qualitative(QualitativeMap::Tab10),
            "tab20" => ColorMap::Qualitative(QualitativeMap::Tab20),
            "tab20b" => ColorMap::Qualitative(QualitativeMap::Tab20b),
            "tab20c" => ColorMap::Qualitative(QualitativeMap::Tab20c),
            _ => return None,
        };
        Some(map)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ColorMap::Custom => "custom",
            ColorMap::Qualitative(map) => map.name(),
            ColorMap::Continuous(map) => map.name(),
        }
    }

    /// How many distinguishable colors the map provides, or `None` for a
    /// continuous ramp.
    pub fn discrete_capacity(&self) -> Option<usize> {
        match self {
            ColorMap::Custom => Some(INJURY_PALETTE.len()),
            ColorMap::Qualitative(map) => Some(map.entries().len()),
            ColorMap::Continuous(_) => None,
        }
    }

    /// Looks up the color for a normalized position `t` in `[0, 1]`.
    ///
    /// Discrete maps bin `t` onto their entry list the way a listed colormap
    /// does (`floor(t * n)`, clipped to the last entry); continuous maps
    /// interpolate their anchor ramp.
    pub fn color_at(&self, t: f64) -> RGBColor {
        let clamped = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
        match self {
            ColorMap::Custom => bin(INJURY_PALETTE, clamped),
            ColorMap::Qualitative(map) => bin(map.entries(), clamped),
            ColorMap::Continuous(map) => ramp(map.anchors(), clamped),
        }
    }

    /// Colors a raw label value.
    ///
    /// The custom injury palette is indexed by the label itself (rounded,
    /// clipped to the last entry), so every subtype keeps its fixed color no
    /// matter which labels a panel happens to span. Named maps normalize by
    /// the observed min/max first, matching default scatter color handling;
    /// a degenerate range maps everything to the start of the map.
    pub fn scatter_color(&self, value: f64, vmin: f64, vmax: f64) -> RGBColor {
        match self {
            ColorMap::Custom => {
                let index = (value.round().max(0.0) as usize).min(INJURY_PALETTE.len() - 1);
                let (r, g, b) = INJURY_PALETTE[index];
                RGBColor(r, g, b)
            }
            _ => {
                let t = if vmax > vmin {
                    (value - vmin) / (vmax - vmin)
                } else {
                    0.0
                };
                self.color_at(t)
            }
        }
    }

    /// Logs a warning when a discrete map cannot distinguish `distinct`
    /// different labels. Returns whether the capacity was exceeded.
    pub fn check_capacity(&self, distinct: usize) -> bool {
        match self.discrete_capacity() {
            Some(capacity) if distinct > capacity => {
                warn!(
                    "color map '{}' provides {} distinct colors but {} labels are present; colors will repeat",
                    self.name(),
                    capacity,
                    distinct
                );
                true
            }
            _ => false,
        }
    }
}

fn bin(entries: &[(u8, u8, u8)], t: f64) -> RGBColor {
    let index = ((t * entries.len() as f64) as usize).min(entries.len() - 1);
    let (r, g, b) = entries[index];
    RGBColor(r, g, b)
}

fn ramp(anchors: &[(u8, u8, u8)], t: f64) -> RGBColor {
    let scaled = t * (anchors.len() - 1) as f64;
    let low = scaled.floor() as usize;
    let high = (low + 1).min(anchors.len() - 1);
    let frac = scaled - low as f64;
    let (r0, g0, b0) = anchors[low];
    let (r1, g1, b1) = anchors[high];
    let lerp = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * frac).round() as u8;
    RGBColor(lerp(r0, r1), lerp(g0, g1), lerp(b0, b1))
}

/// Replaces arbitrary label values by their rank among the distinct values
/// present (ascending), yielding small consecutive color indices. Returns the
/// ranks and the number of distinct labels.
pub fn rank_labels(labels: &Array1<usize>) -> (Array1<usize>, usize) {
    let distinct: Vec<usize> = labels.iter().copied().sorted().dedup().collect();
    let ranks = labels.mapv(|value| distinct.binary_search(&value).unwrap_or(0));
    (ranks, distinct.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn every_vocabulary_name_resolves_and_round_trips() {
        for name in ColorMap::NAMES {
            let map = ColorMap::from_name(name).unwrap_or_else(|| panic!("unresolved {name}"));
            assert_eq!(map.name(), name);
        }
        assert!(ColorMap::from_name("jet").is_none());
        assert!(ColorMap::from_name("set2").is_none());
    }

    #[test]
    fn capacities_match_the_palette_sizes() {
        assert_eq!(ColorMap::from_name("custom").unwrap().discrete_capacity(), Some(5));
        assert_eq!(ColorMap::from_name("Set2").unwrap().discrete_capacity(), Some(8));
        assert_eq!(ColorMap::from_name("Paired").unwrap().discrete_capacity(), Some(12));
        assert_eq!(ColorMap::from_name("tab20").unwrap().discrete_capacity(), Some(20));
        assert_eq!(ColorMap::from_name("viridis").unwrap().discrete_capacity(), None);
    }

    #[test]
    fn continuous_endpoints_hit_the_anchor_colors() {
        let viridis = ColorMap::from_name("viridis").unwrap();
        assert_eq!(viridis.color_at(0.0), RGBColor(68, 1, 84));
        assert_eq!(viridis.color_at(1.0), RGBColor(253, 231, 37));
        let gray = ColorMap::from_name("gray").unwrap();
        assert_eq!(gray.color_at(0.5), RGBColor(128, 128, 128));
    }

    #[test]
    fn qualitative_maps_bin_like_a_listed_colormap() {
        let set2 = ColorMap::from_name("Set2").unwrap();
        assert_eq!(set2.color_at(0.0), RGBColor(102, 194, 165));
        // 0.49 * 8 = 3.92 -> entry 3
        assert_eq!(set2.color_at(0.49), RGBColor(231, 138, 195));
        // t = 1.0 clips to the last entry instead of indexing past the end
        assert_eq!(set2.color_at(1.0), RGBColor(179, 179, 179));
    }

    #[test]
    fn scatter_color_normalizes_named_maps_by_the_value_range() {
        let viridis = ColorMap::from_name("viridis").unwrap();
        assert_eq!(viridis.scatter_color(0.0, 0.0, 4.0), viridis.color_at(0.0));
        assert_eq!(viridis.scatter_color(4.0, 0.0, 4.0), viridis.color_at(1.0));
        // degenerate range: everything lands on the start of the ramp
        assert_eq!(viridis.scatter_color(3.0, 3.0, 3.0), viridis.color_at(0.0));
    }

    #[test]
    fn custom_palette_keeps_the_label_color_association() {
        let custom = ColorMap::from_name("custom").unwrap();
        // A group spanning only subtypes 1..=3 still gets each subtype's
        // fixed color, untouched by the panel's value range.
        assert_eq!(custom.scatter_color(1.0, 1.0, 3.0), RGBColor(217, 95, 2));
        assert_eq!(custom.scatter_color(2.0, 1.0, 3.0), RGBColor(230, 171, 2));
        assert_eq!(custom.scatter_color(3.0, 1.0, 3.0), RGBColor(231, 41, 138));
        // labels past the palette clip to the last entry
        assert_eq!(custom.scatter_color(9.0, 0.0, 9.0), RGBColor(117, 112, 179));
    }

    #[test]
    fn rank_labels_compacts_to_consecutive_indices() {
        let (ranks, distinct) = rank_labels(&array![5usize, 2, 9, 2]);
        assert_eq!(distinct, 3);
        assert_eq!(ranks, array![1usize, 0, 2, 0]);
        assert!(ranks.iter().all(|&r| r < distinct));
    }

    #[test]
    fn capacity_check_flags_small_discrete_maps_only() {
        assert!(ColorMap::from_name("Set2").unwrap().check_capacity(9));
        assert!(!ColorMap::from_name("Set2").unwrap().check_capacity(8));
        assert!(!ColorMap::from_name("viridis").unwrap().check_capacity(50));
    }
}
