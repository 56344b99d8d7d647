//! Thematic coloring and the canonical legend
//!
//! Every exporter reads colors from the same [`Legend`], so a QGIS style
//! file and a KML legend written from one run always agree.
//!
//! - PCI groups map onto a fixed palette indexed by group id, so audit maps
//!   are comparable across runs.
//! - Band keys claim palette slots cyclically in first-seen order. Claims go
//!   through a mutex; the pipeline seeds every key in a single-threaded
//!   pre-pass so worker scheduling never decides a color.

use crate::{BandKey, ColorKey, PciGroup, PciModulo, Result, SectorError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

/// Opaque RGB color, `#rrggbb` in config files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Attach an opacity in `[0, 1]`
    pub fn with_opacity(self, opacity: f64) -> Rgba {
        Rgba {
            r: self.r,
            g: self.g,
            b: self.b,
            a: opacity_to_alpha(opacity),
        }
    }
}

impl FromStr for Rgb {
    type Err = SectorError;

    fn from_str(s: &str) -> Result<Self> {
        let hex = s.trim().trim_start_matches('#');
        let bad = || SectorError::Configuration(format!("invalid color {:?}, expected #rrggbb", s));
        if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(bad());
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| bad());
        Ok(Self {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
        })
    }
}

impl TryFrom<String> for Rgb {
    type Error = SectorError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Rgb> for String {
    fn from(c: Rgb) -> String {
        c.to_string()
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// RGB plus alpha
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub fn rgb(&self) -> Rgb {
        Rgb::new(self.r, self.g, self.b)
    }

    /// `#rrggbb`
    pub fn hex(&self) -> String {
        self.rgb().to_string()
    }

    pub fn opacity(&self) -> f64 {
        self.a as f64 / 255.0
    }

    /// KML color order, `aabbggrr`
    pub fn kml(&self) -> String {
        format!("{:02x}{:02x}{:02x}{:02x}", self.a, self.b, self.g, self.r)
    }
}

fn opacity_to_alpha(opacity: f64) -> u8 {
    (opacity.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Band palette: red, green, blue, magenta, cyan, yellow, dark green, dark blue
pub const DEFAULT_BAND_PALETTE: [Rgb; 8] = [
    Rgb::new(255, 0, 0),
    Rgb::new(0, 255, 0),
    Rgb::new(0, 0, 255),
    Rgb::new(255, 0, 255),
    Rgb::new(0, 255, 255),
    Rgb::new(255, 255, 0),
    Rgb::new(0, 128, 0),
    Rgb::new(0, 0, 128),
];

/// Attribute exporters write the band key under
pub const BAND_ATTRIBUTE: &str = "Band_Key";

/// Grey for keys with no assigned color
pub const FALLBACK_COLOR: Rgb = Rgb::new(0x88, 0x88, 0x88);

/// PCI group palette, indexed by group id: red, yellow, blue, green, magenta, cyan
pub const DEFAULT_PCI_PALETTE: [Rgb; 6] = [
    Rgb::new(255, 0, 0),
    Rgb::new(255, 255, 0),
    Rgb::new(0, 0, 255),
    Rgb::new(0, 255, 0),
    Rgb::new(255, 0, 255),
    Rgb::new(0, 255, 255),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegendEntry {
    pub key: ColorKey,
    pub label: String,
    pub color: Rgba,
}

/// Ordered key → color mapping shared by every exporter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Legend {
    pub title: String,
    /// Attribute the legend categorizes on (`Band_Key` or `Mod_3` / `Mod_6`)
    pub attribute: String,
    pub entries: Vec<LegendEntry>,
}

impl Legend {
    pub fn color_for(&self, key: &ColorKey) -> Option<Rgba> {
        self.entries.iter().find(|e| &e.key == key).map(|e| e.color)
    }

    /// Position of `key` in the legend, used as render stacking order
    pub fn rank(&self, key: &ColorKey) -> Option<usize> {
        self.entries.iter().position(|e| &e.key == key)
    }

    /// Entries sorted by numeric band frequency (low → high); PCI legends
    /// are already in group order and come back unchanged.
    pub fn sorted_by_frequency(&self) -> Vec<&LegendEntry> {
        let mut entries: Vec<&LegendEntry> = self.entries.iter().collect();
        entries.sort_by_key(|e| match &e.key {
            ColorKey::Band(key) => key.frequency(),
            ColorKey::PciGroup(group) => group.id() as u32,
        });
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    order: Vec<BandKey>,
    colors: HashMap<BandKey, Rgba>,
}

/// Write-once-per-key band color assignments
#[derive(Debug)]
pub struct BandColorRegistry {
    palette: Vec<Rgb>,
    opacity: f64,
    state: Mutex<RegistryState>,
}

impl BandColorRegistry {
    pub fn new(palette: Vec<Rgb>, opacity: f64) -> Result<Self> {
        if palette.is_empty() {
            return Err(SectorError::Configuration("band palette is empty".to_string()));
        }
        Ok(Self {
            palette,
            opacity,
            state: Mutex::new(RegistryState::default()),
        })
    }

    /// Claim slots for `keys` in order
    pub fn seed<'a>(&self, keys: impl IntoIterator<Item = &'a BandKey>) {
        for key in keys {
            self.color_for(key);
        }
    }

    /// Color for `key`, claiming the next palette slot on first sight
    pub fn color_for(&self, key: &BandKey) -> Rgba {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(color) = state.colors.get(key) {
            return *color;
        }
        let slot = state.order.len() % self.palette.len();
        let color = self.palette[slot].with_opacity(self.opacity);
        state.order.push(key.clone());
        state.colors.insert(key.clone(), color);
        color
    }

    pub fn legend(&self) -> Legend {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Legend {
            title: "LEGEND".to_string(),
            attribute: BAND_ATTRIBUTE.to_string(),
            entries: state
                .order
                .iter()
                .map(|key| LegendEntry {
                    key: ColorKey::Band(key.clone()),
                    label: key.to_string(),
                    color: state.colors[key],
                })
                .collect(),
        }
    }
}

/// Colors for one run, by band or by PCI group
#[derive(Debug)]
pub enum ThematicStyler {
    Band(BandColorRegistry),
    Pci { modulo: PciModulo, colors: Vec<Rgba> },
}

impl ThematicStyler {
    pub fn for_bands(palette: Vec<Rgb>, opacity: f64) -> Result<Self> {
        Ok(ThematicStyler::Band(BandColorRegistry::new(palette, opacity)?))
    }

    pub fn for_pci(modulo: PciModulo, palette: &[Rgb], opacity: f64) -> Result<Self> {
        let needed = modulo.value() as usize;
        if palette.len() < needed {
            return Err(SectorError::Configuration(format!(
                "PCI palette needs {} colors for {}, got {}",
                needed,
                modulo,
                palette.len()
            )));
        }
        let colors = palette[..needed].iter().map(|c| c.with_opacity(opacity)).collect();
        Ok(ThematicStyler::Pci { modulo, colors })
    }

    pub fn color_for(&self, key: &ColorKey) -> Rgba {
        match (self, key) {
            (ThematicStyler::Band(registry), ColorKey::Band(band)) => registry.color_for(band),
            (ThematicStyler::Pci { colors, .. }, ColorKey::PciGroup(group)) => {
                colors[group.id() as usize % colors.len()]
            }
            // Mismatched key kinds never come out of the pipeline
            (ThematicStyler::Band(registry), ColorKey::PciGroup(_)) => {
                FALLBACK_COLOR.with_opacity(registry.opacity)
            }
            (ThematicStyler::Pci { colors, .. }, ColorKey::Band(_)) => {
                let a = colors.first().map(|c| c.a).unwrap_or(255);
                Rgba { a, ..FALLBACK_COLOR.with_opacity(1.0) }
            }
        }
    }

    pub fn legend(&self) -> Legend {
        match self {
            ThematicStyler::Band(registry) => registry.legend(),
            ThematicStyler::Pci { modulo, colors } => Legend {
                title: "PCI AUDIT".to_string(),
                attribute: modulo.field_name(),
                entries: modulo
                    .groups()
                    .map(|g: PciGroup| LegendEntry {
                        key: ColorKey::PciGroup(g),
                        label: format!("Mod {}", g),
                        color: colors[g.id() as usize],
                    })
                    .collect(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_rgb_parse_and_display() {
        let c: Rgb = "#FF8000".parse().unwrap();
        assert_eq!(c, Rgb::new(255, 128, 0));
        assert_eq!(c.to_string(), "#ff8000");
        assert!("#12345".parse::<Rgb>().is_err());
        assert!("zzzzzz".parse::<Rgb>().is_err());
        assert!("#+fffff".parse::<Rgb>().is_err());
        assert!("#ff+fff".parse::<Rgb>().is_err());
        let from_json: Rgb = serde_json::from_str("\"#00ff00\"").unwrap();
        assert_eq!(from_json, Rgb::new(0, 255, 0));
    }

    #[test]
    fn test_kml_color_order() {
        let c = Rgb::new(0x11, 0x22, 0x33).with_opacity(0.5);
        assert_eq!(c.a, 128);
        assert_eq!(c.kml(), "80332211");
        assert_eq!(c.hex(), "#112233");
    }

    #[test]
    fn test_band_slots_first_seen_and_cycle() {
        let registry = BandColorRegistry::new(vec![Rgb::new(1, 0, 0), Rgb::new(2, 0, 0)], 1.0).unwrap();
        let a = registry.color_for(&BandKey::from("1800"));
        let b = registry.color_for(&BandKey::from("900"));
        let c = registry.color_for(&BandKey::from("2100"));
        assert_eq!(a.r, 1);
        assert_eq!(b.r, 2);
        assert_eq!(c.r, 1);
        assert_eq!(registry.color_for(&BandKey::from("900")), b);

        let legend = registry.legend();
        let labels: Vec<&str> = legend.entries.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["1800", "900", "2100"]);
        let sorted: Vec<&str> = legend.sorted_by_frequency().iter().map(|e| e.label.as_str()).collect();
        assert_eq!(sorted, vec!["900", "1800", "2100"]);
    }

    #[test]
    fn test_concurrent_claims_agree() {
        let registry = Arc::new(
            BandColorRegistry::new(DEFAULT_BAND_PALETTE.to_vec(), 0.5).unwrap(),
        );
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    ["700", "850", "1800", "2100"]
                        .iter()
                        .map(|k| registry.color_for(&BandKey::from(*k)))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let results: Vec<Vec<Rgba>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(registry.legend().len(), 4);
    }

    #[test]
    fn test_pci_palette_fixed() {
        let styler = ThematicStyler::for_pci(PciModulo::Rs, &DEFAULT_PCI_PALETTE, 0.6).unwrap();
        let legend = styler.legend();
        assert_eq!(legend.attribute, "Mod_3");
        assert_eq!(legend.len(), 3);
        assert_eq!(legend.entries[1].label, "Mod 1");
        assert_eq!(
            styler.color_for(&ColorKey::PciGroup(PciGroup::new(1))).rgb(),
            DEFAULT_PCI_PALETTE[1]
        );
        assert_eq!(legend.entries[2].color.a, 153);
    }

    #[test]
    fn test_pci_palette_too_short() {
        assert!(ThematicStyler::for_pci(PciModulo::Pss, &DEFAULT_PCI_PALETTE[..3], 0.6).is_err());
        assert!(BandColorRegistry::new(Vec::new(), 0.5).is_err());
    }
}
