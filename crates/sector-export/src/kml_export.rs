//! KML 2.2 document writer
//!
//! One shared `<Style>` per legend entry, an HTML legend table in the
//! document description, a label placemark per site and one polygon
//! placemark per sector carrying the source row as ExtendedData.

use crate::{stacking_order, ExportBundle, Result};
use sector_engine::{ColorKey, Legend, LegendEntry, Mode, StyledSector};
use std::collections::HashSet;
use std::io::Write;

const OUTLINE_COLOR: &str = "ff000000";
const LABEL_COLOR: &str = "ff00ffff";
const LABEL_SCALE: f64 = 0.8;

/// Escape the five XML special characters
pub fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Style id for a legend key, safe for use as an XML id
pub fn style_id(key: &ColorKey) -> String {
    match key {
        ColorKey::Band(band) => {
            let safe: String = band
                .as_str()
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                .collect();
            format!("band_{}", safe)
        }
        ColorKey::PciGroup(group) => format!("pci_{}", group),
    }
}

fn document_name(mode: Mode) -> &'static str {
    match mode {
        Mode::StyleByBand => "Site Sector",
        Mode::AuditPci(_) => "Site Sector PCI Audit",
    }
}

/// Legend as an HTML table, escaped for embedding in `<description>`
fn legend_html(legend: &Legend) -> String {
    let mut html = format!(
        "<table border=\"1\" cellpadding=\"4\"><tr><th colspan=\"2\">{}</th></tr>",
        legend.title
    );
    for entry in legend.sorted_by_frequency() {
        html.push_str(&format!(
            "<tr><td bgcolor=\"{}\">&#160;&#160;&#160;&#160;</td><td>{}</td></tr>",
            entry.color.hex(),
            entry.label
        ));
    }
    html.push_str("</table>");
    escape_xml(&html)
}

fn write_style<W: Write>(w: &mut W, entry: &LegendEntry) -> Result<()> {
    writeln!(w, "    <Style id=\"{}\">", style_id(&entry.key))?;
    writeln!(
        w,
        "      <LineStyle><color>{}</color><width>1</width></LineStyle>",
        OUTLINE_COLOR
    )?;
    writeln!(
        w,
        "      <PolyStyle><color>{}</color><fill>1</fill><outline>1</outline></PolyStyle>",
        entry.color.kml()
    )?;
    writeln!(w, "    </Style>")?;
    Ok(())
}

fn write_site_label<W: Write>(w: &mut W, sector: &StyledSector) -> Result<()> {
    writeln!(w, "    <Placemark>")?;
    writeln!(w, "      <name>{}</name>", escape_xml(&sector.id))?;
    writeln!(
        w,
        "      <Style><IconStyle><scale>0</scale></IconStyle><LabelStyle><color>{}</color><scale>{}</scale></LabelStyle></Style>",
        LABEL_COLOR, LABEL_SCALE
    )?;
    writeln!(
        w,
        "      <Point><coordinates>{},{},0</coordinates></Point>",
        sector.apex.lon, sector.apex.lat
    )?;
    writeln!(w, "    </Placemark>")?;
    Ok(())
}

fn write_sector<W: Write>(
    w: &mut W,
    sector: &StyledSector,
    headers: &[String],
    legend: &Legend,
    mode: Mode,
) -> Result<()> {
    let label = legend
        .entries
        .iter()
        .find(|e| e.key == sector.color_key)
        .map(|e| e.label.as_str())
        .unwrap_or("UNKNOWN");

    writeln!(w, "    <Placemark>")?;
    writeln!(w, "      <name>{}</name>", escape_xml(&format!("{}_{}", sector.id, label)))?;
    writeln!(w, "      <styleUrl>#{}</styleUrl>", style_id(&sector.color_key))?;
    writeln!(w, "      <ExtendedData>")?;
    for (header, value) in headers.iter().zip(&sector.attributes) {
        writeln!(
            w,
            "        <Data name=\"{}\"><value>{}</value></Data>",
            escape_xml(header),
            escape_xml(value)
        )?;
    }
    writeln!(
        w,
        "        <Data name=\"Gen_Radius\"><value>{}</value></Data>",
        sector.radius_m
    )?;
    writeln!(
        w,
        "        <Data name=\"Gen_Beam\"><value>{}</value></Data>",
        sector.beamwidth_deg
    )?;
    if let (Mode::AuditPci(_), ColorKey::PciGroup(group)) = (mode, &sector.color_key) {
        writeln!(
            w,
            "        <Data name=\"Modulo_Result\"><value>{}</value></Data>",
            group
        )?;
    }
    writeln!(w, "      </ExtendedData>")?;

    let coords: Vec<String> = sector
        .ring
        .iter()
        .map(|v| format!("{},{},0", v.lon, v.lat))
        .collect();
    writeln!(
        w,
        "      <Polygon><outerBoundaryIs><LinearRing><coordinates>{}</coordinates></LinearRing></outerBoundaryIs></Polygon>",
        coords.join(" ")
    )?;
    writeln!(w, "    </Placemark>")?;
    Ok(())
}

pub fn write_kml<W: Write>(bundle: &ExportBundle<'_>, mut w: W) -> Result<()> {
    let legend = bundle.legend();
    let mode = bundle.report.summary.mode;

    writeln!(w, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
    writeln!(w, r#"<kml xmlns="http://www.opengis.net/kml/2.2">"#)?;
    writeln!(w, "  <Document>")?;
    writeln!(w, "    <name>{}</name>", document_name(mode))?;
    writeln!(w, "    <description>{}</description>", legend_html(legend))?;

    for entry in &legend.entries {
        write_style(&mut w, entry)?;
    }

    let mut labelled: HashSet<&str> = HashSet::new();
    for sector in bundle.sectors {
        if labelled.insert(sector.id.as_str()) {
            write_site_label(&mut w, sector)?;
        }
    }

    for sector in stacking_order(bundle.sectors, legend) {
        write_sector(&mut w, sector, bundle.headers(), legend, mode)?;
    }

    writeln!(w, "  </Document>")?;
    writeln!(w, "</kml>")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    fn render(output: &sector_engine::RunOutput) -> String {
        let bundle = ExportBundle::new(&output.sectors, &output.report);
        let mut buf = Vec::new();
        write_kml(&bundle, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("a<b>&\"c'"), "a&lt;b&gt;&amp;&quot;c&apos;");
        assert_eq!(escape_xml("plain"), "plain");
    }

    #[test]
    fn test_band_document() {
        let kml = render(&testutil::band_run());

        assert!(kml.contains("<name>Site Sector</name>"));
        // one shared style per band, red at 50% → 80 alpha
        assert!(kml.contains("<Style id=\"band_1800\">"));
        assert!(kml.contains("<Style id=\"band_900\">"));
        assert!(kml.contains("<color>800000ff</color>"));
        assert_eq!(kml.matches("<styleUrl>#band_1800</styleUrl>").count(), 2);

        // ids are escaped everywhere they appear
        assert!(kml.contains("<name>JKT&lt;1&gt;</name>"));
        assert!(kml.contains("<name>BDG&amp;2_1800</name>"));
        assert!(!kml.contains("JKT<1>"));
        assert!(!kml.contains("BDG&2"));

        // two distinct sites → two label placemarks plus three sectors
        assert_eq!(kml.matches("<Point>").count(), 2);
        assert_eq!(kml.matches("<Polygon>").count(), 3);
        assert!(!kml.contains("Modulo_Result"));
        assert!(kml.contains("<Data name=\"Band\"><value>L900</value></Data>"));
    }

    #[test]
    fn test_pci_document() {
        let kml = render(&testutil::pci_run());

        assert!(kml.contains("<name>Site Sector PCI Audit</name>"));
        assert!(kml.contains("PCI AUDIT"));
        // all three groups get a style even though only two are used
        for id in 0..3 {
            assert!(kml.contains(&format!("<Style id=\"pci_{}\">", id)));
        }
        assert!(kml.contains("<name>A_Mod 1</name>"));
        assert!(kml.contains("<Data name=\"Modulo_Result\"><value>0</value></Data>"));

        // group 0 (site B) stacks before group 1 (site A)
        let b = kml.find("<name>B_Mod 0</name>").unwrap();
        let a = kml.find("<name>A_Mod 1</name>").unwrap();
        assert!(b < a);
    }

    #[test]
    fn test_legend_html_is_escaped() {
        let output = testutil::band_run();
        let html = legend_html(&output.report.legend);
        assert!(html.starts_with("&lt;table"));
        assert!(html.contains("#ff0000"));
        // sorted low → high frequency
        assert!(html.find("900").unwrap() < html.find("1800").unwrap());
    }
}
