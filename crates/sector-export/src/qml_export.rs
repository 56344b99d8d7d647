//! QGIS companion style (`.qml`)
//!
//! A categorized renderer on the legend attribute, one SimpleFill symbol per
//! legend entry. Loading it onto the GeoJSON layer reproduces the KML colors.

use crate::kml_export::escape_xml;
use crate::Result;
use sector_engine::{ColorKey, Legend, LegendEntry};
use std::io::Write;

const QGIS_VERSION: &str = "3.22";

fn category_value(entry: &LegendEntry) -> String {
    match &entry.key {
        ColorKey::Band(band) => band.as_str().to_string(),
        ColorKey::PciGroup(group) => group.to_string(),
    }
}

fn write_symbol<W: Write>(w: &mut W, index: usize, entry: &LegendEntry) -> Result<()> {
    let c = entry.color;
    writeln!(
        w,
        r#"      <symbol type="fill" name="{}" alpha="{:.3}" clip_to_extent="1" force_rhr="0">"#,
        index,
        c.opacity()
    )?;
    writeln!(w, r#"        <layer class="SimpleFill" enabled="1" locked="0" pass="0">"#)?;
    writeln!(w, r#"          <prop k="color" v="{},{},{},255"/>"#, c.r, c.g, c.b)?;
    writeln!(w, r#"          <prop k="outline_color" v="0,0,0,255"/>"#)?;
    writeln!(w, r#"          <prop k="outline_style" v="solid"/>"#)?;
    writeln!(w, r#"          <prop k="outline_width" v="0.26"/>"#)?;
    writeln!(w, r#"          <prop k="style" v="solid"/>"#)?;
    writeln!(w, "        </layer>")?;
    writeln!(w, "      </symbol>")?;
    Ok(())
}

pub fn write_qml<W: Write>(legend: &Legend, mut w: W) -> Result<()> {
    writeln!(w, "<!DOCTYPE qgis PUBLIC 'http://mrcc.com/qgis.dtd' 'SYSTEM'>")?;
    writeln!(w, r#"<qgis version="{}" styleCategories="Symbology">"#, QGIS_VERSION)?;
    writeln!(
        w,
        r#"  <renderer-v2 type="categorizedSymbol" attr="{}" symbollevels="0" enableorderby="0" forceraster="0">"#,
        escape_xml(&legend.attribute)
    )?;

    writeln!(w, "    <categories>")?;
    for (i, entry) in legend.entries.iter().enumerate() {
        writeln!(
            w,
            r#"      <category render="true" symbol="{}" value="{}" label="{}"/>"#,
            i,
            escape_xml(&category_value(entry)),
            escape_xml(&entry.label)
        )?;
    }
    writeln!(w, "    </categories>")?;

    writeln!(w, "    <symbols>")?;
    for (i, entry) in legend.entries.iter().enumerate() {
        write_symbol(&mut w, i, entry)?;
    }
    writeln!(w, "    </symbols>")?;

    writeln!(w, "  </renderer-v2>")?;
    writeln!(w, "</qgis>")?;
    Ok(())
}
