//! GeoJSON FeatureCollection of sector polygons

use crate::{stacking_order, ExportBundle, Result};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, JsonValue, Value};
use sector_engine::{ColorKey, StyledSector};
use std::io::Write;

/// Build the feature for one sector.
///
/// Source columns come first; generated fields (`Gen_Radius`, `Gen_Beam`,
/// the legend attribute and simplestyle `fill`/`fill-opacity`) override any
/// source column of the same name.
pub fn sector_feature(sector: &StyledSector, headers: &[String], legend_attribute: &str) -> Feature {
    let ring: Vec<Vec<f64>> = sector.ring.iter().map(|v| v.position()).collect();
    let geometry = Geometry::new(Value::Polygon(vec![ring]));

    let mut properties = JsonObject::new();
    for (header, value) in headers.iter().zip(&sector.attributes) {
        properties.insert(header.clone(), JsonValue::from(value.as_str()));
    }
    properties.insert("id".to_string(), JsonValue::from(sector.id.as_str()));
    properties.insert("row".to_string(), JsonValue::from(sector.row));
    properties.insert("Gen_Radius".to_string(), JsonValue::from(sector.radius_m));
    properties.insert("Gen_Beam".to_string(), JsonValue::from(sector.beamwidth_deg));
    let key = match &sector.color_key {
        ColorKey::Band(band) => JsonValue::from(band.as_str()),
        ColorKey::PciGroup(group) => JsonValue::from(group.id()),
    };
    properties.insert(legend_attribute.to_string(), key);
    properties.insert("fill".to_string(), JsonValue::from(sector.fill.hex()));
    properties.insert("fill-opacity".to_string(), JsonValue::from(sector.fill.opacity()));
    properties.insert("stroke".to_string(), JsonValue::from("#000000"));

    Feature {
        bbox: None,
        geometry: Some(geometry),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Sectors in stacking order, with the legend as a `legend` foreign member
pub fn to_feature_collection(bundle: &ExportBundle<'_>) -> Result<FeatureCollection> {
    let legend = bundle.legend();
    let features = stacking_order(bundle.sectors, legend)
        .into_iter()
        .map(|s| sector_feature(s, bundle.headers(), &legend.attribute))
        .collect();

    let mut foreign = JsonObject::new();
    foreign.insert("legend".to_string(), serde_json::to_value(legend)?);
    foreign.insert("summary".to_string(), serde_json::to_value(&bundle.report.summary)?);

    Ok(FeatureCollection {
        bbox: None,
        features,
        foreign_members: Some(foreign),
    })
}

pub fn write_geojson<W: Write>(bundle: &ExportBundle<'_>, writer: W) -> Result<()> {
    let collection = to_feature_collection(bundle)?;
    serde_json::to_writer(writer, &collection)?;
    Ok(())
}
