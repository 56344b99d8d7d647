//! Sector wedge geometry
//!
//! A wedge is a closed ring: the site (apex), an arc at `radius_m` swept from
//! `azimuth - beamwidth/2` to `azimuth + beamwidth/2`, and back to the apex.
//! A beamwidth of 360° or more is an omnidirectional site and yields a plain
//! circle with no apex vertex.
//!
//! # Projection
//!
//! Arc points use a flat-earth (equirectangular) offset around the apex:
//!
//! ```text
//! Δlat = d·cos(θ) / M
//! Δlon = d·sin(θ) / (M·cos(lat))
//! ```
//!
//! with `M = 111 320 m` per degree. Known limitation: the constant `M` is the
//! equatorial degree length, so north-south extents are off by up to ~0.7%
//! against the geodesic, and the error grows with `d / R` and `tan(lat)`.
//! For sector radii of a few kilometres away from the poles the wedge stays
//! within about 1% of a geodesic one. `cos(lat)` is floored at
//! [`MIN_COS_LAT`] so sites within ~0.6° of a pole still produce finite rings.
//!
//! Vertex latitudes are clamped to `[-90, 90]`, so a wedge reaching past a pole
//! is flattened against it. Longitudes are not wrapped: a site within one
//! radius of the antimeridian yields vertices slightly beyond ±180°, which
//! keeps the ring contiguous instead of splitting it across the map.

use crate::{Result, SectorError};
use serde::{Deserialize, Serialize};

/// Metres per degree of arc used by the flat-earth projection
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Default number of arc steps per wedge
pub const DEFAULT_ARC_SEGMENTS: usize = 16;

/// Smallest tessellation that still yields a polygon for an omni site
pub const MIN_ARC_SEGMENTS: usize = 3;

/// Largest tessellation accepted; one step per 0.1° of a full circle
pub const MAX_ARC_SEGMENTS: usize = 3600;

/// Floor on `cos(lat)` near the poles
pub const MIN_COS_LAT: f64 = 0.01;

/// A point in geographic coordinates (degrees).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    /// Latitude in degrees, -90 to +90.
    pub lat: f64,
    /// Longitude in degrees, -180 to +180.
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Validate latitude/longitude ranges
    pub fn checked(lat: f64, lon: f64) -> Result<Self> {
        if !(lat.is_finite() && (-90.0..=90.0).contains(&lat)) {
            return Err(SectorError::LatitudeOutOfRange(lat));
        }
        if !(lon.is_finite() && (-180.0..=180.0).contains(&lon)) {
            return Err(SectorError::LongitudeOutOfRange(lon));
        }
        Ok(Self { lat, lon })
    }

    /// `[lon, lat]` position, GeoJSON axis order
    pub fn position(&self) -> Vec<f64> {
        vec![self.lon, self.lat]
    }
}

/// A generated sector polygon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wedge {
    pub apex: LatLon,
    /// Closed ring: first vertex == last vertex
    pub ring: Vec<LatLon>,
    /// True when the wedge degenerated into a full circle
    pub omni: bool,
}

impl Wedge {
    pub fn is_closed(&self) -> bool {
        match (self.ring.first(), self.ring.last()) {
            (Some(first), Some(last)) => self.ring.len() >= 4 && first == last,
            _ => false,
        }
    }

    /// Number of distinct vertices (closing vertex not counted)
    pub fn vertex_count(&self) -> usize {
        self.ring.len().saturating_sub(1)
    }
}

/// Normalize a compass bearing into `[0, 360)`
pub fn normalize_azimuth(azimuth_deg: f64) -> f64 {
    let a = azimuth_deg.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if a >= 360.0 {
        0.0
    } else {
        a
    }
}

fn cos_lat(lat: f64) -> f64 {
    lat.to_radians().cos().max(MIN_COS_LAT)
}

/// Project `distance_m` metres from `origin` along `bearing_deg`
/// (clockwise from true north). The result's latitude is clamped to the poles.
pub fn destination_point(origin: LatLon, bearing_deg: f64, distance_m: f64) -> LatLon {
    let theta = bearing_deg.to_radians();
    let north_m = distance_m * theta.cos();
    let east_m = distance_m * theta.sin();
    LatLon {
        lat: (origin.lat + north_m / METERS_PER_DEGREE).clamp(-90.0, 90.0),
        lon: origin.lon + east_m / (METERS_PER_DEGREE * cos_lat(origin.lat)),
    }
}

/// Inverse of [`destination_point`]: `(east_m, north_m)` of `point` relative
/// to `origin` in the same flat-earth frame.
pub fn local_offset_m(origin: LatLon, point: LatLon) -> (f64, f64) {
    let north_m = (point.lat - origin.lat) * METERS_PER_DEGREE;
    let east_m = (point.lon - origin.lon) * METERS_PER_DEGREE * cos_lat(origin.lat);
    (east_m, north_m)
}

/// Flat-earth distance in metres between `origin` and `point`
pub fn local_distance_m(origin: LatLon, point: LatLon) -> f64 {
    let (east, north) = local_offset_m(origin, point);
    east.hypot(north)
}

/// Compass bearing in degrees `[0, 360)` from `origin` to `point`
pub fn local_bearing_deg(origin: LatLon, point: LatLon) -> f64 {
    let (east, north) = local_offset_m(origin, point);
    normalize_azimuth(east.atan2(north).to_degrees())
}

/// Build a sector wedge polygon.
///
/// Fails (never clamps) on non-positive radius or beamwidth, a non-finite
/// azimuth, out-of-range coordinates, or an arc step count outside
/// [`MIN_ARC_SEGMENTS`]..=[`MAX_ARC_SEGMENTS`].
pub fn build_wedge(
    lat: f64,
    lon: f64,
    azimuth_deg: f64,
    radius_m: f64,
    beamwidth_deg: f64,
    arc_segments: usize,
) -> Result<Wedge> {
    let apex = LatLon::checked(lat, lon)?;
    if !(radius_m.is_finite() && radius_m > 0.0) {
        return Err(SectorError::InvalidRadius(radius_m));
    }
    if !(beamwidth_deg.is_finite() && beamwidth_deg > 0.0) {
        return Err(SectorError::InvalidBeamwidth(beamwidth_deg));
    }
    if !azimuth_deg.is_finite() {
        return Err(SectorError::InvalidAzimuth(azimuth_deg));
    }
    if !(MIN_ARC_SEGMENTS..=MAX_ARC_SEGMENTS).contains(&arc_segments) {
        return Err(SectorError::Configuration(format!(
            "arc_segments must be in {}..={}, got {}",
            MIN_ARC_SEGMENTS, MAX_ARC_SEGMENTS, arc_segments
        )));
    }

    let azimuth = normalize_azimuth(azimuth_deg);

    if beamwidth_deg >= 360.0 {
        let step = 360.0 / arc_segments as f64;
        let mut ring: Vec<LatLon> = (0..arc_segments)
            .map(|i| destination_point(apex, azimuth + step * i as f64, radius_m))
            .collect();
        ring.push(ring[0]);
        return Ok(Wedge {
            apex,
            ring,
            omni: true,
        });
    }

    let start = azimuth - beamwidth_deg / 2.0;
    let step = beamwidth_deg / arc_segments as f64;

    let mut ring = Vec::with_capacity(arc_segments + 3);
    ring.push(apex);
    ring.extend((0..=arc_segments).map(|i| destination_point(apex, start + step * i as f64, radius_m)));
    ring.push(apex);

    Ok(Wedge {
        apex,
        ring,
        omni: false,
    })
}
