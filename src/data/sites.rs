//! Radar site definitions.

use crate::radar::SiteId;
use geo_types::Coord;

/// A WSR-88D radar site.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadarSite {
    pub id: &'static str,
    pub name: &'static str,
    pub lat: f64,
    pub lon: f64,
    /// Antenna elevation above mean sea level
    pub elevation_m: f32,
}

impl RadarSite {
    pub fn site_id(&self) -> SiteId {
        SiteId::new(self.id)
    }

    /// Site location (x = lon, y = lat).
    pub fn coord(&self) -> Coord<f64> {
        Coord {
            x: self.lon,
            y: self.lat,
        }
    }
}

#[rustfmt::skip]
pub static RADAR_SITES: &[RadarSite] = &[
    RadarSite { id: "KAMA", name: "Amarillo, TX", lat: 35.2333, lon: -101.7092, elevation_m: 1093.0 },
    RadarSite { id: "KATX", name: "Seattle, WA", lat: 48.1947, lon: -122.4956, elevation_m: 151.0 },
    RadarSite { id: "KBMX", name: "Birmingham, AL", lat: 33.1719, lon: -86.7697, elevation_m: 197.0 },
    RadarSite { id: "KDMX", name: "Des Moines, IA", lat: 41.7311, lon: -93.7228, elevation_m: 299.0 },
    RadarSite { id: "KEAX", name: "Kansas City, MO", lat: 38.8103, lon: -94.2644, elevation_m: 303.0 },
    RadarSite { id: "KFFC", name: "Atlanta, GA", lat: 33.3636, lon: -84.5658, elevation_m: 262.0 },
    RadarSite { id: "KFTG", name: "Denver, CO", lat: 39.7867, lon: -104.5458, elevation_m: 1675.0 },
    RadarSite { id: "KFWS", name: "Dallas/Fort Worth, TX", lat: 32.5731, lon: -97.3031, elevation_m: 208.0 },
    RadarSite { id: "KHGX", name: "Houston, TX", lat: 29.4719, lon: -95.0792, elevation_m: 5.0 },
    RadarSite { id: "KICT", name: "Wichita, KS", lat: 37.6544, lon: -97.4428, elevation_m: 407.0 },
    RadarSite { id: "KLOT", name: "Chicago, IL", lat: 41.6044, lon: -88.0844, elevation_m: 202.0 },
    RadarSite { id: "KLSX", name: "St. Louis, MO", lat: 38.6989, lon: -90.6828, elevation_m: 185.0 },
    RadarSite { id: "KLWX", name: "Sterling, VA", lat: 38.9753, lon: -77.4778, elevation_m: 83.0 },
    RadarSite { id: "KMPX", name: "Minneapolis, MN", lat: 44.8489, lon: -93.5653, elevation_m: 288.0 },
    RadarSite { id: "KMUX", name: "San Francisco, CA", lat: 37.1553, lon: -121.8983, elevation_m: 1057.0 },
    RadarSite { id: "KOKX", name: "New York City, NY", lat: 40.8656, lon: -72.8639, elevation_m: 26.0 },
    RadarSite { id: "KTLH", name: "Tallahassee, FL", lat: 30.3975, lon: -84.3289, elevation_m: 19.0 },
    RadarSite { id: "KTLX", name: "Oklahoma City, OK", lat: 35.3331, lon: -97.2778, elevation_m: 370.0 },
];

/// Looks up a site by id, case-insensitively.
pub fn get_site(id: &str) -> Option<&'static RadarSite> {
    let id = id.trim();
    RADAR_SITES.iter().find(|s| s.id.eq_ignore_ascii_case(id))
}

/// Sites ordered by id.
pub fn all_sites_sorted() -> Vec<&'static RadarSite> {
    let mut sites: Vec<&'static RadarSite> = RADAR_SITES.iter().collect();
    sites.sort_by_key(|s| s.id);
    sites
}
