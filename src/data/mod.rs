//! Static datasets.

pub mod sites;

pub use sites::{all_sites_sorted, get_site, RadarSite, RADAR_SITES};
