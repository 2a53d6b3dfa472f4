//! Site-to-site distances
//!
//! Distances are biased by the desired side's rule extra distance so they can
//! be compared directly against a rule's maximum qualifying distance. The
//! result is negative when the sites are closer than the allowance.

use std::f64::consts::PI;
use study_model::{GeoPoint, Station};

/// Great-circle distance in km on the sphere implied by `km_per_degree`
pub fn great_circle_km(a: GeoPoint, b: GeoPoint, km_per_degree: f64) -> f64 {
    let radius = km_per_degree * 180.0 / PI;

    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    radius * c
}

/// Desired-side sites with their own allowance
fn desired_sites(station: &Station) -> Vec<(GeoPoint, f64)> {
    let sites: Vec<_> = station
        .active_transmitters()
        .map(|t| (t.location, t.rule_extra_distance_km))
        .collect();
    if sites.is_empty() {
        vec![(station.location, station.rule_extra_distance_km)]
    } else {
        sites
    }
}

fn undesired_points(station: &Station, check_each_transmitter: bool) -> Vec<GeoPoint> {
    if check_each_transmitter {
        let sites: Vec<_> = station.active_transmitters().map(|t| t.location).collect();
        if !sites.is_empty() {
            return sites;
        }
    }
    vec![station.location]
}

/// Signed qualifying distance from `desired` to `undesired`
///
/// Minimum over the desired station's active sub-sites (or its single site) of
/// the raw distance less that site's extra distance. With
/// `check_each_transmitter`, a distributed undesired station contributes every
/// active sub-site instead of its reference point.
pub fn distance(
    desired: &Station,
    undesired: &Station,
    km_per_degree: f64,
    check_each_transmitter: bool,
) -> f64 {
    let targets = undesired_points(undesired, check_each_transmitter);

    desired_sites(desired)
        .into_iter()
        .flat_map(|(site, extra)| {
            targets
                .iter()
                .map(move |&p| great_circle_km(site, p, km_per_degree) - extra)
        })
        .fold(f64::INFINITY, f64::min)
}
