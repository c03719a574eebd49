//! Time-zone resolution for appointments.
//!
//! Priority: explicit zone on the request, then the configured service zone,
//! then the host's local zone, then UTC. Unknown names fall through to the
//! next candidate.

use chrono_tz::Tz;
use tracing::warn;

/// Parse an IANA zone name, logging unknown names.
pub fn parse_zone(name: &str) -> Option<Tz> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    match name.parse::<Tz>() {
        Ok(tz) => Some(tz),
        Err(_) => {
            warn!(zone = %name, "Ignoring unknown time zone");
            None
        }
    }
}

/// The host's local zone, if it can be determined.
pub fn host_zone() -> Option<Tz> {
    iana_time_zone::get_timezone()
        .ok()
        .and_then(|name| parse_zone(&name))
}

/// Resolve the zone an appointment is booked in.
pub fn resolve_zone(explicit: Option<&str>, configured: Option<&str>) -> Tz {
    resolve_zone_with_host(explicit, configured, host_zone())
}

/// As [`resolve_zone`], with the host zone supplied by the caller.
pub fn resolve_zone_with_host(
    explicit: Option<&str>,
    configured: Option<&str>,
    host: Option<Tz>,
) -> Tz {
    explicit
        .and_then(parse_zone)
        .or_else(|| configured.and_then(parse_zone))
        .or(host)
        .unwrap_or(Tz::UTC)
}
