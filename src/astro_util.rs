// Copyright (c) 2024 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::f64::consts::PI;

use astro::{
    angle::limit_to_two_PI,
    coords::{alt_frm_eq, az_frm_eq},
    time::{julian_day, mn_sidr, CalType, Date},
};
use chrono::{DateTime, Datelike, Duration, FixedOffset, Timelike, Utc};

// An observer's position on Earth plus the civil instant for which sky
// positions are computed. Immutable for the duration of one search.
#[derive(Clone, Debug, PartialEq)]
pub struct ObserverContext {
    // Degrees, positive north.
    pub latitude: f64,
    // Degrees, positive east.
    pub longitude: f64,
    // Absolute instant carrying the observer's civil UTC offset.
    pub time: DateTime<FixedOffset>,
}

impl ObserverContext {
    pub fn utc(&self) -> DateTime<Utc> {
        self.time.with_timezone(&Utc)
    }

    // Local mean sidereal time at the observer's longitude, in hours 0..24.
    pub fn lst_hours(&self) -> f64 {
        let gmst = greenwich_mean_sidereal_time(&self.utc());
        let lmst = limit_to_two_PI(gmst + self.longitude.to_radians());
        lmst.to_degrees() / 15.0
    }
}

// Which side of the local meridian the target is on, relative to its
// upcoming (or just past) transit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitSide {
    Before,
    After,
}

impl TransitSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitSide::Before => "Before",
            TransitSide::After => "After",
        }
    }
}

// Output of `transit_and_alt_az()`. Angles in degrees.
#[derive(Clone, Debug, PartialEq)]
pub struct TransitInfo {
    pub altitude: f64,
    pub azimuth: f64,

    // Unsigned minutes between the observation instant and the target's
    // meridian transit; `side` carries the sign.
    pub transit_minutes: f64,
    pub side: TransitSide,

    // Absolute transit instant, in the observer's civil time.
    pub transit_time: DateTime<FixedOffset>,
}

/// Computes the apparent horizontal coordinates of a target and its offset
/// from meridian transit, as seen by `observer` at `observer.time`.
/// ra_deg/dec_deg are the target's equatorial coordinates in degrees.
///
/// Pure function of its arguments; performs no I/O.
pub fn transit_and_alt_az(ra_deg: f64, dec_deg: f64, observer: &ObserverContext)
                          -> TransitInfo {
    let (alt, az, _ha) = alt_az_from_equatorial(
        ra_deg.to_radians(), dec_deg.to_radians(),
        observer.latitude.to_radians(), observer.longitude.to_radians(),
        &observer.utc());

    // Transit occurs when the local sidereal time matches the target's
    // right ascension.
    let ra_hours = ra_deg / 15.0;
    let mut diff_hours = ra_hours - observer.lst_hours();
    // Normalize into [-12, 12).
    if diff_hours >= 12.0 {
        diff_hours -= 24.0;
    } else if diff_hours < -12.0 {
        diff_hours += 24.0;
    }
    let side = if diff_hours >= 0.0 {
        TransitSide::After
    } else {
        TransitSide::Before
    };
    let transit_minutes = diff_hours.abs() * 60.0;

    let offset = Duration::milliseconds((transit_minutes * 60_000.0).round() as i64);
    let transit_time = match side {
        TransitSide::After => observer.time + offset,
        TransitSide::Before => observer.time - offset,
    };

    TransitInfo {
        altitude: alt.to_degrees(),
        azimuth: az.to_degrees(),
        transit_minutes,
        side,
        transit_time,
    }
}

/// Returns (alt, az, ha) in radians. Returned azimuth is clockwise from north.
/// Returned hour angle is -PI..PI.
/// ra: right ascension in radians.
/// dec: declination in radians.
/// lat: observer latitude in radians.
/// long: observer longitude in radians.
pub fn alt_az_from_equatorial(ra: f64, dec: f64, lat: f64, long: f64,
                              time: &DateTime<Utc>)
                              -> (/* alt */ f64, /* az */ f64, /* ha */ f64) {
    let gmst = greenwich_mean_sidereal_time(time);

    // Note that astro::coords::hr_angl_frm_observer_long() has a bug.
    // Fortunately the correct relation is trivial.
    let hour_angle = gmst + long - ra;

    let meeus_az = az_frm_eq(hour_angle, dec, lat);
    let az = limit_to_two_PI(meeus_az + PI);
    let mut ha = limit_to_two_PI(hour_angle);
    if ha > PI {
        ha -= 2.0 * PI;
    }

    (alt_frm_eq(hour_angle, dec, lat), az, ha)
}

fn greenwich_mean_sidereal_time(dt_utc: &DateTime<Utc>) -> f64 {
    let date = Date {
        year: dt_utc.date_naive().year() as i16,
        month: dt_utc.date_naive().month() as u8,
        decimal_day: dt_utc.date_naive().day() as f64,
        cal_type: CalType::Gregorian,
    };
    let jd = julian_day(&date);

    let utc_hours = dt_utc.time().num_seconds_from_midnight() as f64 / 3600.0;
    let gmst_hours =
        mn_sidr(jd).to_degrees() / 15.0 + utc_hours * 1.00273790935;

    limit_to_two_PI((gmst_hours * 15.0).to_radians())
}

/// Formats a right ascension given in degrees as HH:MM:SS.
pub fn format_ra(ra_deg: f64) -> String {
    let hours = (ra_deg / 15.0).floor() as i64;
    let rem = ra_deg.rem_euclid(15.0);
    let minutes = (rem * 4.0).floor() as i64;
    let seconds = (rem * 240.0 - minutes as f64 * 60.0).floor() as i64;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// Formats a declination given in degrees as DD.DD with a degree glyph.
pub fn format_dec(dec_deg: f64) -> String {
    format!("{:.2}°", dec_deg)
}

/// Formats an unsigned transit offset given in minutes as HH:MM:SS.
pub fn format_offset_minutes(minutes: f64) -> String {
    let total_seconds = (minutes.abs() * 60.0) as i64;
    let hours = total_seconds / 3600;
    let mins = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, mins, secs)
}

/// Formats a decimal hour value (e.g. sidereal time) as HH:MM:SS.
pub fn format_hours_hms(hours: f64) -> String {
    let h = hours as i64;
    let m = ((hours * 60.0) % 60.0) as i64;
    let s = ((hours * 3600.0) % 60.0) as i64;
    format!("{:02}:{:02}:{:02}", h, m, s)
}

// mod tests.
