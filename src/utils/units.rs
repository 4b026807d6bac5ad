//! Unit conversions used by the driver and the boundary-condition setup
//!
//! The solver works in SI throughout; configuration may give times in years
//! and boundary velocities in geological rates.

use crate::error::{SimError, SimResult};

// ============================================================================
// Time
// ============================================================================

/// Seconds per year (365.25 days)
pub const SECONDS_PER_YEAR: f64 = 365.25 * 24.0 * 3600.0;

/// Convert years to seconds
///
/// # Examples
/// ```
/// use geo_lagrangian::utils::units::years_to_seconds;
/// let t_final = years_to_seconds(1.0e6); // 1 Myr
/// ```
#[inline]
pub fn years_to_seconds(years: f64) -> f64 {
    years * SECONDS_PER_YEAR
}

/// Convert seconds to years
#[inline]
pub fn seconds_to_years(seconds: f64) -> f64 {
    seconds / SECONDS_PER_YEAR
}

// ============================================================================
// Velocity
// ============================================================================

/// Unit of the boundary velocities given in the `[bc]` section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VelocityUnit {
    CentimetersPerYear,
    MillimetersPerYear,
    MetersPerYear,
    MetersPerSecond,
}

impl VelocityUnit {
    /// Parse the unit label used in configuration files.
    ///
    /// Unknown labels are an error.
    pub fn parse(label: &str) -> SimResult<Self> {
        match label.trim() {
            "cm/yr" => Ok(VelocityUnit::CentimetersPerYear),
            "mm/yr" => Ok(VelocityUnit::MillimetersPerYear),
            "m/yr" => Ok(VelocityUnit::MetersPerYear),
            "m/s" => Ok(VelocityUnit::MetersPerSecond),
            other => Err(SimError::unknown("velocity unit", other)),
        }
    }

    /// Factor converting a value in this unit to m/s
    pub fn to_si(self) -> f64 {
        match self {
            VelocityUnit::CentimetersPerYear => 1e-2 / SECONDS_PER_YEAR,
            VelocityUnit::MillimetersPerYear => 1e-3 / SECONDS_PER_YEAR,
            VelocityUnit::MetersPerYear => 1.0 / SECONDS_PER_YEAR,
            VelocityUnit::MetersPerSecond => 1.0,
        }
    }
}

/// Convert centimeters per year to meters per second
#[inline]
pub fn cm_per_year_to_m_per_s(cm_per_year: f64) -> f64 {
    cm_per_year * VelocityUnit::CentimetersPerYear.to_si()
}

// ============================================================================
// Angles
// ============================================================================

/// Convert degrees to radians
#[inline]
pub fn deg_to_rad(degrees: f64) -> f64 {
    degrees.to_radians()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_time_conversions() {
        let seconds = years_to_seconds(1000.0);
        assert_relative_eq!(seconds_to_years(seconds), 1000.0, epsilon = 1e-10);
        assert!((SECONDS_PER_YEAR - 31_557_600.0).abs() < 1.0);
    }

    #[test]
    fn test_velocity_units() {
        assert_eq!(VelocityUnit::parse("cm/yr").unwrap(), VelocityUnit::CentimetersPerYear);
        assert_eq!(VelocityUnit::parse(" mm/yr ").unwrap(), VelocityUnit::MillimetersPerYear);
        assert!(VelocityUnit::parse("furlong/fortnight").is_err());

        // π cm/yr ≈ 1e-9 m/s
        assert!((cm_per_year_to_m_per_s(3.15) - 1e-9).abs() < 1e-10);
        assert_relative_eq!(
            10.0 * VelocityUnit::MillimetersPerYear.to_si(),
            VelocityUnit::CentimetersPerYear.to_si(),
            max_relative = 1e-14
        );
        assert_eq!(VelocityUnit::MetersPerSecond.to_si(), 1.0);
    }

    #[test]
    fn test_angle_conversions() {
        assert!((deg_to_rad(180.0) - std::f64::consts::PI).abs() < 1e-12);
        assert!((deg_to_rad(30.0) - std::f64::consts::FRAC_PI_6).abs() < 1e-12);
    }
}
