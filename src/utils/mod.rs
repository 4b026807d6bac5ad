//! Utility modules shared across the solver

pub mod units;

pub use units::{
    cm_per_year_to_m_per_s, deg_to_rad, seconds_to_years, years_to_seconds, VelocityUnit, SECONDS_PER_YEAR,
};
