//! Per-material parameters and the gamma-law equation of state
//!
//! Material ids are 1-based and contiguous. The configuration gives one list
//! per parameter; a single-entry list applies to every material.

use crate::config::MatConfig;
use crate::error::{SimError, SimResult};
use crate::utils::deg_to_rad;

/// Relaxation time used when viscoplastic regularisation is off
pub const INVISCID_PLASTIC_VISCOSITY: f64 = 1.0e300;

/// Constant parameters of one material zone
///
/// Angles are stored in radians.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialZoneParameters {
    /// Reference density ρ0 (kg/m³)
    pub rho: f64,
    /// First Lamé parameter λ (Pa)
    pub lambda: f64,
    /// Shear modulus μ (Pa)
    pub mu: f64,
    /// Gamma-law exponent of the equation of state
    pub gamma: f64,
    /// Tensile strength limit (Pa)
    pub tension_cutoff: f64,
    /// Cohesion at plastic strain pls0 / pls1 (Pa)
    pub cohesion0: f64,
    pub cohesion1: f64,
    pub friction_angle0: f64,
    pub friction_angle1: f64,
    pub dilation_angle0: f64,
    pub dilation_angle1: f64,
    /// Softening interval in accumulated plastic strain
    pub pls0: f64,
    pub pls1: f64,
    /// Viscoplastic relaxation time (s)
    pub plastic_viscosity: f64,
}

impl MaterialZoneParameters {
    /// Elastic zone without plastic weakening, convenient for tests and demos
    pub fn elastic(rho: f64, lambda: f64, mu: f64) -> Self {
        Self {
            rho,
            lambda,
            mu,
            gamma: 1.4,
            tension_cutoff: 0.0,
            cohesion0: 44.0e6,
            cohesion1: 44.0e6,
            friction_angle0: deg_to_rad(30.0),
            friction_angle1: deg_to_rad(30.0),
            dilation_angle0: 0.0,
            dilation_angle1: 0.0,
            pls0: 0.0,
            pls1: 0.5,
            plastic_viscosity: INVISCID_PLASTIC_VISCOSITY,
        }
    }

    /// P-wave modulus λ + 2μ
    pub fn p_wave_modulus(&self) -> f64 {
        self.lambda + 2.0 * self.mu
    }

    /// Cohesion, friction angle and dilation angle after linear softening
    ///
    /// Values are interpolated between the `0` and `1` parameters over
    /// `[pls0, pls1]` and held constant outside the interval.
    pub fn softened_properties(&self, accumulated_strain: f64) -> (f64, f64, f64) {
        let ratio = if self.pls1 > self.pls0 {
            ((accumulated_strain - self.pls0) / (self.pls1 - self.pls0)).clamp(0.0, 1.0)
        } else if accumulated_strain >= self.pls1 {
            1.0
        } else {
            0.0
        };

        let lerp = |a: f64, b: f64| a + (b - a) * ratio;
        (
            lerp(self.cohesion0, self.cohesion1),
            lerp(self.friction_angle0, self.friction_angle1),
            lerp(self.dilation_angle0, self.dilation_angle1),
        )
    }

    fn validate(&self, id: usize) -> SimResult<()> {
        if !(self.rho > 0.0) {
            return Err(SimError::InvalidMaterial(format!("material {id}: rho must be positive")));
        }
        if !(self.mu >= 0.0) || !(self.p_wave_modulus() >= 0.0) {
            return Err(SimError::InvalidMaterial(format!(
                "material {id}: elastic moduli give a negative P-wave modulus"
            )));
        }
        if !(self.gamma >= 1.0) {
            return Err(SimError::InvalidMaterial(format!("material {id}: gamma must be >= 1")));
        }
        let right_angle = std::f64::consts::FRAC_PI_2;
        for angle in [
            self.friction_angle0,
            self.friction_angle1,
            self.dilation_angle0,
            self.dilation_angle1,
        ] {
            if !(0.0..right_angle).contains(&angle) {
                return Err(SimError::InvalidMaterial(format!(
                    "material {id}: friction/dilation angles must lie in [0, 90) degrees"
                )));
            }
        }
        if self.cohesion0 < 0.0 || self.cohesion1 < 0.0 || self.tension_cutoff < 0.0 {
            return Err(SimError::InvalidMaterial(format!(
                "material {id}: cohesion and tension cutoff must be non-negative"
            )));
        }
        if !(self.plastic_viscosity > 0.0) {
            return Err(SimError::InvalidMaterial(format!(
                "material {id}: plastic_viscosity must be positive"
            )));
        }
        Ok(())
    }
}

/// Material zones indexed by 1-based material id
#[derive(Debug, Clone)]
pub struct MaterialTable {
    zones: Vec<MaterialZoneParameters>,
}

impl MaterialTable {
    pub fn new(zones: Vec<MaterialZoneParameters>) -> SimResult<Self> {
        if zones.is_empty() {
            return Err(SimError::InvalidMaterial("material table is empty".into()));
        }
        for (i, zone) in zones.iter().enumerate() {
            zone.validate(i + 1)?;
        }
        Ok(Self { zones })
    }

    /// One zone shared by every cell
    pub fn uniform(zone: MaterialZoneParameters) -> SimResult<Self> {
        Self::new(vec![zone])
    }

    /// Build the table for the material ids present on the mesh
    ///
    /// `material_ids` are the distinct ids of the mesh, sorted; they must be
    /// exactly `1..=n`. Each list in `mat` must have length 1 or `n`.
    pub fn from_config(mat: &MatConfig, material_ids: &[usize]) -> SimResult<Self> {
        let n = material_ids.len();
        if n == 0 || material_ids.iter().enumerate().any(|(i, &id)| id != i + 1) {
            return Err(SimError::InvalidMaterial(format!(
                "material ids must be contiguous from 1, found {material_ids:?}"
            )));
        }

        for (key, list) in mat.lists() {
            if list.len() != 1 && list.len() != n {
                return Err(SimError::InvalidMaterial(format!(
                    "mat.{key} has {} entries but the mesh has {n} material ids",
                    list.len()
                )));
            }
        }

        let pick = |list: &[f64], i: usize| if list.len() == 1 { list[0] } else { list[i] };

        let zones = (0..n)
            .map(|i| MaterialZoneParameters {
                rho: pick(&mat.rho, i),
                lambda: pick(&mat.lambda, i),
                mu: pick(&mat.mu, i),
                gamma: pick(&mat.gamma, i),
                tension_cutoff: pick(&mat.tension_cutoff, i),
                cohesion0: pick(&mat.cohesion0, i),
                cohesion1: pick(&mat.cohesion1, i),
                friction_angle0: deg_to_rad(pick(&mat.friction_angle0, i)),
                friction_angle1: deg_to_rad(pick(&mat.friction_angle1, i)),
                dilation_angle0: deg_to_rad(pick(&mat.dilation_angle0, i)),
                dilation_angle1: deg_to_rad(pick(&mat.dilation_angle1, i)),
                pls0: pick(&mat.pls0, i),
                pls1: pick(&mat.pls1, i),
                plastic_viscosity: if mat.viscoplastic {
                    pick(&mat.plastic_viscosity, i)
                } else {
                    INVISCID_PLASTIC_VISCOSITY
                },
            })
            .collect();

        Self::new(zones)
    }

    pub fn num_materials(&self) -> usize {
        self.zones.len()
    }

    /// Zone of a 1-based material id
    ///
    /// Ids outside the table fall back to the last zone, so a uniform table
    /// serves meshes with any id.
    #[inline]
    pub fn zone(&self, material_id: usize) -> &MaterialZoneParameters {
        let idx = material_id.saturating_sub(1).min(self.zones.len() - 1);
        &self.zones[idx]
    }

    pub fn zones(&self) -> &[MaterialZoneParameters] {
        &self.zones
    }

    /// Check that every id on the mesh has its own zone
    pub fn covers(&self, material_ids: &[usize]) -> SimResult<()> {
        if self.zones.len() == 1 {
            return Ok(());
        }
        match material_ids.iter().find(|&&id| id == 0 || id > self.zones.len()) {
            Some(id) => Err(SimError::InvalidMaterial(format!(
                "mesh uses material id {id} but the table has {} zones",
                self.zones.len()
            ))),
            None => Ok(()),
        }
    }
}

/// Pressure and sound speed of one material point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EosState {
    pub pressure: f64,
    pub sound_speed: f64,
}

/// Ideal-gas-type equation of state with an elastic wave-speed floor
///
/// ```text
/// p    = (γ - 1) ρ max(e, 0)
/// cs²  = γ (γ - 1) max(e, 0) + (λ + 2μ) / ρ
/// ```
pub struct GammaLawEos;

impl GammaLawEos {
    #[inline]
    pub fn evaluate(zone: &MaterialZoneParameters, rho: f64, energy: f64) -> EosState {
        let e = energy.max(0.0);
        let gm1 = zone.gamma - 1.0;
        let elastic = if rho > 0.0 { zone.p_wave_modulus() / rho } else { 0.0 };
        let cs2 = (zone.gamma * gm1 * e + elastic).max(0.0);
        EosState {
            pressure: gm1 * rho * e,
            sound_speed: cs2.sqrt(),
        }
    }

    /// Evaluate a batch of points; all slices have the same length
    pub fn evaluate_batch(
        zones: &[&MaterialZoneParameters],
        rho: &[f64],
        energy: &[f64],
        out: &mut [EosState],
    ) {
        for (((state, zone), &r), &e) in out.iter_mut().zip(zones).zip(rho).zip(energy) {
            *state = Self::evaluate(zone, r, e);
        }
    }
}
