use crate::error::{SimError, SimResult};

/// Number of Gauss points per coordinate direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuadratureOrder {
    Two,
    Three,
    Four,
}

impl QuadratureOrder {
    pub fn from_points(n: usize) -> SimResult<Self> {
        match n {
            2 => Ok(Self::Two),
            3 => Ok(Self::Three),
            4 => Ok(Self::Four),
            other => Err(SimError::unknown("quadrature points per direction", other)),
        }
    }

    pub fn points_per_direction(self) -> usize {
        match self {
            Self::Two => 2,
            Self::Three => 3,
            Self::Four => 4,
        }
    }
}

/// Tensor-product Gauss-Legendre rule on the reference cell [0,1]^dim
///
/// Points are stored lexicographically with x running fastest, matching the
/// node ordering of the Q1 basis. Unused coordinates of 2-D points are zero.
#[derive(Debug, Clone)]
pub struct GaussQuadrature {
    pub dim: usize,
    /// Integration point coordinates on [0,1]^dim
    pub points: Vec<[f64; 3]>,
    /// Integration weights (sum to 1, the reference cell volume)
    pub weights: Vec<f64>,
}

impl GaussQuadrature {
    /// One-dimensional Gauss-Legendre points and weights mapped to [0,1]
    pub fn line(order: QuadratureOrder) -> (Vec<f64>, Vec<f64>) {
        // Abscissae and weights on [-1,1]
        let (xi, w): (Vec<f64>, Vec<f64>) = match order {
            QuadratureOrder::Two => {
                let a = 1.0 / 3.0_f64.sqrt();
                (vec![-a, a], vec![1.0, 1.0])
            }
            QuadratureOrder::Three => {
                let a = (3.0_f64 / 5.0).sqrt();
                (vec![-a, 0.0, a], vec![5.0 / 9.0, 8.0 / 9.0, 5.0 / 9.0])
            }
            QuadratureOrder::Four => {
                let a = 0.3399810435848563;
                let b = 0.8611363115940526;
                let wa = 0.6521451548625461;
                let wb = 0.3478548451374538;
                (vec![-b, -a, a, b], vec![wb, wa, wa, wb])
            }
        };
        let points = xi.iter().map(|&x| 0.5 * (1.0 + x)).collect();
        let weights = w.iter().map(|&wi| 0.5 * wi).collect();
        (points, weights)
    }

    /// Tensor rule for a quadrilateral (dim = 2) or hexahedron (dim = 3)
    pub fn tensor(dim: usize, order: QuadratureOrder) -> SimResult<Self> {
        let (p1, w1) = Self::line(order);
        let n = p1.len();
        let mut points = Vec::new();
        let mut weights = Vec::new();
        match dim {
            2 => {
                for j in 0..n {
                    for i in 0..n {
                        points.push([p1[i], p1[j], 0.0]);
                        weights.push(w1[i] * w1[j]);
                    }
                }
            }
            3 => {
                for k in 0..n {
                    for j in 0..n {
                        for i in 0..n {
                            points.push([p1[i], p1[j], p1[k]]);
                            weights.push(w1[i] * w1[j] * w1[k]);
                        }
                    }
                }
            }
            other => return Err(SimError::unknown("dimension", other)),
        }
        Ok(Self { dim, points, weights })
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }
}

/// Kernel variant over {2-D, 3-D} × {2, 3, 4 points per direction}
///
/// Resolved once from the configuration when the operator is built; the
/// quadrature kernel matches on it instead of carrying generic parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelDispatch {
    Plane(QuadratureOrder),
    Solid(QuadratureOrder),
}

impl KernelDispatch {
    pub fn resolve(dim: usize, quad_points: usize) -> SimResult<Self> {
        let order = QuadratureOrder::from_points(quad_points)?;
        match dim {
            2 => Ok(Self::Plane(order)),
            3 => Ok(Self::Solid(order)),
            other => Err(SimError::unknown("dimension", other)),
        }
    }

    pub fn dim(self) -> usize {
        match self {
            Self::Plane(_) => 2,
            Self::Solid(_) => 3,
        }
    }

    pub fn order(self) -> QuadratureOrder {
        match self {
            Self::Plane(order) | Self::Solid(order) => order,
        }
    }

    /// Cells evaluated together per material-property batch
    pub fn batch_size(self) -> usize {
        match self {
            Self::Plane(_) => 3,
            Self::Solid(_) => 3,
        }
    }

    /// Quadrature points per cell
    pub fn points_per_cell(self) -> usize {
        self.order().points_per_direction().pow(self.dim() as u32)
    }

    pub fn quadrature(self) -> SimResult<GaussQuadrature> {
        GaussQuadrature::tensor(self.dim(), self.order())
    }
}
