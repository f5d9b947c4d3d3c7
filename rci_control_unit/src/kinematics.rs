//! Kinematic models plugged into the transform engine.
//!
//! A model supplies the joint → axis position map, its Jacobian and the
//! `J̇·q̇` term. Everything else (velocity, force, impedance propagation and
//! the inverse) is derived by [`crate::transform`] from these three.
//!
//! Reference models:
//! - [`PlanarArm`] - N-link planar serial arm, axes `x, y`.
//! - [`LinearCoupling`] - constant coupling `x = C·q + b`.
//! - [`DifferentialWrist`] - two-motor bevel differential (pitch/roll).

use nalgebra::{SMatrix, SVector};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use rci_common::error::ControllerError;

/// Derived operating range of one joint (offset-relative frame).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointRange {
    pub min: f64,
    pub max: f64,
    /// Rest posture (mid-range).
    pub rest: f64,
}

impl JointRange {
    /// Range from calibrated bounds, rest at mid-range.
    #[inline]
    pub fn from_bounds(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            rest: 0.5 * (min + max),
        }
    }

    /// Clamp `value` into the range.
    #[inline]
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// Joint → axis map with first-order sensitivity.
///
/// `J` joints, `A` axes. The engine requires `J >= A`.
pub trait KinematicModel<const J: usize, const A: usize>: Send + Sized + 'static {
    /// Parameters read from the `[model]` table.
    type Config: DeserializeOwned + Default + Send;

    /// Build the model from its configuration.
    fn from_config(config: &Self::Config) -> Result<Self, ControllerError>;

    /// Axis positions `x = f(q)`.
    fn forward_position(&self, q: &SVector<f64, J>) -> SVector<f64, A>;

    /// Jacobian `∂f/∂q` at `q`.
    fn jacobian(&self, q: &SVector<f64, J>) -> SMatrix<f64, A, J>;

    /// Velocity product `J̇(q, q̇)·q̇` (zero for linear maps).
    fn velocity_product(&self, q: &SVector<f64, J>, qd: &SVector<f64, J>) -> SVector<f64, A>;

    /// Hook run every Preprocessing step with the derived joint ranges.
    ///
    /// Must be a pure function of `ranges`.
    fn preprocess(&mut self, _ranges: &[JointRange; J]) {}

    /// Joint names used when the configuration declares none.
    fn default_joint_names() -> Vec<String> {
        (1..=J).map(|i| format!("joint_{i}")).collect()
    }

    /// Axis names used when the configuration declares none.
    fn default_axis_names() -> Vec<String> {
        (1..=A).map(|i| format!("axis_{i}")).collect()
    }
}

fn check_finite_positive(what: &str, values: &[f64]) -> Result<(), ControllerError> {
    for (i, v) in values.iter().enumerate() {
        if !v.is_finite() || *v <= 0.0 {
            return Err(ControllerError::Model(format!(
                "{what}[{i}] = {v} must be finite and > 0"
            )));
        }
    }
    Ok(())
}

// ─── Planar arm ─────────────────────────────────────────────────────

/// `[model]` table of [`PlanarArm`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanarArmConfig {
    /// Link lengths, base first. Empty means unit links.
    pub link_lengths: Vec<f64>,
}

/// Planar serial arm with `N` revolute joints.
///
/// Link `i` points along `θᵢ = q₁ + … + qᵢ`:
/// `x = Σ lᵢ cos θᵢ`, `y = Σ lᵢ sin θᵢ`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanarArm<const N: usize> {
    lengths: [f64; N],
}

impl<const N: usize> PlanarArm<N> {
    pub fn new(lengths: [f64; N]) -> Result<Self, ControllerError> {
        check_finite_positive("link_lengths", &lengths)?;
        Ok(Self { lengths })
    }

    #[inline]
    pub const fn link_lengths(&self) -> &[f64; N] {
        &self.lengths
    }

    /// Cumulative link angles `θᵢ`.
    #[inline]
    fn link_angles(q: &SVector<f64, N>) -> [f64; N] {
        let mut theta = [0.0; N];
        let mut acc = 0.0;
        for (t, qi) in theta.iter_mut().zip(q.iter()) {
            acc += qi;
            *t = acc;
        }
        theta
    }
}

impl<const N: usize> KinematicModel<N, 2> for PlanarArm<N> {
    type Config = PlanarArmConfig;

    fn from_config(config: &Self::Config) -> Result<Self, ControllerError> {
        if config.link_lengths.is_empty() {
            return Self::new([1.0; N]);
        }
        let lengths: [f64; N] = config.link_lengths.as_slice().try_into().map_err(|_| {
            ControllerError::Model(format!(
                "expected {N} link lengths, got {}",
                config.link_lengths.len()
            ))
        })?;
        Self::new(lengths)
    }

    fn forward_position(&self, q: &SVector<f64, N>) -> SVector<f64, 2> {
        let theta = Self::link_angles(q);
        let mut x = 0.0;
        let mut y = 0.0;
        for (l, t) in self.lengths.iter().zip(theta.iter()) {
            x += l * t.cos();
            y += l * t.sin();
        }
        SVector::<f64, 2>::new(x, y)
    }

    fn jacobian(&self, q: &SVector<f64, N>) -> SMatrix<f64, 2, N> {
        let theta = Self::link_angles(q);
        let mut jac = SMatrix::<f64, 2, N>::zeros();
        // Column k collects every link at or beyond joint k.
        let mut sx = 0.0;
        let mut sy = 0.0;
        for k in (0..N).rev() {
            sx += self.lengths[k] * theta[k].sin();
            sy += self.lengths[k] * theta[k].cos();
            jac[(0, k)] = -sx;
            jac[(1, k)] = sy;
        }
        jac
    }

    fn velocity_product(&self, q: &SVector<f64, N>, qd: &SVector<f64, N>) -> SVector<f64, 2> {
        let theta = Self::link_angles(q);
        let theta_dot = Self::link_angles(qd);
        let mut ax = 0.0;
        let mut ay = 0.0;
        for i in 0..N {
            let w2 = theta_dot[i] * theta_dot[i];
            ax -= self.lengths[i] * theta[i].cos() * w2;
            ay -= self.lengths[i] * theta[i].sin() * w2;
        }
        SVector::<f64, 2>::new(ax, ay)
    }

    fn default_joint_names() -> Vec<String> {
        match N {
            2 => vec!["shoulder".to_string(), "elbow".to_string()],
            3 => vec![
                "shoulder".to_string(),
                "elbow".to_string(),
                "wrist".to_string(),
            ],
            _ => (1..=N).map(|i| format!("joint_{i}")).collect(),
        }
    }

    fn default_axis_names() -> Vec<String> {
        vec!["x".to_string(), "y".to_string()]
    }
}

// ─── Linear coupling ────────────────────────────────────────────────

/// `[model]` table of [`LinearCoupling`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearCouplingConfig {
    /// Coupling matrix, one row per axis. Empty means identity rows.
    pub matrix: Vec<Vec<f64>>,
    /// Constant axis offset `b`. Empty means zero.
    pub bias: Vec<f64>,
}

/// Constant linear map `x = C·q + b` (gearing, lead screws, belts).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearCoupling<const J: usize, const A: usize> {
    matrix: SMatrix<f64, A, J>,
    bias: SVector<f64, A>,
}

impl<const J: usize, const A: usize> LinearCoupling<J, A> {
    /// Build from a coupling matrix and bias; `C` must have full row rank.
    pub fn new(matrix: SMatrix<f64, A, J>, bias: SVector<f64, A>) -> Result<Self, ControllerError> {
        if matrix.iter().chain(bias.iter()).any(|v| !v.is_finite()) {
            return Err(ControllerError::Model(
                "coupling coefficients must be finite".to_string(),
            ));
        }
        let gram = matrix * matrix.transpose();
        if gram.cholesky().is_none() {
            return Err(ControllerError::Model(
                "coupling matrix must have full row rank".to_string(),
            ));
        }
        Ok(Self { matrix, bias })
    }

}

impl<const J: usize, const A: usize> KinematicModel<J, A> for LinearCoupling<J, A> {
    type Config = LinearCouplingConfig;

    fn from_config(config: &Self::Config) -> Result<Self, ControllerError> {
        let mut matrix = SMatrix::<f64, A, J>::zeros();
        if config.matrix.is_empty() {
            for i in 0..A {
                matrix[(i, i)] = 1.0;
            }
        } else {
            if config.matrix.len() != A {
                return Err(ControllerError::Model(format!(
                    "coupling matrix has {} rows, expected {A}",
                    config.matrix.len()
                )));
            }
            for (i, row) in config.matrix.iter().enumerate() {
                if row.len() != J {
                    return Err(ControllerError::Model(format!(
                        "coupling row {i} has {} columns, expected {J}",
                        row.len()
                    )));
                }
                for (j, v) in row.iter().enumerate() {
                    matrix[(i, j)] = *v;
                }
            }
        }

        let mut bias = SVector::<f64, A>::zeros();
        if !config.bias.is_empty() {
            if config.bias.len() != A {
                return Err(ControllerError::Model(format!(
                    "bias has {} entries, expected {A}",
                    config.bias.len()
                )));
            }
            for (b, v) in bias.iter_mut().zip(config.bias.iter()) {
                *b = *v;
            }
        }
        Self::new(matrix, bias)
    }

    #[inline]
    fn forward_position(&self, q: &SVector<f64, J>) -> SVector<f64, A> {
        self.matrix * q + self.bias
    }

    #[inline]
    fn jacobian(&self, _q: &SVector<f64, J>) -> SMatrix<f64, A, J> {
        self.matrix
    }

    #[inline]
    fn velocity_product(&self, _q: &SVector<f64, J>, _qd: &SVector<f64, J>) -> SVector<f64, A> {
        SVector::<f64, A>::zeros()
    }
}

// ─── Differential wrist ─────────────────────────────────────────────

/// `[model]` table of [`DifferentialWrist`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DifferentialWristConfig {
    /// Bevel gear ratio (output per motor revolution).
    pub gear_ratio: f64,
}

impl Default for DifferentialWristConfig {
    fn default() -> Self {
        Self { gear_ratio: 1.0 }
    }
}

/// Two motors driving pitch and roll through a bevel differential:
/// `pitch = r·(m₁ + m₂)/2`, `roll = r·(m₁ − m₂)/2`.
///
/// Impedance is pooled across the motors: both axes report
/// `(K₁ + K₂)/r²`, and setpoints give both motors
/// `r²·(K_pitch + K_roll)/4`. A round trip returns the mean motor value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DifferentialWrist {
    coupling: LinearCoupling<2, 2>,
}

impl DifferentialWrist {
    pub fn new(gear_ratio: f64) -> Result<Self, ControllerError> {
        check_finite_positive("gear_ratio", &[gear_ratio])?;
        let h = 0.5 * gear_ratio;
        let matrix = SMatrix::<f64, 2, 2>::new(h, h, h, -h);
        Ok(Self {
            coupling: LinearCoupling::new(matrix, SVector::<f64, 2>::zeros())?,
        })
    }
}

impl KinematicModel<2, 2> for DifferentialWrist {
    type Config = DifferentialWristConfig;

    fn from_config(config: &Self::Config) -> Result<Self, ControllerError> {
        Self::new(config.gear_ratio)
    }

    #[inline]
    fn forward_position(&self, q: &SVector<f64, 2>) -> SVector<f64, 2> {
        self.coupling.forward_position(q)
    }

    #[inline]
    fn jacobian(&self, q: &SVector<f64, 2>) -> SMatrix<f64, 2, 2> {
        self.coupling.jacobian(q)
    }

    #[inline]
    fn velocity_product(&self, q: &SVector<f64, 2>, qd: &SVector<f64, 2>) -> SVector<f64, 2> {
        self.coupling.velocity_product(q, qd)
    }

    fn default_joint_names() -> Vec<String> {
        vec!["motor_left".to_string(), "motor_right".to_string()]
    }

    fn default_axis_names() -> Vec<String> {
        vec!["pitch".to_string(), "roll".to_string()]
    }
}
