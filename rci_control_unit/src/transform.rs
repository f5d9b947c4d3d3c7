//! Coordinate transform engine: joint ↔ axis for measures and setpoints.
//!
//! ## Forward (measurement) pass
//! - `x = f(q)`, `ẋ = J·q̇`, `ẍ = J·q̈ + J̇q̇`
//! - `F = (J⁺)ᵀ·τ`
//! - impedance by congruence, diagonal kept: `Kx = diag((J⁺)ᵀ·diag(Kq)·J⁺)`
//!
//! ## Inverse (setpoint) pass
//! - damped Newton `q ← q + J⁺·(x_d − f(q))`, seeded from the measured joints
//! - `q̇ = J⁺·ẋ`, `q̈ = J⁺·(ẍ − J̇q̇)`, `τ = Jᵀ·F`
//! - `Kq = diag(Jᵀ·diag(Kx)·J)` (same for damping and inertia)
//!
//! ## Resolution policy
//! `J⁺ = Jᵀ(JJᵀ + λ²I)⁻¹` with `λ = 0` while the manipulability
//! `w = sqrt(det(JJᵀ))` is at or above `singularity_threshold`, otherwise
//! `λ² = damping² · (1 − (w/threshold)²)`. With `J > A` this is the
//! minimum-norm solution; near singularities it is damped least squares.
//!
//! The diagonal congruence round-trips exactly for decoupled maps (each
//! joint drives exactly one axis). Coupled maps do not round-trip:
//! off-diagonal impedance terms are not representable in a per-DoF record.
//! A differential pools its motors, so both axes see `(Kq₁ + Kq₂)/r²` and
//! the inverse hands each motor the mean joint stiffness.

use nalgebra::{SMatrix, SVector};

use rci_common::config::TransformConfig;
use rci_common::dof::DoFVariables;

use crate::kinematics::KinematicModel;

/// Damped least-squares pseudo-inverse of an `A×J` Jacobian.
#[derive(Debug, Clone, Copy)]
pub struct PseudoInverse<const J: usize, const A: usize> {
    /// `J⁺` (`J×A`).
    pub matrix: SMatrix<f64, J, A>,
    /// `sqrt(det(JJᵀ))` of the undamped Jacobian.
    pub manipulability: f64,
    /// True when `λ > 0` was applied.
    pub damped: bool,
}

/// Manipulability `sqrt(det(JJᵀ))`, 0 when `JJᵀ` is not positive definite.
pub fn manipulability<const J: usize, const A: usize>(jac: &SMatrix<f64, A, J>) -> f64 {
    let gram = jac * jac.transpose();
    match gram.cholesky() {
        // det(JJᵀ) = Π Lᵢᵢ², so w = Π Lᵢᵢ.
        Some(chol) => chol.l_dirty().diagonal().iter().product(),
        None => 0.0,
    }
}

/// Compute `J⁺` under the resolution policy.
///
/// Returns `None` only when the Jacobian is singular and no damping is
/// configured (`singularity_threshold == 0`).
pub fn pseudo_inverse<const J: usize, const A: usize>(
    jac: &SMatrix<f64, A, J>,
    config: &TransformConfig,
) -> Option<PseudoInverse<J, A>> {
    let w = manipulability(jac);
    let threshold = config.singularity_threshold;
    let lambda_sq = if w >= threshold || threshold <= 0.0 {
        0.0
    } else {
        let ratio = w / threshold;
        config.damping_factor * config.damping_factor * (1.0 - ratio * ratio)
    };

    let mut gram = jac * jac.transpose();
    if lambda_sq > 0.0 {
        for i in 0..A {
            gram[(i, i)] += lambda_sq;
        }
    }
    let chol = gram.cholesky()?;
    // (JJᵀ + λ²I)⁻¹·J, transposed: the system matrix is symmetric.
    let solved = chol.solve(jac);
    let matrix = solved.transpose();
    if matrix.iter().any(|v| !v.is_finite()) {
        return None;
    }
    Some(PseudoInverse {
        matrix,
        manipulability: w,
        damped: lambda_sq > 0.0,
    })
}

/// Outcome of a forward pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForwardReport {
    pub manipulability: f64,
    /// Damped (or unavailable) pseudo-inverse used for force/impedance.
    pub singular: bool,
}

/// Joint solution produced by an inverse pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InverseSolution<const J: usize> {
    pub joints: [DoFVariables; J],
    /// Newton updates applied.
    pub iterations: u32,
    pub manipulability: f64,
    /// Damped pseudo-inverse at the solution.
    pub singular: bool,
}

/// Why an inverse pass produced no usable joint setpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InverseFailure {
    /// Residual above tolerance after `max_iterations` updates.
    NotConverged { iterations: u32, residual: f64 },
    /// Pseudo-inverse unavailable or a computed value was not finite.
    Degenerate { iterations: u32 },
}

impl InverseFailure {
    #[inline]
    pub const fn iterations(&self) -> u32 {
        match *self {
            Self::NotConverged { iterations, .. } | Self::Degenerate { iterations } => iterations,
        }
    }
}

/// Stateless joint ↔ axis engine parameterized by the step configuration.
#[derive(Debug, Clone, Copy)]
pub struct TransformEngine<const J: usize, const A: usize> {
    config: TransformConfig,
}

#[inline]
fn gather<const N: usize>(dofs: &[DoFVariables; N], field: fn(&DoFVariables) -> f64) -> SVector<f64, N> {
    SVector::<f64, N>::from_fn(|i, _| field(&dofs[i]))
}

impl<const J: usize, const A: usize> TransformEngine<J, A> {
    pub const fn new(config: TransformConfig) -> Self {
        Self { config }
    }

    #[inline]
    pub const fn config(&self) -> &TransformConfig {
        &self.config
    }

    /// Map joint measures to axis measures.
    pub fn forward<M: KinematicModel<J, A>>(
        &self,
        model: &M,
        joints: &[DoFVariables; J],
        axes: &mut [DoFVariables; A],
    ) -> ForwardReport {
        let q = gather(joints, |d| d.position);
        let qd = gather(joints, |d| d.velocity);
        let qdd = gather(joints, |d| d.acceleration);

        let jac = model.jacobian(&q);
        let x = model.forward_position(&q);
        let xd = jac * qd;
        let xdd = jac * qdd + model.velocity_product(&q, &qd);

        for i in 0..A {
            axes[i].position = x[i];
            axes[i].velocity = xd[i];
            axes[i].acceleration = xdd[i];
        }

        let Some(pinv) = pseudo_inverse(&jac, &self.config) else {
            for axis in axes.iter_mut() {
                axis.force = 0.0;
                axis.stiffness = 0.0;
                axis.damping = 0.0;
                axis.inertia = 0.0;
            }
            return ForwardReport {
                manipulability: 0.0,
                singular: true,
            };
        };

        let tau = gather(joints, |d| d.force);
        let force = pinv.matrix.transpose() * tau;
        for i in 0..A {
            axes[i].force = force[i];
            let (mut k, mut b, mut m) = (0.0, 0.0, 0.0);
            for j in 0..J {
                let p2 = pinv.matrix[(j, i)] * pinv.matrix[(j, i)];
                k += p2 * joints[j].stiffness;
                b += p2 * joints[j].damping;
                m += p2 * joints[j].inertia;
            }
            axes[i].stiffness = k;
            axes[i].damping = b;
            axes[i].inertia = m;
        }

        ForwardReport {
            manipulability: pinv.manipulability,
            singular: pinv.damped,
        }
    }

    /// Map axis setpoints to joint setpoints, seeded from `seed` positions.
    ///
    /// Performs at most `max_iterations` Newton updates; no allocation.
    pub fn inverse<M: KinematicModel<J, A>>(
        &self,
        model: &M,
        seed: &SVector<f64, J>,
        targets: &[DoFVariables; A],
    ) -> Result<InverseSolution<J>, InverseFailure> {
        let x_d = gather(targets, |d| d.position);
        let mut q = *seed;
        let mut iterations = 0u32;

        loop {
            let residual = x_d - model.forward_position(&q);
            let err = residual.amax();
            if !err.is_finite() {
                return Err(InverseFailure::Degenerate { iterations });
            }
            if err <= self.config.position_tolerance {
                break;
            }
            if iterations >= self.config.max_iterations {
                return Err(InverseFailure::NotConverged {
                    iterations,
                    residual: err,
                });
            }
            let pinv = pseudo_inverse(&model.jacobian(&q), &self.config)
                .ok_or(InverseFailure::Degenerate { iterations })?;
            q += pinv.matrix * residual;
            iterations += 1;
        }

        let jac = model.jacobian(&q);
        let pinv =
            pseudo_inverse(&jac, &self.config).ok_or(InverseFailure::Degenerate { iterations })?;

        let xd = gather(targets, |d| d.velocity);
        let xdd = gather(targets, |d| d.acceleration);
        let f = gather(targets, |d| d.force);

        let qd = pinv.matrix * xd;
        let qdd = pinv.matrix * (xdd - model.velocity_product(&q, &qd));
        let tau = jac.transpose() * f;

        let mut joints = [DoFVariables::ZERO; J];
        for (j, joint) in joints.iter_mut().enumerate() {
            joint.position = q[j];
            joint.velocity = qd[j];
            joint.acceleration = qdd[j];
            joint.force = tau[j];
            let (mut k, mut b, mut m) = (0.0, 0.0, 0.0);
            for (i, target) in targets.iter().enumerate() {
                let j2 = jac[(i, j)] * jac[(i, j)];
                k += j2 * target.stiffness;
                b += j2 * target.damping;
                m += j2 * target.inertia;
            }
            joint.stiffness = k;
            joint.damping = b;
            joint.inertia = m;
        }

        if !joints.iter().all(DoFVariables::is_finite) {
            return Err(InverseFailure::Degenerate { iterations });
        }

        Ok(InverseSolution {
            joints,
            iterations,
            manipulability: pinv.manipulability,
            singular: pinv.damped,
        })
    }
}
