//! Activation rules for NEAT nodes.
//!
//! Hidden and output nodes squash their accumulated input through one of these
//! functions. Input and bias nodes never apply an activation. The rule is part
//! of the genome, so it travels with saved genomes and a reloaded network
//! behaves exactly like the one that was written.

use serde::{Deserialize, Serialize};

/// Slope used by [`Activation::SteepenedSigmoid`].
pub const STEEPENED_SLOPE: f64 = 4.9;

/// Activation function applied by every non-input node of a genome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Activation {
    /// Logistic sigmoid: f(x) = 1 / (1 + e^(-x))
    Sigmoid,
    /// Steepened sigmoid: f(x) = 1 / (1 + e^(-4.9x)), the classic NEAT choice.
    #[default]
    SteepenedSigmoid,
    /// Hyperbolic tangent: f(x) = tanh(x)
    Tanh,
    /// Rectified Linear Unit: f(x) = max(0, x)
    ReLU,
}

impl Activation {
    /// All available activation rules.
    pub const ALL: [Self; 4] = [Self::Sigmoid, Self::SteepenedSigmoid, Self::Tanh, Self::ReLU];

    /// Apply this activation function to an input value.
    ///
    /// NaN propagates unchanged. Infinite inputs saturate where the function
    /// has a finite limit.
    #[inline]
    #[must_use]
    pub fn apply(self, x: f64) -> f64 {
        if x.is_nan() {
            return f64::NAN;
        }

        match self {
            Self::Sigmoid => sigmoid(x, 1.0),
            Self::SteepenedSigmoid => sigmoid(x, STEEPENED_SLOPE),
            Self::Tanh => x.tanh(),
            Self::ReLU => {
                if x == f64::NEG_INFINITY {
                    return 0.0;
                }
                x.max(0.0)
            }
        }
    }

    /// Range of values this activation can produce, used by viewers to scale outputs.
    #[must_use]
    pub const fn output_range(self) -> (f64, f64) {
        match self {
            Self::Sigmoid | Self::SteepenedSigmoid => (0.0, 1.0),
            Self::Tanh => (-1.0, 1.0),
            Self::ReLU => (0.0, f64::INFINITY),
        }
    }
}

#[inline]
fn sigmoid(x: f64, slope: f64) -> f64 {
    // exp overflows past ~709; the sigmoid is already saturated long before that
    let z = (slope * x).clamp(-700.0, 700.0);
    1.0 / (1.0 + (-z).exp())
}
