use std::path::Path;

use anyhow::Result;
use ndarray::Array1;

/// Generic capability to produce a flat feature vector out of a state object.
///
/// This is the only bridge between an environment's state representation and
/// the numeric input a Q-function approximator consumes.
pub trait ToFeatures {
    /// Produces the state's feature vector. Every call for the same state
    /// returns the same values; all components are finite.
    fn to_features(&self) -> Array1<f32>;
}

/// Narrow capability interface of a Q-function approximator.
///
/// The learning core depends only on this interface, never on the
/// approximator's internals, so any differentiable model can stand behind it.
pub trait QFunctionModel {
    /// Q-value estimate per action for the given feature vector.
    /// The returned array has one entry per action, indexed by
    /// [crate::prelude::Action::numeric].
    fn predict(&self, features: &Array1<f32>) -> Array1<f32>;

    /// Performs a single training step moving the prediction for `features`
    /// toward `targets`.
    ///
    /// # Returns
    ///   calculated loss
    ///
    fn fit(&mut self, features: &Array1<f32>, targets: &Array1<f32>) -> Result<f32>;

    fn write_checkpoint(&self, file: &Path) -> Result<()>;

    /// Restores previously persisted parameters into this model.
    /// Fails if the checkpoint was written by a model of another topology.
    fn read_checkpoint(&mut self, file: &Path) -> Result<()>;
}
