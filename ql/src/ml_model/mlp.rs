use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use ndarray::{Array, Array1, Array2, Axis, Dimension, Zip};
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::ml_model::model::QFunctionModel;
use crate::prelude::QlError;

const ADAM_BETA1: f32 = 0.9;
const ADAM_BETA2: f32 = 0.999;
const ADAM_EPS: f32 = 1e-8;

/// Fully connected layer; `weights` has shape `[out, in]`.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct Dense {
    weights: Array2<f32>,
    biases: Array1<f32>,
}

impl Dense {
    fn glorot_uniform(in_dim: usize, out_dim: usize, rng: &mut StdRng) -> Self {
        let limit = (6.0 / (in_dim + out_dim) as f32).sqrt();
        let dist = Uniform::new_inclusive(-limit, limit);
        Self {
            weights: Array2::from_shape_fn((out_dim, in_dim), |_| dist.sample(rng)),
            biases: Array1::zeros(out_dim),
        }
    }
}

/// First and second gradient moments of one layer.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct Moments {
    m_weights: Array2<f32>,
    v_weights: Array2<f32>,
    m_biases: Array1<f32>,
    v_biases: Array1<f32>,
}

impl Moments {
    fn zeros_like(layer: &Dense) -> Self {
        Self {
            m_weights: Array2::zeros(layer.weights.raw_dim()),
            v_weights: Array2::zeros(layer.weights.raw_dim()),
            m_biases: Array1::zeros(layer.biases.raw_dim()),
            v_biases: Array1::zeros(layer.biases.raw_dim()),
        }
    }
}

/// Dense multi-layer perceptron with ReLU hidden layers and a linear output
/// layer, trained on mean squared error with the Adam optimizer.
///
/// Weights start Glorot-uniform, biases at zero. The whole model state
/// (including optimizer moments) serializes into one checkpoint document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MlpQModel {
    layers: Vec<Dense>,
    moments: Vec<Moments>,
    learning_rate: f32,
    train_steps: u32,
}

impl MlpQModel {
    /// `layer_sizes` lists every layer width input-first, e.g. `[5, 24, 24, 2]`.
    pub fn new(layer_sizes: &[usize], learning_rate: f32, seed: u64) -> Result<Self> {
        if layer_sizes.len() < 2 || layer_sizes.contains(&0) {
            return Err(QlError(format!("invalid layer sizes {layer_sizes:?}")).into());
        }
        if !(learning_rate.is_finite() && learning_rate > 0.0) {
            return Err(QlError(format!("invalid learning rate {learning_rate}")).into());
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let layers: Vec<Dense> = layer_sizes
            .windows(2)
            .map(|w| Dense::glorot_uniform(w[0], w[1], &mut rng))
            .collect();
        let moments = layers.iter().map(Moments::zeros_like).collect();

        Ok(Self {
            layers,
            moments,
            learning_rate,
            train_steps: 0,
        })
    }

    /// Layer widths input-first, as passed to [Self::new].
    pub fn layer_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![self.layers[0].weights.ncols()];
        sizes.extend(self.layers.iter().map(|l| l.weights.nrows()));
        sizes
    }

    /// Forward pass keeping per-layer inputs and pre-activations for backprop.
    fn forward(&self, features: &Array1<f32>) -> (Vec<Array1<f32>>, Vec<Array1<f32>>) {
        let mut inputs = Vec::with_capacity(self.layers.len());
        let mut pre_activations = Vec::with_capacity(self.layers.len());

        let mut activation = features.clone();
        for (i, layer) in self.layers.iter().enumerate() {
            let z = layer.weights.dot(&activation) + &layer.biases;
            inputs.push(activation);
            activation = if i + 1 < self.layers.len() {
                z.mapv(relu)
            } else {
                z.clone()
            };
            pre_activations.push(z);
        }
        (inputs, pre_activations)
    }

    fn check_dims(&self, features: &Array1<f32>, targets: &Array1<f32>) -> Result<()> {
        let in_dim = self.layers[0].weights.ncols();
        let out_dim = self.layers[self.layers.len() - 1].weights.nrows();
        if features.len() != in_dim || targets.len() != out_dim {
            return Err(QlError(format!(
                "dimension mismatch: got features[{}]/targets[{}], model expects [{}]/[{}]",
                features.len(),
                targets.len(),
                in_dim,
                out_dim
            ))
            .into());
        }
        Ok(())
    }
}

impl QFunctionModel for MlpQModel {
    fn predict(&self, features: &Array1<f32>) -> Array1<f32> {
        let (_, pre_activations) = self.forward(features);
        pre_activations[pre_activations.len() - 1].clone()
    }

    fn fit(&mut self, features: &Array1<f32>, targets: &Array1<f32>) -> Result<f32> {
        self.check_dims(features, targets)?;

        let (inputs, pre_activations) = self.forward(features);
        let output = &pre_activations[pre_activations.len() - 1];

        let diff = output - targets;
        let n = diff.len() as f32;
        let loss = diff.mapv(|d| d * d).sum() / n;

        self.train_steps += 1;
        let t = self.train_steps as i32;
        let lr = self.learning_rate;

        let mut delta = diff * (2.0 / n);
        for i in (0..self.layers.len()).rev() {
            let grad_weights = delta
                .view()
                .insert_axis(Axis(1))
                .dot(&inputs[i].view().insert_axis(Axis(0)));
            let grad_biases = delta.clone();

            // the gradient flowing further back must see the layer's weights
            // before this step's update
            let upstream = if i > 0 {
                let mut d = self.layers[i].weights.t().dot(&delta);
                d.zip_mut_with(&pre_activations[i - 1], |d, &z| {
                    if z <= 0.0 {
                        *d = 0.0
                    }
                });
                Some(d)
            } else {
                None
            };

            let layer = &mut self.layers[i];
            let moments = &mut self.moments[i];
            adam_update(
                &mut layer.weights,
                &grad_weights,
                &mut moments.m_weights,
                &mut moments.v_weights,
                lr,
                t,
            );
            adam_update(
                &mut layer.biases,
                &grad_biases,
                &mut moments.m_biases,
                &mut moments.v_biases,
                lr,
                t,
            );

            if let Some(d) = upstream {
                delta = d;
            }
        }
        Ok(loss)
    }

    fn write_checkpoint(&self, file: &Path) -> Result<()> {
        let document = serde_json::to_string(self)?;
        fs::write(file, document).with_context(|| format!("writing checkpoint {}", file.display()))?;
        Ok(())
    }

    fn read_checkpoint(&mut self, file: &Path) -> Result<()> {
        let document =
            fs::read_to_string(file).with_context(|| format!("reading checkpoint {}", file.display()))?;
        let loaded: MlpQModel = serde_json::from_str(&document)
            .with_context(|| format!("decoding checkpoint {}", file.display()))?;
        if loaded.layer_sizes() != self.layer_sizes() {
            return Err(QlError(format!(
                "checkpoint topology {:?} does not match model topology {:?}",
                loaded.layer_sizes(),
                self.layer_sizes()
            ))
            .into());
        }
        *self = loaded;
        Ok(())
    }
}

fn relu(x: f32) -> f32 {
    f32::max(x, 0.0)
}

fn adam_update<D: Dimension>(
    param: &mut Array<f32, D>,
    grad: &Array<f32, D>,
    m: &mut Array<f32, D>,
    v: &mut Array<f32, D>,
    lr: f32,
    t: i32,
) {
    let m_correction = 1.0 - ADAM_BETA1.powi(t);
    let v_correction = 1.0 - ADAM_BETA2.powi(t);

    Zip::from(param)
        .and(grad)
        .and(m)
        .and(v)
        .for_each(|p, &g, m, v| {
            *m = ADAM_BETA1 * *m + (1.0 - ADAM_BETA1) * g;
            *v = ADAM_BETA2 * *v + (1.0 - ADAM_BETA2) * g * g;
            let m_hat = *m / m_correction;
            let v_hat = *v / v_correction;
            *p -= lr * m_hat / (v_hat.sqrt() + ADAM_EPS);
        });
}

#[cfg(test)]
mod tests {
    use ndarray::arr1;

    use super::*;

    #[test]
    fn predict_returns_one_value_per_output() {
        let model = MlpQModel::new(&[5, 24, 24, 2], 0.001, 42).unwrap();
        let q_values = model.predict(&arr1(&[0.5, 0.0, 0.75, 0.2, 0.45]));
        assert_eq!(q_values.len(), 2);
        assert!(q_values.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn fit_moves_prediction_toward_target() {
        let mut model = MlpQModel::new(&[2, 8, 8, 2], 0.01, 7).unwrap();
        let features = arr1(&[0.5, -0.3]);
        let targets = arr1(&[1.0, -1.0]);

        let initial_loss = model.fit(&features, &targets).unwrap();
        let mut loss = initial_loss;
        for _ in 0..500 {
            loss = model.fit(&features, &targets).unwrap();
        }

        assert!(loss < initial_loss);
        assert!(loss < 1e-2, "loss {loss} did not converge");
    }

    #[test]
    fn checkpoint_round_trip_restores_predictions() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("mlp_ckpt.json");
        let features = arr1(&[0.1, 0.9, -0.4]);

        let mut trained = MlpQModel::new(&[3, 8, 2], 0.01, 11).unwrap();
        for _ in 0..10 {
            trained.fit(&features, &arr1(&[0.5, -0.5])).unwrap();
        }
        trained.write_checkpoint(&file).unwrap();

        let mut fresh = MlpQModel::new(&[3, 8, 2], 0.01, 999).unwrap();
        fresh.read_checkpoint(&file).unwrap();

        assert_eq!(trained.predict(&features), fresh.predict(&features));
    }

    #[test]
    fn checkpoint_rejects_other_topology() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("mlp_ckpt.json");

        let model = MlpQModel::new(&[3, 8, 2], 0.01, 1).unwrap();
        model.write_checkpoint(&file).unwrap();

        let mut other = MlpQModel::new(&[5, 8, 2], 0.01, 1).unwrap();
        assert!(other.read_checkpoint(&file).is_err());
    }

    #[test]
    fn rejects_invalid_construction() {
        assert!(MlpQModel::new(&[5], 0.001, 0).is_err());
        assert!(MlpQModel::new(&[5, 0, 2], 0.001, 0).is_err());
        assert!(MlpQModel::new(&[5, 24, 2], 0.0, 0).is_err());
        assert!(MlpQModel::new(&[5, 24, 2], f32::NAN, 0).is_err());
    }
}
