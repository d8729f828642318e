//! Plain feed-forward stack
//!
//! `Linear → ReLU → … → Linear`: ReLU after every layer except the last.
//! Used for the striatal value function (ending in a scalar) and for the
//! motor cortex (ending in the action dimension).

use candle_core::Tensor;
use candle_nn::{Linear, Module, VarBuilder};

use crate::error::CpgError;
use crate::CpgResult;

#[derive(Debug, Clone)]
pub struct Mlp {
    layers: Vec<Linear>,
    in_dim: usize,
    out_dim: usize,
}

impl Mlp {
    /// Layers are registered as `layer_0`, `layer_1`, … under `vb`
    pub fn new(in_dim: usize, widths: &[usize], vb: VarBuilder) -> CpgResult<Self> {
        let out_dim = *widths
            .last()
            .ok_or_else(|| CpgError::config("mlp needs at least one layer"))?;
        let mut layers = Vec::with_capacity(widths.len());
        let mut input = in_dim;
        for (i, &units) in widths.iter().enumerate() {
            layers.push(candle_nn::linear(input, units, vb.pp(format!("layer_{}", i)))?);
            input = units;
        }
        Ok(Self {
            layers,
            in_dim,
            out_dim,
        })
    }

    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    pub fn forward(&self, x: &Tensor) -> CpgResult<Tensor> {
        let last = self.layers.len() - 1;
        let mut h = x.clone();
        for (i, layer) in self.layers.iter().enumerate() {
            h = layer.forward(&h)?;
            if i < last {
                h = h.relu()?;
            }
        }
        Ok(h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn test_output_shape_and_names() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let mlp = Mlp::new(6, &[5, 3, 1], vb.pp("vf")).unwrap();
        assert_eq!(mlp.out_dim(), 1);

        let x = Tensor::randn(0f32, 1.0, (4, 6), &device).unwrap();
        let y = mlp.forward(&x).unwrap();
        assert_eq!(y.dims(), &[4, 1]);

        let names: Vec<String> = varmap.data().lock().unwrap().keys().cloned().collect();
        assert!(names.contains(&"vf.layer_2.weight".to_string()));
        assert_eq!(names.len(), 6);
    }

    #[test]
    fn test_last_layer_not_rectified() {
        let device = Device::Cpu;
        let mut varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let mlp = Mlp::new(3, &[2, 1], vb).unwrap();
        varmap
            .set_one("layer_0.weight", Tensor::new(&[[1f32, 0.0, 0.0], [0.0, 1.0, 0.0]], &device).unwrap())
            .unwrap();
        varmap
            .set_one("layer_0.bias", Tensor::zeros(2, DType::F32, &device).unwrap())
            .unwrap();
        varmap
            .set_one("layer_1.weight", Tensor::new(&[[-1f32, -1.0]], &device).unwrap())
            .unwrap();
        varmap
            .set_one("layer_1.bias", Tensor::zeros(1, DType::F32, &device).unwrap())
            .unwrap();

        // hidden ReLU clips −2, the output layer keeps its sign
        let x = Tensor::new(&[[1f32, -2.0, 5.0]], &device).unwrap();
        let y: Vec<f32> = mlp.forward(&x).unwrap().flatten_all().unwrap().to_vec1().unwrap();
        assert_eq!(y, vec![-1.0]);
    }

    #[test]
    fn test_empty_widths_rejected() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        assert!(Mlp::new(3, &[], vb).is_err());
    }
}
