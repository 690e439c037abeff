//! Neural Network inference.
//!
//! A thin wrapper around [`tract_onnx`] that loads an ONNX model from disk, optimizes it once,
//! and runs it on flat `f32` tensors.

use std::{path::Path, sync::Arc};

use anyhow::{bail, Context};
use tract_onnx::prelude::{
    Framework, Graph, InferenceModelExt, SimplePlan, TValue, TVec, TypedFact, TypedOp,
};

type Model = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// A dense `f32` tensor in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl Tensor {
    /// Creates a tensor of the given shape, computing each element from its index.
    pub fn from_array_shape_fn<const N: usize, F>(shape: [usize; N], mut f: F) -> Self
    where
        F: FnMut([usize; N]) -> f32,
    {
        let len = shape.iter().product();
        let mut data = Vec::with_capacity(len);
        let mut index = [0; N];
        for _ in 0..len {
            data.push(f(index));
            // Increment the multi-dimensional index, last axis fastest.
            for axis in (0..N).rev() {
                index[axis] += 1;
                if index[axis] < shape[axis] {
                    break;
                }
                index[axis] = 0;
            }
        }

        Self {
            shape: shape.to_vec(),
            data,
        }
    }

    pub fn from_vec(shape: &[usize], data: Vec<f32>) -> anyhow::Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            bail!(
                "tensor of shape {:?} needs {} elements, got {}",
                shape,
                expected,
                data.len()
            );
        }
        Ok(Self {
            shape: shape.to_vec(),
            data,
        })
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Returns the only element of a tensor that contains exactly one element.
    pub fn as_singular(&self) -> Option<f32> {
        match &*self.data {
            [value] => Some(*value),
            _ => None,
        }
    }

    fn to_tract(&self) -> anyhow::Result<tract_onnx::prelude::Tensor> {
        Ok(tract_onnx::prelude::Tensor::from_shape(
            &self.shape,
            &self.data,
        )?)
    }

    fn from_tract(tract: &tract_onnx::prelude::Tensor) -> anyhow::Result<Self> {
        let data = tract.as_slice::<f32>()?.to_vec();
        Self::from_vec(tract.shape(), data)
    }
}

/// A neural network that can be used for inference.
///
/// This is a cheaply [`Clone`]able handle to the underlying network structures.
#[derive(Clone)]
pub struct NeuralNetwork(Arc<Model>);

impl NeuralNetwork {
    /// Loads and optimizes a pre-trained model from an ONNX file path.
    ///
    /// The path must have a `.onnx` extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        Self::from_path_impl(path.as_ref())
    }

    fn from_path_impl(path: &Path) -> anyhow::Result<Self> {
        match path.extension() {
            Some(ext) if ext == "onnx" => {}
            _ => bail!(
                "neural network file '{}' must have `.onnx` extension",
                path.display()
            ),
        }

        let model_data =
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let graph = tract_onnx::onnx()
            .model_for_read(&mut &*model_data)?
            .into_optimized()
            .with_context(|| format!("failed to optimize {}", path.display()))?;
        let outputs = graph.output_outlets()?.to_vec();
        let model = SimplePlan::new_for_outputs(graph, &outputs)?;

        log::debug!("loaded neural network from {}", path.display());
        Ok(Self(Arc::new(model)))
    }

    /// Returns the number of input nodes of the network.
    pub fn num_inputs(&self) -> usize {
        self.0.model().inputs.len()
    }

    /// Returns the concrete shape of input `index`, if the network declares one.
    pub fn input_shape(&self, index: usize) -> Option<Vec<usize>> {
        let fact = self.0.model().input_fact(index).ok()?;
        fact.shape.as_concrete().map(|shape| shape.to_vec())
    }

    /// Runs the network on its single input, returning all output tensors.
    #[doc(alias = "infer")]
    pub fn estimate(&self, input: &Tensor) -> anyhow::Result<Vec<Tensor>> {
        let inputs: TVec<TValue> = [TValue::from_const(Arc::new(input.to_tract()?))]
            .into_iter()
            .collect();
        let outputs = self.0.run(inputs)?;
        outputs.iter().map(|value| Tensor::from_tract(value)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_fn_is_row_major() {
        let t = Tensor::from_array_shape_fn([2, 3], |[y, x]| (y * 10 + x) as f32);
        assert_eq!(t.shape(), &[2, 3]);
        assert_eq!(t.as_slice(), &[0.0, 1.0, 2.0, 10.0, 11.0, 12.0]);
    }

    #[test]
    fn from_vec_checks_length() {
        assert!(Tensor::from_vec(&[1, 2], vec![1.0]).is_err());
        let t = Tensor::from_vec(&[1, 1], vec![0.25]).unwrap();
        assert_eq!(t.as_singular(), Some(0.25));
        assert_eq!(Tensor::from_vec(&[2], vec![1.0, 2.0]).unwrap().as_singular(), None);
    }

    #[test]
    fn rejects_non_onnx_path() {
        assert!(NeuralNetwork::from_path("model.tflite").is_err());
    }
}
