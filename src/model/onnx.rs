use std::path::Path;

use ndarray::{Array2, Array4};
use ort::session::Session;

use crate::config::{Config, ModelConfig};
use crate::error::{RefrainError, Result};

use super::EmbeddingModel;

/// ONNX-backed cover embedding model.
#[derive(Debug)]
pub struct OnnxEmbedder {
    session: Session,
}

impl OnnxEmbedder {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let path = config.path.as_deref().ok_or_else(|| {
            RefrainError::Configuration(
                "model.path must point at an ONNX embedding model".to_string(),
            )
        })?;
        let path = Config::expand_path(path);
        if !path.exists() {
            return Err(RefrainError::Model(format!(
                "embedding model not found: {}",
                path.display()
            )));
        }

        let session = load_session(&path, config.gpu)?;
        tracing::info!("loaded embedding model from {}", path.display());
        Ok(Self { session })
    }
}

fn load_session(model_path: &Path, gpu: bool) -> Result<Session> {
    let mut builder = Session::builder()
        .map_err(|e| RefrainError::Model(format!("failed to create session builder: {e}")))?;

    #[cfg(feature = "cuda")]
    let mut builder = if gpu {
        use ort::ep::CUDA;
        builder
            .with_execution_providers([CUDA::default().build()])
            .map_err(|e| {
                RefrainError::Model(format!("failed to register CUDA execution provider: {e}"))
            })?
    } else {
        builder
    };

    #[cfg(feature = "rocm")]
    let mut builder = if gpu {
        use ort::ep::ROCm;
        builder
            .with_execution_providers([ROCm::default().build()])
            .map_err(|e| {
                RefrainError::Model(format!("failed to register ROCm execution provider: {e}"))
            })?
    } else {
        builder
    };

    #[cfg(not(any(feature = "cuda", feature = "rocm")))]
    let _ = gpu;

    builder
        .commit_from_file(model_path)
        .map_err(|e| RefrainError::Model(format!("failed to load embedding model: {e}")))
}

impl EmbeddingModel for OnnxEmbedder {
    /// Run the model over one batch tensor.
    ///
    /// The model must take a rank-4 input (rows, channel, features, time)
    /// and emit one embedding row per input row.
    fn embed(&mut self, batch: &Array4<f32>) -> Result<Array2<f32>> {
        let (rows, channels, num_features, frame_size) = batch.dim();
        if rows == 0 {
            return Err(RefrainError::InvalidInput(
                "cannot embed an empty batch".to_string(),
            ));
        }

        let input_rank = match self.session.inputs().first() {
            Some(input) => match input.dtype() {
                ort::value::ValueType::Tensor { shape, .. } => shape.len(),
                other => {
                    return Err(RefrainError::Model(format!(
                        "expected tensor input, got: {other:?}"
                    )));
                }
            },
            None => {
                return Err(RefrainError::Model("model has no inputs".to_string()));
            }
        };
        if input_rank != 4 {
            return Err(RefrainError::Model(format!(
                "unsupported input tensor rank {input_rank}, expected 4"
            )));
        }

        let flat: Vec<f32> = batch.iter().copied().collect();
        let input_tensor = ort::value::Tensor::from_array((
            [rows, channels, num_features, frame_size],
            flat,
        ))
        .map_err(|e| RefrainError::Model(format!("failed to create input tensor: {e}")))?;

        let outputs = self
            .session
            .run(ort::inputs![input_tensor])
            .map_err(|e| RefrainError::Model(format!("model inference failed: {e}")))?;

        let (_shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RefrainError::Model(format!("failed to extract embeddings: {e}")))?;

        if data.len() % rows != 0 {
            return Err(RefrainError::Model(format!(
                "embedding output of {} values does not divide into {rows} rows",
                data.len()
            )));
        }
        let dim = data.len() / rows;
        Array2::from_shape_vec((rows, dim), data.to_vec())
            .map_err(|e| RefrainError::Model(format!("bad embedding shape: {e}")))
    }

    fn name(&self) -> &str {
        "onnx"
    }
}
