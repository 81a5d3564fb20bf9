use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor, D};
use candle_nn::VarBuilder;
use candle_transformers::models::t5::{Config, T5ForConditionalGeneration};
use condense_common::{CondenseError, EngineOperation, GenerationParameters, Result};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::beam::beam_search;
use crate::engine::{GenerationEngine, TokenSequence};

/// Model config file inside the model directory
pub const CONFIG_FILE: &str = "config.json";

/// Tokenizer file inside the model directory
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// Weights file inside the model directory
pub const WEIGHTS_FILE: &str = "model.safetensors";

/// Compute backend used for candle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeBackend {
    /// NVIDIA GPU via CUDA
    Cuda,
    /// Apple GPU via Metal
    Metal,
    /// CPU execution
    Cpu,
}

fn detect_backend() -> ComputeBackend {
    if cfg!(feature = "cuda") {
        ComputeBackend::Cuda
    } else if cfg!(feature = "metal") {
        ComputeBackend::Metal
    } else {
        ComputeBackend::Cpu
    }
}

fn load_error<E: Into<anyhow::Error>>(e: E) -> CondenseError {
    CondenseError::engine(EngineOperation::Load, e)
}

fn generate_error(e: candle_core::Error) -> CondenseError {
    CondenseError::engine(EngineOperation::Generate, e)
}

/// T5-family seq2seq engine running locally on candle
///
/// The model directory must hold `config.json`, `tokenizer.json` and
/// `model.safetensors`. Load once per process and share through an `Arc`.
pub struct T5Engine {
    model: Arc<Mutex<T5ForConditionalGeneration>>,
    tokenizer: Tokenizer,
    device: Device,
    start_token: u32,
    eos_token: u32,
    name: String,
    backend: ComputeBackend,
}

impl T5Engine {
    /// Load model, config and tokenizer from a local directory
    pub fn load(model_dir: impl AsRef<Path>) -> Result<Self> {
        let model_dir = model_dir.as_ref();
        let backend = detect_backend();

        info!(
            "Initializing T5 engine - Model: {}, Backend: {:?}",
            model_dir.display(),
            backend
        );

        let device = match backend {
            ComputeBackend::Cuda => Device::new_cuda(0),
            ComputeBackend::Metal => Device::new_metal(0),
            ComputeBackend::Cpu => Ok(Device::Cpu),
        }
        .map_err(load_error)?;

        let config_path = model_dir.join(CONFIG_FILE);
        let raw = std::fs::read_to_string(&config_path).map_err(|e| {
            load_error(anyhow::anyhow!("Failed to read {}: {}", config_path.display(), e))
        })?;
        let mut config: Config = serde_json::from_str(&raw).map_err(|e| {
            load_error(anyhow::anyhow!("Invalid model config {}: {}", config_path.display(), e))
        })?;
        // Beams are re-decoded from scratch each step
        config.use_cache = false;

        let tokenizer = load_tokenizer(&model_dir.join(TOKENIZER_FILE))?;

        let weights_path = model_dir.join(WEIGHTS_FILE);
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[&weights_path], DType::F32, &device) }
            .map_err(load_error)?;
        let model = T5ForConditionalGeneration::load(vb, &config).map_err(load_error)?;

        let name = model_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "t5".to_string());

        info!(
            "T5 engine loaded - Name: {}, Layers: {}, Vocab: {}",
            name, config.num_layers, config.vocab_size
        );

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            tokenizer,
            device,
            // T5 starts decoding from the pad token
            start_token: config.pad_token_id as u32,
            eos_token: config.eos_token_id as u32,
            name,
            backend,
        })
    }

    /// Backend the engine runs on
    pub fn backend(&self) -> ComputeBackend {
        self.backend
    }
}

/// Load the tokenizer with its own truncation switched off
///
/// Truncation happens only in `encode`, so it is always reported.
fn load_tokenizer(path: &Path) -> Result<Tokenizer> {
    let mut tokenizer = Tokenizer::from_file(path).map_err(|e| {
        load_error(anyhow::anyhow!("Failed to load tokenizer {}: {}", path.display(), e))
    })?;
    tokenizer.with_truncation(None).map_err(|e| {
        load_error(anyhow::anyhow!(
            "Failed to disable truncation for {}: {}",
            path.display(),
            e
        ))
    })?;
    Ok(tokenizer)
}

/// Cap input ids at `max_length`, keeping the closing EOS like tokenizer-side truncation
fn truncate_input(mut ids: Vec<u32>, max_length: usize, eos_token: u32) -> TokenSequence {
    let truncated = ids.len() > max_length;
    if truncated {
        ids.truncate(max_length.saturating_sub(1));
        ids.push(eos_token);
    }
    TokenSequence { ids, truncated }
}

/// Encode once, then beam search over the decoder
fn run_generation(
    model: &mut T5ForConditionalGeneration,
    device: &Device,
    input_ids: &[u32],
    params: &GenerationParameters,
    start_token: u32,
    eos_token: u32,
) -> Result<Vec<u32>> {
    model.clear_kv_cache();

    let input = Tensor::new(input_ids, device)
        .and_then(|t| t.unsqueeze(0))
        .map_err(generate_error)?;
    let encoder_output = model.encode(&input).map_err(generate_error)?;

    // Encoder output repeated once per running beam
    let mut expanded: Option<(usize, Tensor)> = None;

    beam_search(params, start_token, eos_token, |sequences: &[Vec<u32>]| {
        let beams = sequences.len();
        let len = sequences.first().map(|s| s.len()).unwrap_or(0);
        let flat: Vec<u32> = sequences.iter().flatten().copied().collect();
        let decoder_ids = Tensor::from_vec(flat, (beams, len), device).map_err(generate_error)?;

        let cached = match &expanded {
            Some((n, states)) if *n == beams => Some(states.clone()),
            _ => None,
        };
        let encoder_states = match cached {
            Some(states) => states,
            None if beams == 1 => encoder_output.clone(),
            None => {
                let copies = vec![&encoder_output; beams];
                let states = Tensor::cat(&copies, 0).map_err(generate_error)?;
                expanded = Some((beams, states.clone()));
                states
            }
        };

        let logits = model
            .decode(&decoder_ids, &encoder_states)
            .map_err(generate_error)?;
        candle_nn::ops::log_softmax(&logits, D::Minus1)
            .and_then(|t| t.to_vec2::<f32>())
            .map_err(generate_error)
    })
}

#[async_trait]
impl GenerationEngine for T5Engine {
    async fn encode(&self, text: &str, max_length: usize) -> Result<TokenSequence> {
        let encoding = self.tokenizer.encode(text, true).map_err(|e| {
            CondenseError::engine(
                EngineOperation::Encode,
                anyhow::anyhow!("Tokenizer encode failed: {}", e),
            )
        })?;

        Ok(truncate_input(
            encoding.get_ids().to_vec(),
            max_length,
            self.eos_token,
        ))
    }

    async fn generate(
        &self,
        input: &TokenSequence,
        params: &GenerationParameters,
    ) -> Result<TokenSequence> {
        debug!(
            "Generating - Input tokens: {}, Beams: {}, Length: {}..{}",
            input.len(),
            params.num_beams,
            params.min_length,
            params.max_length
        );

        let model = Arc::clone(&self.model);
        let device = self.device.clone();
        let input_ids = input.ids.clone();
        let params = params.clone();
        let (start_token, eos_token) = (self.start_token, self.eos_token);

        let ids = tokio::task::spawn_blocking(move || {
            let mut model = model.lock().map_err(|_| {
                CondenseError::engine(
                    EngineOperation::Generate,
                    anyhow::anyhow!("model lock poisoned"),
                )
            })?;
            run_generation(&mut model, &device, &input_ids, &params, start_token, eos_token)
        })
        .await
        .map_err(|e| CondenseError::engine(EngineOperation::Generate, e))??;

        debug!("Generated {} tokens", ids.len());
        Ok(TokenSequence::new(ids))
    }

    async fn decode(&self, tokens: &TokenSequence) -> Result<String> {
        self.tokenizer.decode(&tokens.ids, true).map_err(|e| {
            CondenseError::engine(
                EngineOperation::Decode,
                anyhow::anyhow!("Tokenizer decode failed: {}", e),
            )
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_backend_defaults_to_cpu() {
        if !cfg!(feature = "cuda") && !cfg!(feature = "metal") {
            assert_eq!(detect_backend(), ComputeBackend::Cpu);
        }
    }

    #[test]
    fn test_load_missing_model_dir_is_load_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = T5Engine::load(tmp.path().join("missing")).err().unwrap();
        assert!(matches!(
            err,
            CondenseError::Engine {
                operation: EngineOperation::Load,
                ..
            }
        ));
    }

    #[test]
    fn test_load_rejects_malformed_config() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE), "{ not json").unwrap();

        let err = T5Engine::load(tmp.path()).err().unwrap();
        assert!(err.to_string().contains("Invalid model config"), "{}", err);
    }

    const EOS: u32 = 1;

    #[test]
    fn test_truncate_input_under_limit_is_unchanged() {
        let input = truncate_input(vec![10, 11, 12, EOS], 8, EOS);
        assert_eq!(input.ids, vec![10, 11, 12, EOS]);
        assert!(!input.truncated);
    }

    #[test]
    fn test_truncate_input_at_limit_is_unchanged() {
        let input = truncate_input(vec![10, 11, 12, EOS], 4, EOS);
        assert_eq!(input.ids, vec![10, 11, 12, EOS]);
        assert!(!input.truncated);
    }

    #[test]
    fn test_truncate_input_over_limit_keeps_eos() {
        let ids: Vec<u32> = (10..30).chain(std::iter::once(EOS)).collect();
        let input = truncate_input(ids, 8, EOS);

        assert!(input.truncated);
        assert_eq!(input.len(), 8);
        assert_eq!(input.ids[..7], [10, 11, 12, 13, 14, 15, 16]);
        assert_eq!(input.ids.last(), Some(&EOS));
    }

    #[test]
    fn test_truncate_input_to_single_token() {
        let input = truncate_input(vec![10, 11, EOS], 1, EOS);
        assert_eq!(input.ids, vec![EOS]);
        assert!(input.truncated);
    }

    #[test]
    fn test_load_tokenizer_ignores_file_truncation() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(TOKENIZER_FILE);
        // Word-level tokenizer that would cut everything to two tokens
        std::fs::write(
            &path,
            r#"{
                "version": "1.0",
                "truncation": {"direction": "Right", "max_length": 2, "strategy": "LongestFirst", "stride": 0},
                "padding": null,
                "added_tokens": [],
                "normalizer": null,
                "pre_tokenizer": {"type": "Whitespace"},
                "post_processor": null,
                "decoder": null,
                "model": {"type": "WordLevel", "vocab": {"[UNK]": 0, "alpha": 1, "beta": 2}, "unk_token": "[UNK]"}
            }"#,
        )
        .unwrap();

        let tokenizer = load_tokenizer(&path).unwrap();
        assert!(tokenizer.get_truncation().is_none());

        let encoding = tokenizer.encode("alpha beta alpha beta alpha", true).unwrap();
        assert_eq!(encoding.get_ids(), &[1, 2, 1, 2, 1]);
    }

    #[test]
    fn test_load_tokenizer_missing_file_is_load_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = load_tokenizer(&tmp.path().join(TOKENIZER_FILE)).unwrap_err();
        assert!(matches!(
            err,
            CondenseError::Engine {
                operation: EngineOperation::Load,
                ..
            }
        ));
    }
}
