//! Text tokenizer used by the caption decoder

use std::path::Path;
use tap_types::{Result, SpecialTokens, TapError};
use tokenizers::Tokenizer as HfTokenizer;
use tracing::debug;

/// Text tokenizer. Without a tokenizer file only the vocabulary size is
/// known, which is all the decoder factory needs.
#[derive(Clone)]
pub struct TextTokenizer {
    tokenizer: Option<HfTokenizer>,
    n_words: usize,
    special_tokens: SpecialTokens,
}

impl std::fmt::Debug for TextTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextTokenizer")
            .field("loaded", &self.tokenizer.is_some())
            .field("n_words", &self.n_words)
            .finish()
    }
}

impl TextTokenizer {
    /// Vocabulary size of the default caption vocabulary
    pub const DEFAULT_N_WORDS: usize = 32000;

    pub fn new() -> Self {
        Self {
            tokenizer: None,
            n_words: Self::DEFAULT_N_WORDS,
            special_tokens: SpecialTokens::default(),
        }
    }

    /// Load a HuggingFace `tokenizer.json`
    pub fn from_file<P: AsRef<Path>>(path: P, special_tokens: SpecialTokens) -> Result<Self> {
        let path = path.as_ref();
        let tokenizer = HfTokenizer::from_file(path).map_err(|e| {
            TapError::tokenizer(format!("Failed to load tokenizer {}: {}", path.display(), e))
        })?;
        let n_words = tokenizer.get_vocab_size(true);
        debug!("Loaded tokenizer {} with {} words", path.display(), n_words);
        Ok(Self {
            tokenizer: Some(tokenizer),
            n_words,
            special_tokens,
        })
    }

    /// Vocabulary size, including added tokens
    pub fn n_words(&self) -> usize {
        self.n_words
    }

    pub fn is_loaded(&self) -> bool {
        self.tokenizer.is_some()
    }

    pub fn special_tokens(&self) -> &SpecialTokens {
        &self.special_tokens
    }

    pub fn encode(&self, text: &str, add_special_tokens: bool) -> Result<Vec<u32>> {
        let encoding = self
            .inner()?
            .encode(text, add_special_tokens)
            .map_err(|e| TapError::tokenizer(format!("Encode failed: {}", e)))?;
        Ok(encoding.get_ids().to_vec())
    }

    pub fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String> {
        self.inner()?
            .decode(ids, skip_special_tokens)
            .map_err(|e| TapError::tokenizer(format!("Decode failed: {}", e)))
    }

    /// Id of a special token looked up by catalog key (e.g. `"image"`)
    pub fn special_token_id(&self, key: &str) -> Option<u32> {
        let literal = self.special_tokens.get(key)?;
        self.tokenizer.as_ref()?.token_to_id(literal)
    }

    fn inner(&self) -> Result<&HfTokenizer> {
        self.tokenizer
            .as_ref()
            .ok_or_else(|| TapError::tokenizer("No tokenizer file loaded"))
    }
}

impl Default for TextTokenizer {
    fn default() -> Self {
        Self::new()
    }
}
