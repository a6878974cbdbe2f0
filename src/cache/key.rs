//! Cache key generation.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

pub const DEFAULT_MODEL: &str = "default";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub hash: String,
    pub model: Option<String>,
}

impl CacheKey {
    pub fn new(hash: impl Into<String>) -> Self {
        Self { hash: hash.into(), model: None }
    }
    pub fn with_model(mut self, model: impl Into<String>) -> Self { self.model = Some(model.into()); self }
    pub fn as_str(&self) -> &str { &self.hash }

    /// Short prefix of the hash, for log lines.
    pub fn short(&self) -> &str { short_hash(&self.hash) }
}

/// First eight characters of a key, cut on a char boundary.
pub(crate) fn short_hash(hash: &str) -> &str {
    let end = hash.char_indices().nth(8).map(|(i, _)| i).unwrap_or(hash.len());
    &hash[..end]
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.hash) }
}

impl From<&str> for CacheKey { fn from(s: &str) -> Self { Self::new(s) } }
impl From<String> for CacheKey { fn from(s: String) -> Self { Self::new(s) } }

/// What a reply is looked up by: the user message plus the generation
/// parameters that would change the reply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyInput<'a> {
    pub prompt: &'a str,
    pub model: Option<&'a str>,
    pub temperature: Option<f64>,
}

impl<'a> KeyInput<'a> {
    pub fn new(prompt: &'a str) -> Self { Self { prompt, model: None, temperature: None } }
    pub fn with_model(mut self, model: &'a str) -> Self { self.model = Some(model); self }
    pub fn with_temperature(mut self, temperature: f64) -> Self { self.temperature = Some(temperature); self }
}

impl<'a> From<&'a str> for KeyInput<'a> { fn from(prompt: &'a str) -> Self { Self::new(prompt) } }
impl<'a> From<&'a String> for KeyInput<'a> { fn from(prompt: &'a String) -> Self { Self::new(prompt) } }

/// Prompts are compared case-insensitively and without surrounding whitespace.
pub fn normalize_prompt(prompt: &str) -> String {
    prompt.trim().to_lowercase()
}

#[derive(Debug, Clone)]
pub struct CacheKeyGenerator {
    default_model: String,
    default_temperature: f64,
    salt: Option<String>,
}

impl CacheKeyGenerator {
    pub fn new() -> Self {
        Self { default_model: DEFAULT_MODEL.into(), default_temperature: DEFAULT_TEMPERATURE, salt: None }
    }
    pub fn with_salt(mut self, salt: impl Into<String>) -> Self { self.salt = Some(salt.into()); self }
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self { self.default_model = model.into(); self }
    pub fn with_default_temperature(mut self, t: f64) -> Self { self.default_temperature = t; self }

    pub fn generate(&self, prompt: &str, model: Option<&str>, temperature: Option<f64>) -> CacheKey {
        let model = model.unwrap_or(&self.default_model);
        let temperature = temperature.unwrap_or(self.default_temperature);
        let mut parts: BTreeMap<&str, String> = BTreeMap::new();
        parts.insert("messages", normalize_prompt(prompt));
        parts.insert("model", model.to_string());
        parts.insert("temperature", format!("{:.2}", temperature));
        if let Some(ref s) = self.salt { parts.insert("salt", s.clone()); }
        // BTreeMap<&str, String> always serializes
        let canonical = serde_json::to_string(&parts).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        CacheKey::new(format!("{:x}", hasher.finalize())).with_model(model)
    }

    /// Model `input` is keyed under once defaults are applied.
    pub fn model_for<'a>(&'a self, input: &KeyInput<'a>) -> &'a str {
        input.model.unwrap_or(&self.default_model)
    }

    pub fn temperature_for(&self, input: &KeyInput<'_>) -> f64 {
        input.temperature.unwrap_or(self.default_temperature)
    }

    pub fn generate_for(&self, input: KeyInput<'_>) -> CacheKey {
        self.generate(input.prompt, input.model, input.temperature)
    }
}

impl Default for CacheKeyGenerator { fn default() -> Self { Self::new() } }
