use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One file to materialise in a run's host directory before start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StagedInput {
    /// Literal bytes written verbatim.
    Content(Vec<u8>),
    /// Absolute http(s) URL whose body becomes the file.
    Fetch(String),
}

impl StagedInput {
    /// Classify raw bytes: an absolute `http://` or `https://` URL becomes a
    /// fetch, anything else is literal content.
    pub fn classify(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        match std::str::from_utf8(&bytes) {
            Ok(s) if looks_like_url(s) => StagedInput::Fetch(s.trim().to_string()),
            _ => StagedInput::Content(bytes),
        }
    }

    pub fn is_fetch(&self) -> bool {
        matches!(self, StagedInput::Fetch(_))
    }
}

fn looks_like_url(s: &str) -> bool {
    let s = s.trim();
    let rest = s
        .strip_prefix("http://")
        .or_else(|| s.strip_prefix("https://"));
    match rest {
        Some(rest) => !rest.is_empty() && !s.contains(char::is_whitespace),
        None => false,
    }
}

/// Destination filename -> staged input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputSet(pub BTreeMap<String, StagedInput>);

impl InputSet {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Build from a raw filename -> bytes map, classifying each value.
    pub fn from_raw<I, K, V>(raw: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Vec<u8>>,
    {
        Self(
            raw.into_iter()
                .map(|(k, v)| (k.into(), StagedInput::classify(v)))
                .collect(),
        )
    }

    pub fn insert(&mut self, name: impl Into<String>, input: StagedInput) {
        self.0.insert(name.into(), input);
    }

    pub fn content(mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(name, StagedInput::Content(bytes.into()));
        self
    }

    pub fn fetch(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.insert(name, StagedInput::Fetch(url.into()));
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &StagedInput)> {
        self.0.iter()
    }
}
