use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::ModelError;

const DEFAULT_TAG: &str = "latest";

/// Image reference split into repository and tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    pub repository: String,
    pub tag: String,
}

impl ImageRef {
    pub fn new(repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            tag: tag.into(),
        }
    }

    /// Parse `repo[:tag]`, defaulting the tag to `latest`.
    ///
    /// A `:` followed by a `/` belongs to a registry port
    /// (`localhost:5000/img`), not to the tag.
    pub fn parse(s: &str) -> Result<Self, ModelError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ModelError::InvalidImage(s.to_string()));
        }
        if let Some((repo, tag)) = s.rsplit_once(':')
            && !tag.contains('/')
        {
            if repo.is_empty() || tag.is_empty() {
                return Err(ModelError::InvalidImage(s.to_string()));
            }
            return Ok(Self::new(repo, tag));
        }
        Ok(Self::new(s, DEFAULT_TAG))
    }

    /// `repository:tag` as understood by the runtime.
    pub fn reference(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

impl FromStr for ImageRef {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_with_tag() {
        let img = ImageRef::parse("webstrates/golem:v2").unwrap();
        assert_eq!(img.repository, "webstrates/golem");
        assert_eq!(img.tag, "v2");
        assert_eq!(img.reference(), "webstrates/golem:v2");
    }

    #[test]
    fn parse_defaults_to_latest() {
        assert_eq!(ImageRef::parse("alpine").unwrap(), ImageRef::new("alpine", "latest"));
    }

    #[test]
    fn registry_port_is_not_a_tag() {
        let img = ImageRef::parse("localhost:5000/alpine").unwrap();
        assert_eq!(img.repository, "localhost:5000/alpine");
        assert_eq!(img.tag, "latest");

        let img = ImageRef::parse("localhost:5000/alpine:3.20").unwrap();
        assert_eq!(img.repository, "localhost:5000/alpine");
        assert_eq!(img.tag, "3.20");
    }

    #[test]
    fn rejects_empty_parts() {
        assert!(ImageRef::parse("").is_err());
        assert!(ImageRef::parse("alpine:").is_err());
        assert!(ImageRef::parse(":3").is_err());
    }
}
