use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// Store-assigned connection record identifier (opaque)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn new(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Display for InstanceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for InstanceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for InstanceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

pub const INSTANCE_NAME_MIN_LEN: usize = 3;
pub const INSTANCE_NAME_MAX_LEN: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstanceNameError {
    #[error("instance name must be at least {INSTANCE_NAME_MIN_LEN} characters")]
    TooShort,

    #[error("instance name must be at most {INSTANCE_NAME_MAX_LEN} characters")]
    TooLong,

    #[error("instance name may only contain letters, digits, '_' and '-' (got {0:?})")]
    InvalidCharacter(char),
}

/// Human-chosen channel label, doubling as the provider-side instance
/// identifier. Construction validates the provider's naming rules, so a
/// held `InstanceName` is always safe to embed in a request path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstanceName(String);

impl InstanceName {
    pub fn parse(raw: &str) -> Result<Self, InstanceNameError> {
        let trimmed = raw.trim();
        if trimmed.len() < INSTANCE_NAME_MIN_LEN {
            return Err(InstanceNameError::TooShort);
        }
        if trimmed.len() > INSTANCE_NAME_MAX_LEN {
            return Err(InstanceNameError::TooLong);
        }
        if let Some(bad) = trimmed
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
        {
            return Err(InstanceNameError::InvalidCharacter(bad));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Display for InstanceName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for InstanceName {
    type Error = InstanceNameError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<InstanceName> for String {
    fn from(name: InstanceName) -> Self {
        name.0
    }
}
