use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const PREFIX: &str = "PHID-";
const RANDOM_LEN: usize = 20;

/// Stable, globally unique identifier for any object in the system.
///
/// The textual form is `PHID-<TYPE>-<random>`; transaction identifiers carry
/// an extra subtype segment (`PHID-XACT-PROJ-<random>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Phid(String);

#[derive(Error, Debug, Clone, PartialEq)]
#[error("invalid PHID \"{0}\"")]
pub struct PhidError(pub String);

impl Phid {
    /// Generates a fresh PHID of the given type constant (e.g. `PROJ`).
    pub fn generate(type_const: &str) -> Self {
        Self(format!("{PREFIX}{type_const}-{}", random_suffix()))
    }

    /// Generates a transaction PHID for objects of the given type constant.
    pub fn generate_transaction(object_type: &str) -> Self {
        Self(format!("{PREFIX}XACT-{object_type}-{}", random_suffix()))
    }

    pub fn parse(value: &str) -> Result<Self, PhidError> {
        let Some(rest) = value.strip_prefix(PREFIX) else {
            return Err(PhidError(value.to_string()));
        };
        match rest.split_once('-') {
            Some((type_const, tail)) if !type_const.is_empty() && !tail.is_empty() => {
                Ok(Self(value.to_string()))
            }
            _ => Err(PhidError(value.to_string())),
        }
    }

    /// The type segment, e.g. `PROJ` for `PHID-PROJ-abc`.
    pub fn type_const(&self) -> &str {
        self.0[PREFIX.len()..]
            .split('-')
            .next()
            .unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RANDOM_LEN)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect()
}

impl fmt::Display for Phid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Phid {
    type Err = PhidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Phid {
    type Error = PhidError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Phid> for String {
    fn from(phid: Phid) -> Self {
        phid.0
    }
}

impl AsRef<str> for Phid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
