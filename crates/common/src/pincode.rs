use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Returned when a string is not a valid Indian postal code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid pincode '{0}': expected six digits not starting with 0")]
pub struct InvalidPincode(pub String);

/// Six digit Indian postal index number.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pincode(String);

impl Pincode {
    /// Parses a pincode, ignoring surrounding whitespace.
    pub fn parse(raw: &str) -> Result<Self, InvalidPincode> {
        let trimmed = raw.trim();
        let valid = trimmed.len() == 6
            && trimmed.bytes().all(|b| b.is_ascii_digit())
            && !trimmed.starts_with('0');
        if valid {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(InvalidPincode(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Pincode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Pincode {
    type Err = InvalidPincode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Pincode {
    type Error = InvalidPincode;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Pincode> for String {
    fn from(pincode: Pincode) -> Self {
        pincode.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_six_digits() {
        assert_eq!(Pincode::parse("560001").unwrap().as_str(), "560001");
        assert_eq!(Pincode::parse(" 110001 ").unwrap().as_str(), "110001");
    }

    #[test]
    fn rejects_malformed() {
        assert!(Pincode::parse("56001").is_err());
        assert!(Pincode::parse("5600011").is_err());
        assert!(Pincode::parse("012345").is_err());
        assert!(Pincode::parse("56OO01").is_err());
        assert!(Pincode::parse("").is_err());
    }

    #[test]
    fn deserialization_validates() {
        let ok: Pincode = serde_json::from_str("\"400001\"").unwrap();
        assert_eq!(ok.as_str(), "400001");
        assert!(serde_json::from_str::<Pincode>("\"4000\"").is_err());
    }
}
