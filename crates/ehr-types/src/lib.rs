//! Validated identifier types shared across the EHR crates.
//!
//! Parties in a consent (subject, actor, custodian) are exchanged with the node as URNs. Patients
//! are addressed by their BSN (`urn:oid:2.16.840.1.113883.2.4.6.3:<bsn>`) and organisations by
//! their AGB code (`urn:oid:2.16.840.1.113883.2.4.6.1:<agb>`).

/// OID prefix for patient URNs carrying a BSN.
pub const BSN_URN_PREFIX: &str = "urn:oid:2.16.840.1.113883.2.4.6.3:";

/// OID prefix for organisation URNs carrying an AGB code.
pub const AGB_URN_PREFIX: &str = "urn:oid:2.16.840.1.113883.2.4.6.1:";

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
}

/// A string type that guarantees non-empty content.
///
/// The input is trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// # Errors
    ///
    /// Returns `TextError::Empty` if the trimmed input is empty.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// Errors raised while parsing or deriving URNs.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UrnError {
    #[error("URN must start with 'urn:': {0}")]
    MissingScheme(String),
    #[error("not a BSN URN: {0}")]
    NotBsn(String),
    #[error("BSN must be 8 or 9 digits: {0}")]
    InvalidBsn(String),
    #[error("AGB code cannot be empty")]
    EmptyAgb,
}

/// A party identifier in URN form.
///
/// Construction validates the `urn:` scheme only; the OID namespace is free so that organisations
/// registered under other schemes still round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Urn(String);

impl Urn {
    /// Parses an already formatted URN.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, UrnError> {
        let trimmed = input.as_ref().trim();
        if !trimmed.starts_with("urn:") {
            return Err(UrnError::MissingScheme(trimmed.to_owned()));
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Builds the patient URN for a BSN.
    pub fn for_bsn(bsn: &str) -> Result<Self, UrnError> {
        validate_bsn(bsn)?;
        Ok(Self(format!("{BSN_URN_PREFIX}{bsn}")))
    }

    /// Builds the organisation URN for an AGB code.
    pub fn for_agb(agb: &str) -> Result<Self, UrnError> {
        let agb = agb.trim();
        if agb.is_empty() {
            return Err(UrnError::EmptyAgb);
        }
        Ok(Self(format!("{AGB_URN_PREFIX}{agb}")))
    }

    /// Extracts the BSN from a patient URN.
    pub fn bsn(&self) -> Result<&str, UrnError> {
        let bsn = self
            .0
            .strip_prefix(BSN_URN_PREFIX)
            .ok_or_else(|| UrnError::NotBsn(self.0.clone()))?;
        validate_bsn(bsn)?;
        Ok(bsn)
    }

    /// Last `:`-separated segment, which is the local identifier for both BSN and AGB URNs.
    pub fn local_id(&self) -> &str {
        self.0.rsplit(':').next().unwrap_or(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate_bsn(bsn: &str) -> Result<(), UrnError> {
    let digits_only = bsn.chars().all(|c| c.is_ascii_digit());
    if !digits_only || !(8..=9).contains(&bsn.len()) {
        return Err(UrnError::InvalidBsn(bsn.to_owned()));
    }
    Ok(())
}

impl std::fmt::Display for Urn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Urn {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for Urn {
    type Err = UrnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Urn::parse(s)
    }
}

impl serde::Serialize for Urn {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for Urn {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Urn::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_text_trims_and_rejects_blank() {
        assert_eq!(NonEmptyText::new("  treatment ").unwrap().as_str(), "treatment");
        assert!(matches!(NonEmptyText::new("   "), Err(TextError::Empty)));
    }

    #[test]
    fn bsn_urn_round_trips_local_id() {
        let urn = Urn::for_bsn("999999990").unwrap();
        assert_eq!(urn.as_str(), "urn:oid:2.16.840.1.113883.2.4.6.3:999999990");
        assert_eq!(urn.bsn().unwrap(), "999999990");
        assert_eq!(urn.local_id(), "999999990");
    }

    #[test]
    fn bsn_extraction_rejects_other_namespaces() {
        let urn = Urn::for_agb("00000007").unwrap();
        assert!(matches!(urn.bsn(), Err(UrnError::NotBsn(_))));
    }

    #[test]
    fn bsn_must_be_eight_or_nine_digits() {
        assert!(matches!(Urn::for_bsn("1234"), Err(UrnError::InvalidBsn(_))));
        assert!(matches!(Urn::for_bsn("12345678a"), Err(UrnError::InvalidBsn(_))));
        assert!(Urn::for_bsn("12345678").is_ok());
    }

    #[test]
    fn parse_requires_urn_scheme() {
        assert!(matches!(
            Urn::parse("https://example.org"),
            Err(UrnError::MissingScheme(_))
        ));
        let urn: Urn = "urn:org:A".parse().unwrap();
        assert_eq!(urn.local_id(), "A");
    }

    #[test]
    fn urn_deserialises_from_plain_string() {
        let urn: Urn = serde_json::from_str("\"urn:org:self\"").unwrap();
        assert_eq!(urn.as_str(), "urn:org:self");
        assert!(serde_json::from_str::<Urn>("\"not-a-urn\"").is_err());
    }
}
