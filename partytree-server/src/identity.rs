//! Contact normalization.
//!
//! Turns a user-typed phone number into E.164 (`+15551234567`) so that two
//! spellings of the same number collide on the per-event uniqueness check.
//! Numbers without a leading `+` are read in the region of the configured
//! default calling code. Validity is decided by libphonenumber metadata.

use crate::error::EngineError;
use phonenumber::country;
use phonenumber::Mode;
use regex::Regex;
use std::sync::LazyLock;

/// Digits plus the separators people actually type.
static PHONE_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9 ().\-]+$").expect("static regex"));

/// Normalizes raw contact strings for one default region.
#[derive(Debug, Clone)]
pub struct ContactNormalizer {
    region: country::Id,
}

impl Default for ContactNormalizer {
    fn default() -> Self {
        ContactNormalizer {
            region: country::Id::US,
        }
    }
}

impl ContactNormalizer {
    /// Normalizer for the region that owns `default_country_code`
    /// (1 reads national numbers as NANP, 44 as UK, and so on).
    pub fn new(default_country_code: u16) -> Result<Self, EngineError> {
        let region = phonenumber::metadata::DATABASE
            .by_code(&default_country_code)
            .and_then(|regions| {
                regions
                    .into_iter()
                    .find_map(|meta| meta.id().parse::<country::Id>().ok())
            })
            .ok_or_else(|| {
                EngineError::Validation(format!(
                    "unknown country calling code {default_country_code}"
                ))
            })?;
        Ok(ContactNormalizer { region })
    }

    /// Canonicalize `raw` to E.164.
    pub fn normalize(&self, raw: &str) -> Result<String, EngineError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(EngineError::InvalidIdentity("phone required".into()));
        }
        if !PHONE_SHAPE.is_match(raw) {
            return Err(EngineError::InvalidIdentity("invalid phone".into()));
        }

        let number = phonenumber::parse(Some(self.region), raw)
            .map_err(|_| EngineError::InvalidIdentity("invalid phone".into()))?;
        if !phonenumber::is_valid(&number) {
            return Err(EngineError::InvalidIdentity("invalid phone".into()));
        }
        Ok(number.format().mode(Mode::E164).to_string())
    }
}
