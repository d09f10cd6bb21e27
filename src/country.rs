//! Regulatory domain handling.
//!
//! HaLow channel plans are selected per country. Most countries have their own
//! conf directory (`conf/US`, `conf/JP`, ...), while every country that uses the
//! European channel plan shares `conf/EU` and patches its own code into the
//! copied conf file.

use serde::Serialize;
use std::fmt;

use crate::error::LauncherError;

/// Countries with a dedicated S1G channel plan.
pub const S1G_COUNTRIES: &[&str] = &[
    "US", "CN", "JP", "T8", "AU", "NZ", "K1", "K2", "S8", "S9", "T9",
];

/// Countries that share the European channel plan.
pub const EU_COUNTRIES: &[&str] = &[
    "AT", "BE", "BG", "CY", "CZ", "DE", "DK", "EE", "ES", "FI", "FR", "GR", "HR", "HU", "IE",
    "IT", "LT", "LU", "LV", "MT", "NL", "PL", "PT", "RO", "SE", "SI", "SK", "GB", "SA",
];

/// A validated country code as given on the command line.
///
/// Some codes are pseudo-countries that select a sub-band of a real
/// regulatory domain (`K1`/`K2` for Korea, `S8`/`S9` for Singapore,
/// `T8`/`T9` for Taiwan).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Country(String);

impl Country {
    pub fn parse(code: &str) -> Result<Self, LauncherError> {
        let code = code.trim();
        if S1G_COUNTRIES.contains(&code) || EU_COUNTRIES.contains(&code) {
            Ok(Country(code.to_string()))
        } else {
            Err(LauncherError::UnsupportedCountry(code.to_string()))
        }
    }

    pub fn code(&self) -> &str {
        &self.0
    }

    pub fn is_eu(&self) -> bool {
        EU_COUNTRIES.contains(&self.0.as_str())
    }

    /// Name of the directory under `conf/` holding this country's templates.
    pub fn conf_dir_name(&self) -> &str {
        if self.is_eu() { "EU" } else { &self.0 }
    }

    /// The ISO code handed to `iw reg set` and written as `country_code=`.
    pub fn regulatory_code(&self) -> &str {
        match self.0.as_str() {
            "K1" | "K2" => "KR",
            "S8" | "S9" => "SG",
            "T8" | "T9" => "TW",
            other => other,
        }
    }

    /// Driver parameters selecting the sub-band for pseudo-country codes.
    pub fn band_param(&self) -> Option<&'static str> {
        match self.0.as_str() {
            "K1" => Some("kr_band=1"),
            "K2" => Some("kr_band=2"),
            "S8" => Some("sg_band=8"),
            "S9" => Some("sg_band=9"),
            "T8" => Some("tw_band=8"),
            "T9" => Some("tw_band=9"),
            _ => None,
        }
    }
}

impl fmt::Display for Country {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_s1g_and_eu_countries() {
        assert!(Country::parse("US").is_ok());
        assert!(Country::parse("DE").is_ok());
        assert!(Country::parse("K2").is_ok());
    }

    #[test]
    fn rejects_unknown_country() {
        let err = Country::parse("TW").unwrap_err();
        assert!(matches!(err, LauncherError::UnsupportedCountry(ref c) if c == "TW"));
    }

    #[test]
    fn eu_countries_share_conf_dir() {
        let de = Country::parse("DE").unwrap();
        assert!(de.is_eu());
        assert_eq!(de.conf_dir_name(), "EU");
        assert_eq!(de.regulatory_code(), "DE");

        let jp = Country::parse("JP").unwrap();
        assert!(!jp.is_eu());
        assert_eq!(jp.conf_dir_name(), "JP");
    }

    #[test]
    fn pseudo_countries_map_to_regulatory_domain() {
        assert_eq!(Country::parse("K1").unwrap().regulatory_code(), "KR");
        assert_eq!(Country::parse("S9").unwrap().regulatory_code(), "SG");
        assert_eq!(Country::parse("T8").unwrap().regulatory_code(), "TW");
        assert_eq!(Country::parse("T9").unwrap().band_param(), Some("tw_band=9"));
        assert_eq!(Country::parse("US").unwrap().band_param(), None);
    }
}
