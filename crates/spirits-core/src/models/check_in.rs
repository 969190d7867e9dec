//! Application-facing check-in model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ids::{GlobalId, SiteId};

/// Identifier assigned by the external check-in service
pub type ExternalId = u64;

const MILLILITERS_PER_FLUID_OUNCE: f64 = 29.573_529_562_5;

/// Kind of drink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrinkStyle {
    #[default]
    Beer,
    Wine,
    Sake,
}

impl DrinkStyle {
    pub const ALL: [Self; 3] = [Self::Beer, Self::Wine, Self::Sake];

    /// Typical alcohol by volume, as a fraction
    #[must_use]
    pub const fn default_abv(self) -> f64 {
        match self {
            Self::Beer => 0.065,
            Self::Wine => 0.14,
            Self::Sake => 0.17,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Beer => "beer",
            Self::Wine => "wine",
            Self::Sake => "sake",
        }
    }
}

impl fmt::Display for DrinkStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for DrinkStyle {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|style| style.as_str() == needle)
            .ok_or_else(|| crate::Error::InvalidInput(format!("unknown drink style: {s}")))
    }
}

/// Drink volume, held in milliliters
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Volume(f64);

impl Volume {
    #[must_use]
    pub const fn milliliters(value: f64) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn liters(value: f64) -> Self {
        Self(value * 1000.0)
    }

    #[must_use]
    pub fn fluid_ounces(value: f64) -> Self {
        Self(value * MILLILITERS_PER_FLUID_OUNCE)
    }

    #[must_use]
    pub const fn as_milliliters(self) -> f64 {
        self.0
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.0} ml", self.0)
    }
}

/// Parses `330ml`, `0.5 l`, `12oz`, or a bare number of milliliters.
impl FromStr for Volume {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        let split = normalized
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(normalized.len());
        let (number, unit) = normalized.split_at(split);
        let value = number
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite() && *value > 0.0)
            .ok_or_else(|| crate::Error::InvalidInput(format!("invalid volume: {s}")))?;

        match unit.trim() {
            "" | "ml" => Ok(Self::milliliters(value)),
            "l" => Ok(Self::liters(value)),
            "oz" | "floz" | "fl oz" => Ok(Self::fluid_ounces(value)),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown volume unit: {other}"
            ))),
        }
    }
}

/// What was drunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drink {
    pub name: Option<String>,
    pub style: DrinkStyle,
    /// Alcohol by volume, as a fraction (0.065 = 6.5%)
    pub abv: f64,
    pub price: Option<f64>,
    pub volume: Volume,
}

impl Drink {
    /// A drink of `style` at its default ABV
    #[must_use]
    pub fn new(style: DrinkStyle, volume: Volume) -> Self {
        Self {
            name: None,
            style,
            abv: style.default_abv(),
            price: None,
            volume,
        }
    }
}

/// One check-in as the application sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckIn {
    pub external_id: Option<ExternalId>,
    pub time: DateTime<Utc>,
    pub drink: Drink,
}

/// Identity and lifecycle fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub id: GlobalId,
    pub creation_time: DateTime<Utc>,
    pub deleted: bool,
}

/// Application-facing shape of a persisted check-in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub metadata: Metadata,
    pub check_in: CheckIn,
}

impl Model {
    /// A brand-new local check-in, not yet committed by `owner`
    #[must_use]
    pub fn new(owner: SiteId, time: DateTime<Utc>, drink: Drink) -> Self {
        Self {
            metadata: Metadata {
                id: GlobalId::wildcard(owner),
                creation_time: Utc::now(),
                deleted: false,
            },
            check_in: CheckIn {
                external_id: None,
                time,
                drink,
            },
        }
    }

    /// A check-in staged from the external service
    #[must_use]
    pub fn imported(
        owner: SiteId,
        external_id: ExternalId,
        time: DateTime<Utc>,
        drink: Drink,
    ) -> Self {
        let mut model = Self::new(owner, time, drink);
        model.check_in.external_id = Some(external_id);
        model
    }

    #[must_use]
    pub const fn id(&self) -> GlobalId {
        self.metadata.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_style_default_abv() {
        assert!((DrinkStyle::Beer.default_abv() - 0.065).abs() < f64::EPSILON);
        assert!((DrinkStyle::Wine.default_abv() - 0.14).abs() < f64::EPSILON);
        assert!((DrinkStyle::Sake.default_abv() - 0.17).abs() < f64::EPSILON);
    }

    #[test]
    fn test_style_parse() {
        assert_eq!("Wine".parse::<DrinkStyle>().unwrap(), DrinkStyle::Wine);
        assert!("mead".parse::<DrinkStyle>().is_err());
    }

    #[test]
    fn test_volume_parse_units() {
        assert!((Volume::from_str("330ml").unwrap().as_milliliters() - 330.0).abs() < 1e-9);
        assert!((Volume::from_str("0.5 l").unwrap().as_milliliters() - 500.0).abs() < 1e-9);
        assert!((Volume::from_str("12oz").unwrap().as_milliliters() - 354.882_354_75).abs() < 1e-9);
        assert!((Volume::from_str("250").unwrap().as_milliliters() - 250.0).abs() < 1e-9);
    }

    #[test]
    fn test_volume_parse_rejects_invalid() {
        assert!(Volume::from_str("").is_err());
        assert!(Volume::from_str("0ml").is_err());
        assert!(Volume::from_str("12 pints").is_err());
    }

    #[test]
    fn test_new_model_carries_wildcard_id() {
        let owner = SiteId::new();
        let model = Model::new(
            owner,
            Utc::now(),
            Drink::new(DrinkStyle::Beer, Volume::milliliters(330.0)),
        );
        assert!(model.id().is_wildcard());
        assert!(model.id().is_owned_by(owner));
        assert!(!model.metadata.deleted);
        assert_eq!(model.check_in.external_id, None);
    }
}
