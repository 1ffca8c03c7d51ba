use crate::errors::ConfigError;
use crate::utils::TupleRange;
use serde::{
    Deserialize,
    Serialize,
};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Tolerance for a single matched column.
///
/// Every variant turns an observed value into a symmetric window
/// `[value - half_width, value + half_width]`.
///
/// Example:
/// ```
/// use mzbasket::Tolerance;
///
/// let tol = Tolerance::Ppm(30.0);
/// assert!((tol.half_width(100.0) - 0.003).abs() < 1e-12);
///
/// let range = tol.range(100.0).unwrap();
/// assert!(range.contains(100.0029));
/// assert!(!range.contains(100.0031));
/// ```
///
/// In a configuration file a tolerance can be written either as
/// `{"kind": "ppm", "value": 30.0}` or using the short form `"ppm,30"`.
/// The kind `none` takes no value (`{"kind": "none"}` or `"None,None"`)
/// and means the column has to match exactly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ToleranceRepr", into = "ToleranceRepr")]
pub enum Tolerance {
    /// Exact match, the window is a single point.
    None,
    /// Parts-per-million of the observed value.
    Ppm(f64),
    /// Percentage of the observed value.
    Percent(f64),
    /// Multiple of the observed value, `Factor(2.0)` spans `[-x, 3x]` around `x`.
    Factor(f64),
    /// Fixed half-width in the units of the column.
    Window(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToleranceKind {
    None,
    Ppm,
    Percent,
    Factor,
    Window,
}

impl ToleranceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToleranceKind::None => "none",
            ToleranceKind::Ppm => "ppm",
            ToleranceKind::Percent => "percent",
            ToleranceKind::Factor => "factor",
            ToleranceKind::Window => "window",
        }
    }
}

impl FromStr for ToleranceKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "null" => Ok(ToleranceKind::None),
            "ppm" => Ok(ToleranceKind::Ppm),
            "percent" | "perc" | "pct" => Ok(ToleranceKind::Percent),
            "factor" => Ok(ToleranceKind::Factor),
            "window" => Ok(ToleranceKind::Window),
            _ => Err(ConfigError::UnknownToleranceKind(s.to_string())),
        }
    }
}

impl Tolerance {
    /// Build a tolerance from a kind and an optional parameter.
    ///
    /// `none` must not carry a value, every other kind requires a finite,
    /// non-negative one.
    pub fn try_new(kind: ToleranceKind, value: Option<f64>) -> Result<Self, ConfigError> {
        let out = match (kind, value) {
            (ToleranceKind::None, None) => Tolerance::None,
            (ToleranceKind::None, Some(value)) => {
                return Err(ConfigError::UnexpectedToleranceValue {
                    kind: kind.as_str(),
                    value,
                });
            }
            (_, None) => {
                return Err(ConfigError::MissingToleranceValue {
                    kind: kind.as_str(),
                });
            }
            (ToleranceKind::Ppm, Some(x)) => Tolerance::Ppm(x),
            (ToleranceKind::Percent, Some(x)) => Tolerance::Percent(x),
            (ToleranceKind::Factor, Some(x)) => Tolerance::Factor(x),
            (ToleranceKind::Window, Some(x)) => Tolerance::Window(x),
        };
        out.validate()?;
        Ok(out)
    }

    pub fn kind(&self) -> ToleranceKind {
        match self {
            Tolerance::None => ToleranceKind::None,
            Tolerance::Ppm(_) => ToleranceKind::Ppm,
            Tolerance::Percent(_) => ToleranceKind::Percent,
            Tolerance::Factor(_) => ToleranceKind::Factor,
            Tolerance::Window(_) => ToleranceKind::Window,
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Tolerance::None => None,
            Tolerance::Ppm(x)
            | Tolerance::Percent(x)
            | Tolerance::Factor(x)
            | Tolerance::Window(x) => Some(*x),
        }
    }

    /// Checks the parameter is usable. The variants are public so a tolerance
    /// can be built without going through [`Tolerance::try_new`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.value() {
            Some(value) if !value.is_finite() || value < 0.0 => {
                Err(ConfigError::InvalidToleranceValue {
                    kind: self.kind().as_str(),
                    value,
                })
            }
            _ => Ok(()),
        }
    }

    /// Non-negative half-width of the window around `value`.
    pub fn half_width(&self, value: f64) -> f64 {
        match self {
            Tolerance::None => 0.0,
            Tolerance::Ppm(ppm) => value.abs() * ppm * 1e-6,
            Tolerance::Percent(pct) => value.abs() * pct / 100.0,
            Tolerance::Factor(factor) => value.abs() * factor,
            Tolerance::Window(width) => *width,
        }
    }

    /// Closed window around `value`, `None` if `value` is not finite.
    pub fn range(&self, value: f64) -> Option<TupleRange<f64>> {
        if !value.is_finite() {
            return None;
        }
        let half_width = self.half_width(value);
        TupleRange::try_new(value - half_width, value + half_width).ok()
    }
}

impl FromStr for Tolerance {
    type Err = ConfigError;

    /// Parses the short `<kind>,<value>` form, eg. `ppm,30` or `None,None`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, value) = s
            .split_once(',')
            .ok_or_else(|| ConfigError::MalformedTolerance(s.to_string()))?;
        let kind: ToleranceKind = kind.parse()?;
        let value = match value.trim() {
            "" | "None" | "none" | "null" => None,
            other => Some(
                other
                    .parse::<f64>()
                    .map_err(|_| ConfigError::MalformedTolerance(s.to_string()))?,
            ),
        };
        Tolerance::try_new(kind, value)
    }
}

impl std::fmt::Display for Tolerance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.value() {
            Some(value) => write!(f, "{},{}", self.kind().as_str(), value),
            None => write!(f, "{},None", self.kind().as_str()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum ToleranceRepr {
    Structured {
        kind: String,
        #[serde(default)]
        value: Option<f64>,
    },
    Short(String),
}

impl TryFrom<ToleranceRepr> for Tolerance {
    type Error = ConfigError;

    fn try_from(value: ToleranceRepr) -> Result<Self, Self::Error> {
        match value {
            ToleranceRepr::Structured { kind, value } => Tolerance::try_new(kind.parse()?, value),
            ToleranceRepr::Short(s) => s.parse(),
        }
    }
}

impl From<Tolerance> for ToleranceRepr {
    fn from(value: Tolerance) -> Self {
        ToleranceRepr::Structured {
            kind: value.kind().as_str().to_string(),
            value: value.value(),
        }
    }
}

/// Tolerances keyed by column name.
pub type ToleranceMap = BTreeMap<String, Tolerance>;

/// Tolerances used when none are configured: 30 ppm on the precursor m/z
/// and a fixed 0.03 window on the retention time.
pub fn default_tolerances() -> ToleranceMap {
    let mut out = ToleranceMap::new();
    out.insert("PrecMz".to_string(), Tolerance::Ppm(30.0));
    out.insert("RetTime".to_string(), Tolerance::Window(0.03));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ppm_half_width() {
        let tol = Tolerance::Ppm(30.0);
        assert!((tol.half_width(100.0) - 0.003).abs() < 1e-12);
        let range = tol.range(100.0).unwrap();
        assert!(range.contains(100.0029));
        assert!(!range.contains(100.0031));
    }

    #[test]
    fn test_window_is_constant() {
        let tol = Tolerance::Window(0.5);
        assert_eq!(tol.half_width(1.0), 0.5);
        assert_eq!(tol.half_width(1000.0), 0.5);
    }

    #[test]
    fn test_percent_and_none() {
        assert_eq!(Tolerance::Percent(10.0).half_width(50.0), 5.0);
        assert_eq!(Tolerance::None.half_width(50.0), 0.0);
        let point = Tolerance::None.range(50.0).unwrap();
        assert_eq!(point.as_tuple(), (50.0, 50.0));
    }

    #[test]
    fn test_factor_scales_with_value() {
        let tol = Tolerance::Factor(10.0);
        assert_eq!(tol.half_width(2.0), 20.0);
        assert_eq!(tol.range(2.0).unwrap().as_tuple(), (-18.0, 22.0));
        assert_eq!(Tolerance::Factor(0.0).half_width(7.0), 0.0);
    }

    #[test]
    fn test_half_width_non_negative_for_negative_values() {
        assert!(Tolerance::Ppm(10.0).half_width(-500.0) > 0.0);
        assert!(Tolerance::Percent(10.0).half_width(-500.0) > 0.0);
        assert!(Tolerance::Factor(2.0).half_width(-500.0) > 0.0);
    }

    #[test]
    fn test_non_finite_value_has_no_range() {
        assert!(Tolerance::Ppm(10.0).range(f64::NAN).is_none());
        assert!(Tolerance::Window(1.0).range(f64::INFINITY).is_none());
    }

    #[test]
    fn test_try_new_combinations() {
        assert_eq!(
            Tolerance::try_new(ToleranceKind::Ppm, Some(30.0)).unwrap(),
            Tolerance::Ppm(30.0)
        );
        assert_eq!(
            Tolerance::try_new(ToleranceKind::None, None).unwrap(),
            Tolerance::None
        );
        assert!(matches!(
            Tolerance::try_new(ToleranceKind::None, Some(1.0)),
            Err(ConfigError::UnexpectedToleranceValue { .. })
        ));
        assert!(matches!(
            Tolerance::try_new(ToleranceKind::Window, None),
            Err(ConfigError::MissingToleranceValue { .. })
        ));
        assert!(matches!(
            Tolerance::try_new(ToleranceKind::Ppm, Some(-1.0)),
            Err(ConfigError::InvalidToleranceValue { .. })
        ));
        assert!(Tolerance::Ppm(-1.0).validate().is_err());
    }

    #[test]
    fn test_short_form_parsing() {
        assert_eq!("ppm,30".parse::<Tolerance>().unwrap(), Tolerance::Ppm(30.0));
        assert_eq!(
            "window,0.03".parse::<Tolerance>().unwrap(),
            Tolerance::Window(0.03)
        );
        assert_eq!("None,None".parse::<Tolerance>().unwrap(), Tolerance::None);
        assert_eq!(
            "factor,10".parse::<Tolerance>().unwrap(),
            Tolerance::Factor(10.0)
        );
        assert_eq!("perc,5".parse::<Tolerance>().unwrap(), Tolerance::Percent(5.0));
        assert!(matches!(
            "ratio,10".parse::<Tolerance>(),
            Err(ConfigError::UnknownToleranceKind(_))
        ));
        assert!(matches!(
            "factor,-1".parse::<Tolerance>(),
            Err(ConfigError::InvalidToleranceValue { .. })
        ));
        assert!(matches!(
            "ppm".parse::<Tolerance>(),
            Err(ConfigError::MalformedTolerance(_))
        ));
        assert!(matches!(
            "ppm,abc".parse::<Tolerance>(),
            Err(ConfigError::MalformedTolerance(_))
        ));
    }

    #[test]
    fn test_serde_both_encodings() {
        let map: ToleranceMap = serde_json::from_str(
            r#"{
                "PrecMz": "ppm,30",
                "RetTime": {"kind": "window", "value": 0.03},
                "PrecZ": {"kind": "none"}
            }"#,
        )
        .unwrap();
        assert_eq!(map["PrecMz"], Tolerance::Ppm(30.0));
        assert_eq!(map["RetTime"], Tolerance::Window(0.03));
        assert_eq!(map["PrecZ"], Tolerance::None);

        let serialized = serde_json::to_string(&map).unwrap();
        let back: ToleranceMap = serde_json::from_str(&serialized).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn test_serde_rejects_bad_kind() {
        let out: Result<Tolerance, _> = serde_json::from_str(r#"{"kind": "ratio", "value": 2}"#);
        assert!(out.is_err());
        let out: Result<Tolerance, _> = serde_json::from_str(r#"{"kind": "factor"}"#);
        assert!(out.is_err());
        let out: Result<Tolerance, _> = serde_json::from_str(r#"{"kind": "none", "value": 2}"#);
        assert!(out.is_err());
    }
}
