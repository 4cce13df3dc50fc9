//! Fixed predictor order shared by feature vectors and coefficients.
//!
//! Predictors are a closed enum rather than string keys, so a misspelled
//! predictor is a compile error instead of a silently zero contribution.
//! Names only appear at the serialisation boundary, where unknown names are
//! rejected.

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const NUM_PREDICTORS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predictor {
    Recency,
    Frequency,
    Monetary,
    Age,
    SessionCount,
    AvgSessionDuration,
}

impl Predictor {
    /// All predictors in canonical order.
    pub const ALL: [Predictor; NUM_PREDICTORS] = [
        Predictor::Recency,
        Predictor::Frequency,
        Predictor::Monetary,
        Predictor::Age,
        Predictor::SessionCount,
        Predictor::AvgSessionDuration,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Predictor::Recency => "recency",
            Predictor::Frequency => "frequency",
            Predictor::Monetary => "monetary",
            Predictor::Age => "age",
            Predictor::SessionCount => "session_count",
            Predictor::AvgSessionDuration => "avg_session_duration",
        }
    }
}

impl fmt::Display for Predictor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown predictor '{0}'")]
pub struct UnknownPredictor(pub String);

impl FromStr for Predictor {
    type Err = UnknownPredictor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Predictor::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| UnknownPredictor(s.to_string()))
    }
}

/// A subject's predictor values in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureVector(pub [f64; NUM_PREDICTORS]);

impl FeatureVector {
    pub fn new(values: [f64; NUM_PREDICTORS]) -> Self {
        Self(values)
    }

    #[inline]
    pub fn get(&self, predictor: Predictor) -> f64 {
        self.0[predictor.index()]
    }

    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }
}

/// Fitted weight per predictor, in canonical order.
///
/// Serialises as a `name = weight` table. On load, predictors absent from the
/// table contribute 0 and unknown names are an error.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CoefficientVector(pub [f64; NUM_PREDICTORS]);

impl CoefficientVector {
    pub fn zeros() -> Self {
        Self([0.0; NUM_PREDICTORS])
    }

    #[inline]
    pub fn get(&self, predictor: Predictor) -> f64 {
        self.0[predictor.index()]
    }

    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Dot product with a subject's features.
    pub fn linear_predictor(&self, features: &FeatureVector) -> f64 {
        self.0
            .iter()
            .zip(features.0.iter())
            .map(|(beta, x)| beta * x)
            .sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Predictor, f64)> + '_ {
        Predictor::ALL.into_iter().map(|p| (p, self.get(p)))
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }
}

impl Serialize for CoefficientVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(NUM_PREDICTORS))?;
        for (predictor, weight) in self.iter() {
            map.serialize_entry(predictor.name(), &weight)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for CoefficientVector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CoefficientVisitor;

        impl<'de> Visitor<'de> for CoefficientVisitor {
            type Value = CoefficientVector;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a table of predictor name to coefficient")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut coefficients = CoefficientVector::zeros();
                while let Some((name, weight)) = access.next_entry::<String, f64>()? {
                    let predictor = name.parse::<Predictor>().map_err(de::Error::custom)?;
                    coefficients.0[predictor.index()] = weight;
                }
                Ok(coefficients)
            }
        }

        deserializer.deserialize_map(CoefficientVisitor)
    }
}
