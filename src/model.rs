//! Data models for Crunch.
//!
//! Members are the only persisted entity. Everything the distance engine
//! touches is a plain value type: a [`Coordinate`] in, a
//! [`DistanceStatistics`] out.

use serde::{Deserialize, Serialize};

/// A point on the Earth's surface in signed decimal degrees.
///
/// Latitude is expected in `[-90, 90]` and longitude in `[-180, 180]`.
/// Range checking happens at registration time, never inside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl From<[f64; 2]> for Coordinate {
    fn from([latitude, longitude]: [f64; 2]) -> Self {
        Self::new(latitude, longitude)
    }
}

/// Message reported when fewer than two members are registered.
pub const INSUFFICIENT_DATA_MESSAGE: &str = "Not enough users to provide distance statistics.";

/// Summary of all pairwise member distances, in meters.
///
/// The `Insufficient` variant is a regular result, not a failure: with fewer
/// than two coordinates there are no pairs to summarize.
///
/// # Wire format
///
/// ```json
/// {"min": 0.0, "max": 18260426.1, "mean": 10473652.0, "standard deviation": 4741588.7}
/// ```
///
/// or
///
/// ```json
/// {"error": "Not enough users to provide distance statistics."}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DistanceStatistics {
    Summary {
        min: f64,
        max: f64,
        mean: f64,
        #[serde(rename = "standard deviation")]
        standard_deviation: f64,
    },
    Insufficient { error: String },
}

impl DistanceStatistics {
    pub fn insufficient() -> Self {
        DistanceStatistics::Insufficient {
            error: INSUFFICIENT_DATA_MESSAGE.to_string(),
        }
    }

    pub fn is_insufficient(&self) -> bool {
        matches!(self, DistanceStatistics::Insufficient { .. })
    }
}

/// A registered club member as stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub company: String,
    pub email: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Hex digest of the member's password, if one was supplied.
    pub hash: Option<String>,
    /// Registration time, e.g. "Tuesday, December 13, 2016 10:03 PM".
    pub registered: String,
}

/// Public view of a member returned by `GET /users`.
///
/// Identical to [`Member`] minus the password digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberProfile {
    #[serde(rename = "_id")]
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub company: String,
    pub email: String,
    pub latitude: f64,
    pub longitude: f64,
    pub registered: String,
}

impl From<Member> for MemberProfile {
    fn from(member: Member) -> Self {
        Self {
            id: member.id,
            first_name: member.first_name,
            last_name: member.last_name,
            company: member.company,
            email: member.email,
            latitude: member.latitude,
            longitude: member.longitude,
            registered: member.registered,
        }
    }
}

/// A member record as it appears in a seed file.
///
/// Either `password` (hashed on load) or a precomputed `hash` may be given.
/// Missing ids and registration times are generated.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedMember {
    #[serde(default, alias = "_id")]
    pub id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub company: String,
    pub email: String,
    #[serde(deserialize_with = "number_or_string")]
    pub latitude: f64,
    #[serde(deserialize_with = "number_or_string")]
    pub longitude: f64,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub registered: Option<String>,
}

/// Seed datasets carry coordinates either as JSON numbers or as strings.
fn number_or_string<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(value) => Ok(value),
        Raw::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Form body for `POST /login`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}
