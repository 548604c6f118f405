//! Genome ID new-type with validation for genome record identifiers.

use sqlx::{Database, Postgres, encode::IsNull, error::BoxDynError};

/// A type-safe identifier for genome records.
///
/// [`GenomeId`] is a new-type wrapper around `i64` whose values are always positive.
/// It is accepted on the command line (`--genomes 3,7,9`) and inside the JSON job
/// descriptor stored on every worker row, hence the [`FromStr`](std::str::FromStr) and
/// serde implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GenomeId(i64);

impl TryFrom<i64> for GenomeId {
    type Error = GenomeIdI64ConvError;

    /// Attempts to convert an `i64` to a [`GenomeId`] with validation.
    ///
    /// # Errors
    ///
    /// - `GenomeIdI64ConvError::NonPositive` if the value is zero or negative
    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value <= 0 {
            Err(GenomeIdI64ConvError::NonPositive(value))
        } else {
            Ok(Self(value))
        }
    }
}

impl std::ops::Deref for GenomeId {
    type Target = i64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::str::FromStr for GenomeId {
    type Err = GenomeIdFromStrError;

    /// Parses a string as a [`GenomeId`].
    ///
    /// # Errors
    ///
    /// - `GenomeIdFromStrError::ParseError` if the string is not a valid `i64`
    /// - `GenomeIdFromStrError::NonPositive` if the parsed value is zero or negative
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s
            .trim()
            .parse::<i64>()
            .map_err(GenomeIdFromStrError::ParseError)?;
        id.try_into().map_err(GenomeIdFromStrError::NonPositive)
    }
}

impl std::fmt::Display for GenomeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl sqlx::Type<Postgres> for GenomeId {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <i64 as sqlx::Type<Postgres>>::type_info()
    }
}

impl sqlx::postgres::PgHasArrayType for GenomeId {
    fn array_type_info() -> sqlx::postgres::PgTypeInfo {
        <i64 as sqlx::postgres::PgHasArrayType>::array_type_info()
    }
}

impl<'r> sqlx::Decode<'r, Postgres> for GenomeId {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let id = <i64 as sqlx::Decode<Postgres>>::decode(value)?;
        id.try_into().map_err(|err| Box::new(err) as BoxDynError)
    }
}

impl<'q> sqlx::Encode<'q, Postgres> for GenomeId {
    fn encode_by_ref(
        &self,
        buf: &mut <Postgres as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, BoxDynError> {
        <i64 as sqlx::Encode<'q, Postgres>>::encode_by_ref(&self.0, buf)
    }
}

impl serde::Serialize for GenomeId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for GenomeId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let id = i64::deserialize(deserializer)?;
        id.try_into().map_err(serde::de::Error::custom)
    }
}

/// Errors that can occur when converting from `i64` to [`GenomeId`].
#[derive(Debug, thiserror::Error)]
pub enum GenomeIdI64ConvError {
    /// The provided value is zero or negative, but [`GenomeId`] requires positive values.
    #[error("GenomeId must be positive, got: {0}")]
    NonPositive(i64),
}

/// Errors that can occur when parsing a string as a [`GenomeId`].
#[derive(Debug, thiserror::Error)]
pub enum GenomeIdFromStrError {
    /// The string is not a valid `i64`.
    #[error("Invalid number format: {0}")]
    ParseError(#[source] std::num::ParseIntError),
    /// The parsed value is zero or negative.
    #[error(transparent)]
    NonPositive(GenomeIdI64ConvError),
}
