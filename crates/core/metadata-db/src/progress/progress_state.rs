//! Module progress state enumeration

/// State of one module progress row
///
/// Stored as a `TEXT` column. A value this build does not recognise decodes as
/// [`ProgressState::Unknown`] rather than failing the whole query, since workers of
/// different versions may share the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgressState {
    /// The module attempt is running (setup, run, optimize or teardown)
    Active,

    /// The module attempt is rolling back earlier output before a redo
    Undo,

    /// The module attempt finished successfully
    ///
    /// This is a terminal state.
    Done,

    /// The module attempt failed; the row carries the error message
    ///
    /// This is a terminal state.
    Error,

    /// Unrecognised value read from the store
    Unknown,
}

impl ProgressState {
    /// Convert the [`ProgressState`] to its stored name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Undo => "UNDO",
            Self::Done => "DONE",
            Self::Error => "ERROR",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Returns true if the attempt has ended, successfully or not
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

impl std::str::FromStr for ProgressState {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            s if s.eq_ignore_ascii_case("ACTIVE") => Ok(Self::Active),
            s if s.eq_ignore_ascii_case("UNDO") => Ok(Self::Undo),
            s if s.eq_ignore_ascii_case("DONE") => Ok(Self::Done),
            s if s.eq_ignore_ascii_case("ERROR") => Ok(Self::Error),
            _ => Ok(Self::Unknown),
        }
    }
}

impl std::fmt::Display for ProgressState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl sqlx::Type<sqlx::Postgres> for ProgressState {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        sqlx::postgres::PgTypeInfo::with_name("TEXT")
    }
}

impl sqlx::postgres::PgHasArrayType for ProgressState {
    fn array_type_info() -> sqlx::postgres::PgTypeInfo {
        sqlx::postgres::PgTypeInfo::with_name("TEXT[]")
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for ProgressState {
    fn decode(
        value: <sqlx::Postgres as sqlx::Database>::ValueRef<'r>,
    ) -> Result<Self, sqlx::error::BoxDynError> {
        let value: &str = sqlx::Decode::<sqlx::Postgres>::decode(value)?;
        let Ok(state) = value.parse();
        Ok(state)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for ProgressState {
    fn encode_by_ref(
        &self,
        buf: &mut <sqlx::Postgres as sqlx::Database>::ArgumentBuffer<'q>,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        sqlx::Encode::<sqlx::Postgres>::encode_by_ref(&self.as_str(), buf)
    }
}

#[cfg(test)]
mod tests {
    use super::ProgressState;

    #[test]
    fn parse_is_case_insensitive_and_never_fails() {
        assert_eq!("done".parse::<ProgressState>(), Ok(ProgressState::Done));
        assert_eq!("Undo".parse::<ProgressState>(), Ok(ProgressState::Undo));
        assert_eq!(
            "PAUSED".parse::<ProgressState>(),
            Ok(ProgressState::Unknown)
        );
    }

    #[test]
    fn only_done_and_error_are_terminal() {
        assert!(ProgressState::Done.is_terminal());
        assert!(ProgressState::Error.is_terminal());
        assert!(!ProgressState::Active.is_terminal());
        assert!(!ProgressState::Undo.is_terminal());
    }
}
