/// A wrapper that redacts its contents in `Debug` output.
///
/// Used for the metadata database URL, which usually carries a password. The inner value
/// can be accessed transparently via `Deref`, but when printed using `Debug`, it will
/// display `<redacted>` instead of the actual value.
///
/// This type does **not** implement `Serialize`, so the secret cannot end up in the
/// worker's persisted job descriptor by accident.
#[derive(Clone, PartialEq, Eq)]
pub struct Redacted<T>(T);

impl<T> Redacted<T> {
    /// Consumes the wrapper and returns the inner value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> From<T> for Redacted<T> {
    fn from(value: T) -> Self {
        Self(value)
    }
}

impl<T> std::ops::Deref for Redacted<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> std::fmt::Debug for Redacted<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("<redacted>")
    }
}

impl<'de, T> serde::Deserialize<'de> for Redacted<T>
where
    T: serde::Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        T::deserialize(deserializer).map(Redacted)
    }
}

#[cfg(test)]
mod tests {
    use super::Redacted;

    #[test]
    fn debug_hides_the_secret() {
        let url = Redacted::from("postgres://user:hunter2@db/genomes".to_string());
        assert_eq!(format!("{url:?}"), "<redacted>");
        assert!(url.contains("hunter2"));
    }
}
