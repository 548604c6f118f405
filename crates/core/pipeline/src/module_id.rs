//! Module identifiers: `Name` or `Name:sub1+sub2`.

use std::fmt;

/// Identifies a module, optionally restricted to some of its submodules
///
/// The string form is `Name` or `Name:sub1+sub2`. Submodule names keep the order they were
/// written in and duplicates are dropped, so `Annotate:pfam+tigrfam+pfam` and
/// `Annotate:pfam+tigrfam` are the same identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId {
    name: String,
    submodules: Vec<String>,
}

impl ModuleId {
    /// A module identifier without submodules
    pub fn new(name: impl Into<String>) -> Result<Self, ModuleIdError> {
        let name = name.into();
        validate_part(&name, ModuleIdError::EmptyName)?;
        Ok(Self {
            name,
            submodules: Vec::new(),
        })
    }

    /// A module identifier restricted to the given submodules
    pub fn with_submodules<I, S>(name: impl Into<String>, submodules: I) -> Result<Self, ModuleIdError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut id = Self::new(name)?;
        for submodule in submodules {
            let submodule = submodule.into();
            validate_part(&submodule, ModuleIdError::EmptySubmodule)?;
            if !id.submodules.contains(&submodule) {
                id.submodules.push(submodule);
            }
        }
        Ok(id)
    }

    /// Primary module name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Selected submodules, in order; empty when the whole module is meant
    pub fn submodules(&self) -> &[String] {
        &self.submodules
    }

    pub fn has_submodules(&self) -> bool {
        !self.submodules.is_empty()
    }

    /// Splits `Name:a+b` into `Name:a` and `Name:b`. An identifier without submodules
    /// unnests to itself.
    pub fn unnest(&self) -> Vec<ModuleId> {
        if self.submodules.is_empty() {
            return vec![self.clone()];
        }
        self.submodules
            .iter()
            .map(|submodule| ModuleId {
                name: self.name.clone(),
                submodules: vec![submodule.clone()],
            })
            .collect()
    }

    /// Merges identifiers by primary name, the inverse of [`unnest`](Self::unnest)
    ///
    /// Names keep the order of their first appearance and submodules are concatenated in
    /// order. A bare `Name` selects the whole module and absorbs any `Name:sub` entry.
    pub fn nest<I>(ids: I) -> Vec<ModuleId>
    where
        I: IntoIterator<Item = ModuleId>,
    {
        let mut nested: Vec<ModuleId> = Vec::new();
        // Names whose whole module was requested
        let mut whole: Vec<String> = Vec::new();

        for id in ids {
            let is_whole = id.submodules.is_empty();
            match nested.iter_mut().find(|n| n.name == id.name) {
                Some(existing) => {
                    if whole.contains(&id.name) {
                        continue;
                    }
                    if is_whole {
                        existing.submodules.clear();
                        whole.push(id.name);
                        continue;
                    }
                    for submodule in id.submodules {
                        if !existing.submodules.contains(&submodule) {
                            existing.submodules.push(submodule);
                        }
                    }
                }
                None => {
                    if is_whole {
                        whole.push(id.name.clone());
                    }
                    nested.push(id);
                }
            }
        }
        nested
    }
}

fn validate_part(part: &str, empty: ModuleIdError) -> Result<(), ModuleIdError> {
    if part.trim().is_empty() {
        return Err(empty);
    }
    if let Some(c) = part.chars().find(|c| matches!(c, ':' | '+' | ',') || c.is_whitespace()) {
        return Err(ModuleIdError::InvalidCharacter(c, part.to_string()));
    }
    Ok(())
}

impl std::str::FromStr for ModuleId {
    type Err = ModuleIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once(':') {
            None => Self::new(s),
            Some((name, submodules)) => {
                if submodules.is_empty() {
                    return Err(ModuleIdError::EmptySubmodule);
                }
                Self::with_submodules(name, submodules.split('+'))
            }
        }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.submodules.is_empty() {
            write!(f, ":{}", self.submodules.join("+"))?;
        }
        Ok(())
    }
}

impl serde::Serialize for ModuleId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for ModuleId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors that can occur when parsing a [`ModuleId`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModuleIdError {
    #[error("module name must not be empty")]
    EmptyName,
    #[error("submodule name must not be empty")]
    EmptySubmodule,
    #[error("invalid character {0:?} in {1:?}")]
    InvalidCharacter(char, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ModuleId {
        s.parse().expect("Failed to parse module id")
    }

    #[test]
    fn parse_plain_name() {
        let parsed = id("Genes");
        assert_eq!(parsed.name(), "Genes");
        assert!(!parsed.has_submodules());
        assert_eq!(parsed.to_string(), "Genes");
    }

    #[test]
    fn parse_with_submodules_keeps_order_and_drops_duplicates() {
        let parsed = id("Annotate:tigrfam+pfam+tigrfam");
        assert_eq!(parsed.name(), "Annotate");
        assert_eq!(parsed.submodules(), ["tigrfam", "pfam"]);
        assert_eq!(parsed.to_string(), "Annotate:tigrfam+pfam");
    }

    #[test]
    fn parse_rejects_malformed_ids() {
        assert_eq!("".parse::<ModuleId>(), Err(ModuleIdError::EmptyName));
        assert_eq!(":pfam".parse::<ModuleId>(), Err(ModuleIdError::EmptyName));
        assert_eq!(
            "Annotate:".parse::<ModuleId>(),
            Err(ModuleIdError::EmptySubmodule)
        );
        assert_eq!(
            "Annotate:pfam++tigrfam".parse::<ModuleId>(),
            Err(ModuleIdError::EmptySubmodule)
        );
        assert!(matches!(
            "Annotate:pfam:x".parse::<ModuleId>(),
            Err(ModuleIdError::InvalidCharacter(':', _))
        ));
    }

    #[test]
    fn unnest_splits_submodules() {
        let unnested = id("Annotate:pfam+tigrfam").unnest();
        assert_eq!(unnested, vec![id("Annotate:pfam"), id("Annotate:tigrfam")]);
        assert_eq!(id("Genes").unnest(), vec![id("Genes")]);
    }

    #[test]
    fn nest_is_the_inverse_of_unnest() {
        let original = id("Annotate:pfam+tigrfam");
        assert_eq!(ModuleId::nest(original.unnest()), vec![original]);
    }

    #[test]
    fn nest_merges_by_name_in_first_appearance_order() {
        let nested = ModuleId::nest(vec![
            id("Annotate:pfam"),
            id("Genes"),
            id("Annotate:tigrfam"),
            id("Annotate:pfam"),
        ]);
        assert_eq!(nested, vec![id("Annotate:pfam+tigrfam"), id("Genes")]);
    }

    #[test]
    fn nest_bare_name_absorbs_submodules() {
        let nested = ModuleId::nest(vec![id("Annotate:pfam"), id("Annotate"), id("Annotate:x")]);
        assert_eq!(nested, vec![id("Annotate")]);
    }

    #[test]
    fn serde_uses_the_string_form() {
        let json = serde_json::to_string(&id("Annotate:pfam")).expect("Failed to serialize");
        assert_eq!(json, r#""Annotate:pfam""#);
        let back: ModuleId = serde_json::from_str(&json).expect("Failed to deserialize");
        assert_eq!(back, id("Annotate:pfam"));
    }
}
