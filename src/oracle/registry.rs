use super::{NoRec, Oracle, TlpHaving, TlpWhere};
use crate::error::FuzzError;
use crate::policy::Policy;

type Constructor = fn(&Policy) -> Box<dyn Oracle>;

/// Name → constructor table for every oracle the fuzzer ships.
pub struct OracleRegistry {
    entries: Vec<(&'static str, Constructor)>,
}

fn tlp_where(policy: &Policy) -> Box<dyn Oracle> {
    Box::new(TlpWhere::new(policy))
}

fn tlp_having(policy: &Policy) -> Box<dyn Oracle> {
    Box::new(TlpHaving::new(policy))
}

fn norec(policy: &Policy) -> Box<dyn Oracle> {
    Box::new(NoRec::new(policy))
}

impl Default for OracleRegistry {
    fn default() -> Self {
        let entries: Vec<(&'static str, Constructor)> = vec![
            ("tlp-where", tlp_where as Constructor),
            ("tlp-having", tlp_having as Constructor),
            ("norec", norec as Constructor),
        ];
        Self { entries }
    }
}

impl OracleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(name, _)| *name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| *n == name)
    }

    pub fn create(&self, name: &str, policy: &Policy) -> Result<Box<dyn Oracle>, FuzzError> {
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, constructor)| constructor(policy))
            .ok_or_else(|| FuzzError::UnknownOracle {
                name: name.to_string(),
                available: self.names().collect::<Vec<_>>().join(", "),
            })
    }

    /// Instantiate every named oracle, failing on the first unknown name.
    pub fn resolve<S: AsRef<str>>(
        &self,
        names: &[S],
        policy: &Policy,
    ) -> Result<Vec<Box<dyn Oracle>>, FuzzError> {
        names
            .iter()
            .map(|name| self.create(name.as_ref(), policy))
            .collect()
    }
}
