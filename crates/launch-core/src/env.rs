//! Environment binding.
//!
//! Variables are read through [`EnvProvider`] so that binding can be tested
//! without touching the real process environment.

use std::collections::{BTreeMap, HashMap};
use std::env;
use tracing::debug;

use crate::error::LaunchError;

/// Variables forwarded into the container, ordered by name.
pub type EnvironmentMap = BTreeMap<String, String>;

pub trait EnvProvider {
    fn get(&self, name: &str) -> Option<String>;
}

/// Reads from the current process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostEnv;

impl EnvProvider for HostEnv {
    fn get(&self, name: &str) -> Option<String> {
        env::var(name).ok()
    }
}

/// Fixed set of variables, used where the process environment must not leak in.
#[derive(Debug, Default, Clone)]
pub struct MapEnv {
    vars: HashMap<String, String>,
}

impl MapEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.vars.insert(name.to_string(), value.to_string());
        self
    }
}

impl EnvProvider for MapEnv {
    fn get(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}

impl<const N: usize> From<[(&str, &str); N]> for MapEnv {
    fn from(pairs: [(&str, &str); N]) -> Self {
        pairs
            .into_iter()
            .fold(MapEnv::new(), |env, (name, value)| env.with(name, value))
    }
}

/// Splits a comma separated flag value, dropping blank entries.
///
/// `""` yields no names at all rather than a single empty one.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Collects `mandatory` and `optional` variables from `provider`.
///
/// Fails with every absent mandatory name when at least one is missing.
pub fn bind<P, S>(provider: &P, mandatory: &[S], optional: &[S]) -> Result<EnvironmentMap, LaunchError>
where
    P: EnvProvider + ?Sized,
    S: AsRef<str>,
{
    let mut bound = EnvironmentMap::new();
    let mut missing = Vec::new();

    for name in usable_names(mandatory) {
        match provider.get(name) {
            Some(value) => {
                bound.insert(name.to_string(), value);
            }
            None if !missing.iter().any(|m| m == name) => missing.push(name.to_string()),
            None => {}
        }
    }

    if !missing.is_empty() {
        return Err(LaunchError::MissingMandatoryVariable { names: missing });
    }

    for name in usable_names(optional) {
        if let Some(value) = provider.get(name) {
            bound.insert(name.to_string(), value);
        } else {
            debug!("Optional environment variable {} is not set, skipping", name);
        }
    }

    Ok(bound)
}

fn usable_names<S: AsRef<str>>(names: &[S]) -> impl Iterator<Item = &str> {
    names
        .iter()
        .map(|name| name.as_ref().trim())
        .filter(|name| !name.is_empty())
}
