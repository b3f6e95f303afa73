// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Capability Registry
//!
//! In-memory index over the capability catalog. Constructed once at startup
//! and shared by reference; [`CapabilityRegistry::reload`] rebuilds the index
//! off to the side and swaps it in, so concurrent readers always see either
//! the old or the new catalog in full.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::domain::capability::{
    CapabilityCatalog, CapabilityEntry, CapabilityListError, CapabilityPattern, CapabilityType,
};

/// Minimum normalized similarity for a near-miss suggestion.
const SUGGESTION_CUTOFF: f64 = 0.6;
const MAX_SUGGESTIONS: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Capability registry not found: {0}")]
    MissingSource(PathBuf),
    #[error("failed to read capability registry {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse capability registry: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Duplicate capability IDs found in registry: {0}")]
    DuplicateId(String),
    #[error("registry was built in memory and has no source to reload from")]
    NoSource,
}

#[derive(Debug)]
struct CapabilityIndex {
    version: String,
    entries: Vec<CapabilityEntry>,
    by_id: HashMap<String, usize>,
}

impl CapabilityIndex {
    fn build(catalog: CapabilityCatalog) -> Result<Self, RegistryError> {
        let mut by_id = HashMap::with_capacity(catalog.capabilities.len());
        for (position, entry) in catalog.capabilities.iter().enumerate() {
            if by_id.insert(entry.id.clone(), position).is_some() {
                return Err(RegistryError::DuplicateId(entry.id.clone()));
            }
        }
        Ok(Self {
            version: catalog.version,
            entries: catalog.capabilities,
            by_id,
        })
    }

    fn get(&self, id: &str) -> Option<&CapabilityEntry> {
        self.by_id.get(id).map(|&i| &self.entries[i])
    }
}

pub struct CapabilityRegistry {
    source: Option<PathBuf>,
    index: RwLock<Arc<CapabilityIndex>>,
}

impl CapabilityRegistry {
    /// Loads the catalog at `path`. A missing file or duplicate id is fatal.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref().to_path_buf();
        let index = Self::read_index(&path)?;
        info!(
            path = %path.display(),
            capabilities = index.entries.len(),
            version = %index.version,
            "Capability registry loaded"
        );
        let registry = Self {
            source: Some(path),
            index: RwLock::new(Arc::new(index)),
        };
        registry.warn_on_flow_mismatches();
        Ok(registry)
    }

    pub fn from_catalog(catalog: CapabilityCatalog) -> Result<Self, RegistryError> {
        let index = CapabilityIndex::build(catalog)?;
        Ok(Self {
            source: None,
            index: RwLock::new(Arc::new(index)),
        })
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, RegistryError> {
        Self::from_catalog(CapabilityCatalog::from_yaml_str(yaml)?)
    }

    fn read_index(path: &Path) -> Result<CapabilityIndex, RegistryError> {
        if !path.exists() {
            return Err(RegistryError::MissingSource(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        CapabilityIndex::build(CapabilityCatalog::from_yaml_str(&content)?)
    }

    /// Re-reads the source file. On failure the current index stays in place.
    pub fn reload(&self) -> Result<(), RegistryError> {
        let path = self.source.as_ref().ok_or(RegistryError::NoSource)?;
        let index = Self::read_index(path)?;
        let count = index.entries.len();
        *self.index.write() = Arc::new(index);
        info!(path = %path.display(), capabilities = count, "Capability registry reloaded");
        self.warn_on_flow_mismatches();
        Ok(())
    }

    /// Swaps in the index of a registry built and validated elsewhere.
    pub fn replace_with(&self, candidate: &CapabilityRegistry) {
        let index = candidate.snapshot();
        let count = index.entries.len();
        *self.index.write() = index;
        info!(capabilities = count, "Capability registry replaced");
    }

    fn snapshot(&self) -> Arc<CapabilityIndex> {
        Arc::clone(&self.index.read())
    }

    fn warn_on_flow_mismatches(&self) {
        for problem in self.validate_flows() {
            warn!("Capability flow mismatch: {}", problem);
        }
    }

    pub fn version(&self) -> String {
        self.snapshot().version.clone()
    }

    pub fn count(&self) -> usize {
        self.snapshot().entries.len()
    }

    pub fn exists(&self, id: &str) -> bool {
        self.snapshot().by_id.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<CapabilityEntry> {
        self.snapshot().get(id).cloned()
    }

    /// All entries in catalog order.
    pub fn get_all(&self) -> Vec<CapabilityEntry> {
        self.snapshot().entries.clone()
    }

    fn filtered(&self, keep: impl Fn(&CapabilityEntry) -> bool) -> Vec<CapabilityEntry> {
        self.snapshot()
            .entries
            .iter()
            .filter(|entry| keep(*entry))
            .cloned()
            .collect()
    }

    pub fn get_by_domain(&self, domain: &str) -> Vec<CapabilityEntry> {
        self.filtered(|entry| entry.domain == domain)
    }

    pub fn get_by_type(&self, kind: CapabilityType) -> Vec<CapabilityEntry> {
        self.filtered(|entry| entry.kind == kind)
    }

    pub fn get_by_tag(&self, tag: &str) -> Vec<CapabilityEntry> {
        self.filtered(|entry| entry.tags.iter().any(|t| t == tag))
    }

    pub fn get_mfa_required(&self) -> Vec<CapabilityEntry> {
        self.filtered(|entry| entry.requires_mfa)
    }

    pub fn matches_pattern(&self, pattern: &CapabilityPattern) -> BTreeSet<String> {
        self.snapshot()
            .entries
            .iter()
            .filter(|entry| pattern.matches(&entry.id))
            .map(|entry| entry.id.clone())
            .collect()
    }

    /// Expands `*`, `prefix.*` or an exact id to the registered ids it
    /// covers. A malformed pattern matches nothing.
    pub fn matches_wildcard(&self, pattern: &str) -> BTreeSet<String> {
        match CapabilityPattern::parse(pattern) {
            Ok(pattern) => self.matches_pattern(&pattern),
            Err(_) => BTreeSet::new(),
        }
    }

    /// One-level child segments below `domain` that themselves contain
    /// capabilities, e.g. `workday` → `{hcm, payroll, time}`.
    pub fn get_subdomains(&self, domain: &str) -> BTreeSet<String> {
        let prefix = format!("{domain}.");
        self.snapshot()
            .entries
            .iter()
            .filter_map(|entry| entry.id.strip_prefix(prefix.as_str()))
            .filter_map(|rest| rest.split_once('.').map(|(segment, _)| segment.to_string()))
            .collect()
    }

    /// Up to three registered ids closest to `id`, best first.
    pub fn suggest(&self, id: &str) -> Vec<String> {
        let index = self.snapshot();
        let mut scored: Vec<(f64, &str)> = index
            .entries
            .iter()
            .map(|entry| (strsim::normalized_levenshtein(id, &entry.id), entry.id.as_str()))
            .filter(|(score, _)| *score >= SUGGESTION_CUTOFF)
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));
        scored
            .into_iter()
            .take(MAX_SUGGESTIONS)
            .map(|(_, id)| id.to_string())
            .collect()
    }

    /// Checks every literal id for existence and every wildcard for at least
    /// one match. Returns one error per offending entry.
    pub fn validate_capability_list<S: AsRef<str>>(&self, capabilities: &[S]) -> Vec<CapabilityListError> {
        let mut errors = Vec::new();
        for raw in capabilities {
            let raw = raw.as_ref();
            let pattern = match CapabilityPattern::parse(raw) {
                Ok(pattern) => pattern,
                Err(e) => {
                    errors.push(e.into());
                    continue;
                }
            };
            match &pattern {
                CapabilityPattern::Exact(id) if !self.exists(id) => {
                    errors.push(CapabilityListError::UnknownCapability {
                        id: id.clone(),
                        suggestions: self.suggest(id),
                    });
                }
                CapabilityPattern::Exact(_) => {}
                wildcard => {
                    if self.matches_pattern(wildcard).is_empty() {
                        errors.push(CapabilityListError::UnmatchedWildcard {
                            pattern: raw.trim().to_string(),
                        });
                    }
                }
            }
        }
        errors
    }

    /// Cross-checks composite flows: diagram edges against declared
    /// requirements, and declared requirements against the registry.
    pub fn validate_flows(&self) -> Vec<String> {
        let index = self.snapshot();
        let mut problems = Vec::new();
        for entry in &index.entries {
            problems.extend(entry.flow_reference_mismatches());
            for required in &entry.requires_capabilities {
                if index.get(required).is_none() {
                    problems.push(format!(
                        "{}: requires unknown capability '{}'",
                        entry.id, required
                    ));
                }
            }
        }
        problems
    }
}
