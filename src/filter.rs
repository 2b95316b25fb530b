//! Metric name filtering for reports.
//!
//! A submetric such as `http_req_duration{status:200}` is judged by its own
//! name and by its parent's name, so including a parent includes all of its
//! submetrics and excluding a parent hides them too.

use crate::error::ConfigError;
use regex::Regex;
use std::collections::HashSet;

/// Decides which metric names reach a report.
#[derive(Debug, Clone, Default)]
pub struct MetricFilter {
    include: HashSet<String>,
    exclude: HashSet<String>,
    pattern: Option<Regex>,
}

impl MetricFilter {
    /// Build a filter. An empty include list admits every name.
    pub fn new(
        include: Vec<String>,
        exclude: Vec<String>,
        pattern: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let pattern = pattern
            .map(Regex::new)
            .transpose()
            .map_err(|source| ConfigError::InvalidPattern { source })?;

        Ok(Self {
            include: include.into_iter().collect(),
            exclude: exclude.into_iter().collect(),
            pattern,
        })
    }

    pub fn allows(&self, name: &str) -> bool {
        let parent = parent_name(name);
        let listed = |set: &HashSet<String>| set.contains(name) || set.contains(parent);

        if !self.include.is_empty() && !listed(&self.include) {
            return false;
        }
        if listed(&self.exclude) {
            return false;
        }
        match &self.pattern {
            Some(re) => re.is_match(name) || re.is_match(parent),
            None => true,
        }
    }
}

/// Name of the parent metric, or `name` itself when it is not a submetric.
fn parent_name(name: &str) -> &str {
    match name.find('{') {
        Some(idx) => &name[..idx],
        None => name,
    }
}
