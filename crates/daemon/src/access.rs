//! Group-based authorization.
//!
//! A user may read a path when at least one group lists the user as a member
//! and that group's pattern matches the path relative to the served root.
//! Access is the union over all groups; there is no wildcard or admin bypass.
//!
//! Patterns are compiled once when the policy is built so a bad pattern is
//! rejected at startup instead of at request time.

use std::collections::HashSet;

use regex::Regex;

use crate::config::{validate_groups, ConfigError, GroupConfig, MatchMode};

/// A compiled group definition.
#[derive(Debug, Clone)]
pub struct Group {
    name: String,
    source: String,
    pattern: Regex,
    members: HashSet<String>,
    description: Option<String>,
}

impl Group {
    fn compile(config: &GroupConfig, mode: MatchMode) -> Result<Self, ConfigError> {
        let anchored = match mode {
            MatchMode::Prefix => format!("^(?:{})", config.pattern),
            MatchMode::Full => format!("^(?:{})$", config.pattern),
        };
        let pattern = Regex::new(&anchored).map_err(|e| ConfigError::InvalidPattern {
            group: config.name.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            name: config.name.clone(),
            source: config.pattern.clone(),
            pattern,
            members: config.users.iter().cloned().collect(),
            description: config.description.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The pattern as written in the configuration.
    pub fn pattern(&self) -> &str {
        &self.source
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Members sorted by name.
    pub fn members(&self) -> Vec<String> {
        let mut members: Vec<String> = self.members.iter().cloned().collect();
        members.sort();
        members
    }

    pub fn has_member(&self, username: &str) -> bool {
        self.members.contains(username)
    }

    /// Whether the pattern matches a root-relative path.
    pub fn matches(&self, relative_path: &str) -> bool {
        self.pattern.is_match(relative_path)
    }
}

/// Immutable authorization policy built from the configured groups.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    groups: Vec<Group>,
    mode: MatchMode,
}

impl AccessPolicy {
    /// Compile the configured groups.
    ///
    /// Fails if a name is empty or duplicated or a pattern does not compile.
    pub fn from_groups(groups: &[GroupConfig], mode: MatchMode) -> Result<Self, ConfigError> {
        validate_groups(groups)?;
        let groups = groups
            .iter()
            .map(|g| Group::compile(g, mode))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(groups = groups.len(), ?mode, "Access policy compiled");
        Ok(Self { groups, mode })
    }

    pub fn match_mode(&self) -> MatchMode {
        self.mode
    }

    /// All groups in configuration order.
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.iter()
    }

    /// Names of the groups the user is a member of, in configuration order.
    pub fn user_groups(&self, username: &str) -> Vec<String> {
        self.groups
            .iter()
            .filter(|g| g.has_member(username))
            .map(|g| g.name.clone())
            .collect()
    }

    pub fn has_any_group(&self, username: &str) -> bool {
        self.groups.iter().any(|g| g.has_member(username))
    }

    /// Names of the groups that both include the user and match the path.
    ///
    /// `relative_path` must already be root-relative and traversal-safe.
    /// An empty result means access is denied.
    pub fn accessible_groups(&self, username: &str, relative_path: &str) -> Vec<String> {
        self.groups
            .iter()
            .filter(|g| g.has_member(username) && g.matches(relative_path))
            .map(|g| g.name.clone())
            .collect()
    }

    pub fn can_access(&self, username: &str, relative_path: &str) -> bool {
        self.groups
            .iter()
            .any(|g| g.has_member(username) && g.matches(relative_path))
    }
}
