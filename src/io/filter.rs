// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Topic filtering.
//!
//! A [`TopicFilter`] is resolved once against the connection table into a
//! [`ConnectionFilter`], the set of connection ids whose messages pass. The
//! iterators and the bulk reader only ever test connection ids.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::bag::record::{ChunkSummary, Connection};

/// Filter for selecting topics.
#[derive(Clone, Default)]
pub enum TopicFilter {
    /// Read all topics (no filtering)
    #[default]
    All,
    /// Read only specific topics
    Include(Vec<String>),
    /// Exclude specific topics
    Exclude(Vec<String>),
    /// Include topics matching regex pattern
    Regex(Arc<regex::Regex>),
    /// Custom filter function
    Custom(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl fmt::Debug for TopicFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.debug_tuple("All").finish(),
            Self::Include(v) => f.debug_tuple("Include").field(v).finish(),
            Self::Exclude(v) => f.debug_tuple("Exclude").field(v).finish(),
            Self::Regex(re) => f.debug_tuple("Regex").field(&re.as_str()).finish(),
            Self::Custom(_) => f.debug_tuple("Custom").field(&"<fn>").finish(),
        }
    }
}

impl<S: Into<String>> FromIterator<S> for TopicFilter {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::Include(iter.into_iter().map(Into::into).collect())
    }
}

impl From<Vec<String>> for TopicFilter {
    fn from(topics: Vec<String>) -> Self {
        TopicFilter::Include(topics)
    }
}

impl From<&[&str]> for TopicFilter {
    fn from(topics: &[&str]) -> Self {
        TopicFilter::include(topics.iter().copied())
    }
}

impl<const N: usize> From<[&str; N]> for TopicFilter {
    fn from(topics: [&str; N]) -> Self {
        TopicFilter::include(topics)
    }
}

impl TopicFilter {
    /// Check if a topic should be included.
    pub fn should_include(&self, topic: &str) -> bool {
        match self {
            TopicFilter::All => true,
            TopicFilter::Include(topics) => topics.iter().any(|t| t == topic),
            TopicFilter::Exclude(topics) => !topics.iter().any(|t| t == topic),
            TopicFilter::Regex(re) => re.is_match(topic),
            TopicFilter::Custom(f) => f(topic),
        }
    }

    /// Create an include filter from topic names.
    pub fn include<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Include(topics.into_iter().map(Into::into).collect())
    }

    /// Create an exclude filter from topic names.
    pub fn exclude<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Exclude(topics.into_iter().map(Into::into).collect())
    }

    /// Create a regex include filter.
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        regex::Regex::new(pattern).map(|re| Self::Regex(Arc::new(re)))
    }

    /// Create a custom filter from a function.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    /// Check if this filter passes every topic.
    pub fn is_all(&self) -> bool {
        matches!(self, TopicFilter::All)
    }

    /// Resolve the filter against a connection table.
    pub fn resolve(&self, connections: &HashMap<u32, Connection>) -> ConnectionFilter {
        if self.is_all() {
            return ConnectionFilter::All;
        }
        let allowed = connections
            .values()
            .filter(|conn| self.should_include(&conn.topic))
            .map(|conn| conn.conn)
            .collect();
        ConnectionFilter::Only(allowed)
    }
}

/// Set of connection ids whose messages pass a topic filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionFilter {
    /// Every connection passes
    All,
    /// Only the listed connections pass
    Only(HashSet<u32>),
}

impl ConnectionFilter {
    /// Check if a connection id passes.
    pub fn allows(&self, conn: u32) -> bool {
        match self {
            ConnectionFilter::All => true,
            ConnectionFilter::Only(ids) => ids.contains(&conn),
        }
    }

    /// Check if a chunk holds at least one passing connection.
    pub fn allows_chunk(&self, summary: &ChunkSummary) -> bool {
        match self {
            ConnectionFilter::All => true,
            ConnectionFilter::Only(ids) => summary
                .connections
                .iter()
                .any(|entry| ids.contains(&entry.conn)),
        }
    }

    /// Number of allowed connections, if restricted.
    pub fn allowed_count(&self) -> Option<usize> {
        match self {
            ConnectionFilter::All => None,
            ConnectionFilter::Only(ids) => Some(ids.len()),
        }
    }
}
