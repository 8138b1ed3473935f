use crate::ports::outbound::{LineDirectory, StoreError};
use async_trait::async_trait;
use std::collections::HashSet;

/// Production lines known at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticLineDirectory {
    lines: HashSet<String>,
    /// Accept any line id
    permissive: bool,
}

impl StaticLineDirectory {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            permissive: false,
        }
    }

    /// A directory that knows every line.
    pub fn permissive() -> Self {
        Self {
            lines: HashSet::new(),
            permissive: true,
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[async_trait]
impl LineDirectory for StaticLineDirectory {
    async fn line_exists(&self, line: &str) -> Result<bool, StoreError> {
        Ok(self.permissive || self.lines.contains(line))
    }
}
