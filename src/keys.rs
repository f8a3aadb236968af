//! Redis key-space layout for a single named queue.

use crate::job::JobId;

/// Computes the five keys a queue named `Q` under prefix `P` owns:
/// `P:Q:waiting`, `P:Q:active`, `P:Q:delayed`, `P:Q:job:<id>`, `P:Q:paused`.
#[derive(Debug, Clone)]
pub struct KeySpace {
    prefix: String,
    queue: String,
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>, queue: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            queue: queue.into(),
        }
    }

    fn base(&self) -> String {
        format!("{}:{}", self.prefix, self.queue)
    }

    pub fn waiting(&self) -> String {
        format!("{}:waiting", self.base())
    }

    pub fn active(&self) -> String {
        format!("{}:active", self.base())
    }

    pub fn delayed(&self) -> String {
        format!("{}:delayed", self.base())
    }

    pub fn job(&self, id: JobId) -> String {
        format!("{}:job:{}", self.base(), id)
    }

    /// Shared prefix for every job hash key, used by scripts that build
    /// the key from an id returned at the Lua level.
    pub fn job_prefix(&self) -> String {
        format!("{}:job:", self.base())
    }

    pub fn paused(&self) -> String {
        format!("{}:paused", self.base())
    }
}
