//! Configuration types, built with `service-builder` the way the
//! teacher's `QueueConfig` / `RedisConfig` are.

use serde::{Deserialize, Serialize};
use service_builder::builder;

use crate::job::JobOptions;

/// Redis connection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[builder]
pub struct ConnectionOptions {
    #[builder(default = "\"localhost\".to_string()", getter)]
    pub host: String,

    #[builder(default = "6379", getter)]
    pub port: u16,

    #[builder(default = "None", getter)]
    pub password: Option<String>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            password: None,
        }
    }
}

/// Queue (producer) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[builder]
pub struct QueueOptions {
    #[builder(default = "\"jet\".to_string()", getter)]
    pub prefix: String,

    #[builder(default = "JobOptions::default()", getter)]
    pub default_job_options: JobOptions,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            prefix: "jet".to_string(),
            default_job_options: JobOptions::default(),
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[builder]
pub struct WorkerOptions {
    #[builder(default = "1", getter)]
    pub concurrency: usize,

    /// `None` means unbounded.
    #[builder(default = "None", getter)]
    pub max_jobs_per_worker: Option<u64>,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            max_jobs_per_worker: None,
        }
    }
}

impl WorkerOptionsBuilder {
    /// Fast local-dev defaults: a couple of concurrent slots, no cap.
    pub fn development() -> Self {
        WorkerOptionsBuilder::new().concurrency(2)
    }

    /// Conservative production defaults.
    pub fn production() -> Self {
        WorkerOptionsBuilder::new().concurrency(8)
    }

    /// Single-slot, deterministic configuration for tests.
    pub fn testing() -> Self {
        WorkerOptionsBuilder::new().concurrency(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_connection_options() {
        let options = ConnectionOptions::default();
        assert_eq!(options.host, "localhost");
        assert_eq!(options.port, 6379);
        assert!(options.password.is_none());
    }

    #[test]
    fn queue_options_builder_overrides_prefix() {
        let options = QueueOptionsBuilder::new()
            .prefix("custom".to_string())
            .build()
            .expect("failed to build config");
        assert_eq!(options.get_prefix(), "custom");
    }

    #[test]
    fn worker_options_presets() {
        let dev = WorkerOptionsBuilder::development()
            .build()
            .expect("failed to build config");
        assert_eq!(*dev.get_concurrency(), 2);

        let prod = WorkerOptionsBuilder::production()
            .build()
            .expect("failed to build config");
        assert_eq!(*prod.get_concurrency(), 8);
    }
}
