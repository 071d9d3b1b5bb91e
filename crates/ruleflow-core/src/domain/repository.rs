//! Repository traits for Ruleflow Core
//!
//! This module defines the persistence seams used by the core services.
//! External crates can implement these traits to provide different storage
//! mechanisms; in-memory implementations live in [`memory`].

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::flow_definition::{FlowDefinition, FlowId};
use super::job::{Job, JobId, JobLogEntry, JobStatus};
use crate::CoreError;

/// A row of a reference table
pub type Row = Map<String, Value>;

/// Repository for flow definitions
#[async_trait]
pub trait FlowDefinitionRepository: Send + Sync {
    /// Find a flow definition by ID
    async fn find_by_id(&self, id: &FlowId) -> Result<Option<FlowDefinition>, CoreError>;

    /// Save a flow definition
    async fn save(&self, definition: &FlowDefinition) -> Result<(), CoreError>;

    /// Delete a flow definition
    async fn delete(&self, id: &FlowId) -> Result<(), CoreError>;

    /// Get all flow definitions
    async fn find_all(&self) -> Result<Vec<FlowDefinition>, CoreError>;
}

/// Filter for job listings
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    /// Only jobs of this flow
    pub flow_id: Option<FlowId>,
    /// Only jobs with this status
    pub status: Option<JobStatus>,
    /// Maximum number of jobs returned
    pub limit: Option<usize>,
}

/// Repository for jobs and their audit logs
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Store a new job
    async fn insert(&self, job: &Job) -> Result<(), CoreError>;

    /// Find a job by ID
    async fn get(&self, id: &JobId) -> Result<Option<Job>, CoreError>;

    /// Replace the stored job with `updated` if its status is still `expected`
    ///
    /// Returns the stored job after the swap. A status mismatch is a
    /// `TransitionError` and leaves the stored job untouched.
    async fn compare_and_swap(
        &self,
        id: &JobId,
        expected: JobStatus,
        updated: Job,
    ) -> Result<Job, CoreError>;

    /// Jobs matching a filter, newest first
    async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, CoreError>;

    /// Append an audit log entry
    async fn append_log(&self, id: &JobId, entry: JobLogEntry) -> Result<(), CoreError>;

    /// Audit log of a job
    async fn logs(&self, id: &JobId) -> Result<Vec<JobLogEntry>, CoreError>;
}

/// Read access to reference tables
#[async_trait]
pub trait ReferenceTableRepository: Send + Sync {
    /// Row of `table` with primary key `key`
    async fn find_row(&self, table: &str, key: &str) -> Result<Option<Row>, CoreError>;

    /// Whether a table is registered
    async fn table_exists(&self, table: &str) -> Result<bool, CoreError>;

    /// Names of registered tables
    async fn list_tables(&self) -> Result<Vec<String>, CoreError>;
}

/// Memory implementations for testing
#[cfg(feature = "testing")]
pub mod memory {
    use super::*;
    use dashmap::mapref::entry::Entry;
    use dashmap::DashMap;
    use std::collections::HashMap;
    use std::sync::Arc;

    /// In-memory flow definition repository
    #[derive(Default)]
    pub struct MemoryFlowDefinitionRepository {
        definitions: Arc<DashMap<String, FlowDefinition>>,
    }

    impl MemoryFlowDefinitionRepository {
        /// Create a new memory flow definition repository
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl FlowDefinitionRepository for MemoryFlowDefinitionRepository {
        async fn find_by_id(&self, id: &FlowId) -> Result<Option<FlowDefinition>, CoreError> {
            Ok(self.definitions.get(&id.0).map(|d| d.clone()))
        }

        async fn save(&self, definition: &FlowDefinition) -> Result<(), CoreError> {
            self.definitions
                .insert(definition.id.0.clone(), definition.clone());
            Ok(())
        }

        async fn delete(&self, id: &FlowId) -> Result<(), CoreError> {
            self.definitions.remove(&id.0);
            Ok(())
        }

        async fn find_all(&self) -> Result<Vec<FlowDefinition>, CoreError> {
            let mut all: Vec<FlowDefinition> =
                self.definitions.iter().map(|e| e.value().clone()).collect();
            all.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(all)
        }
    }

    /// In-memory job repository using concurrent maps so that updates are
    /// serialized per job id rather than globally
    #[derive(Default)]
    pub struct MemoryJobRepository {
        jobs: Arc<DashMap<String, Job>>,
        logs: Arc<DashMap<String, Vec<JobLogEntry>>>,
    }

    impl MemoryJobRepository {
        /// Create a new memory job repository
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl JobRepository for MemoryJobRepository {
        async fn insert(&self, job: &Job) -> Result<(), CoreError> {
            match self.jobs.entry(job.id.0.clone()) {
                Entry::Occupied(_) => Err(CoreError::StateStoreError(format!(
                    "Job already exists: {}",
                    job.id
                ))),
                Entry::Vacant(slot) => {
                    slot.insert(job.clone());
                    Ok(())
                }
            }
        }

        async fn get(&self, id: &JobId) -> Result<Option<Job>, CoreError> {
            Ok(self.jobs.get(&id.0).map(|job| job.clone()))
        }

        async fn compare_and_swap(
            &self,
            id: &JobId,
            expected: JobStatus,
            updated: Job,
        ) -> Result<Job, CoreError> {
            // The entry guard holds the shard lock for this key until the swap is done
            match self.jobs.entry(id.0.clone()) {
                Entry::Vacant(_) => Err(CoreError::JobNotFound(id.0.clone())),
                Entry::Occupied(mut stored) => {
                    if stored.get().status != expected {
                        return Err(CoreError::TransitionError(format!(
                            "Job {} is {}, expected {}",
                            id,
                            stored.get().status,
                            expected
                        )));
                    }
                    stored.insert(updated.clone());
                    Ok(updated)
                }
            }
        }

        async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, CoreError> {
            let mut jobs: Vec<Job> = self
                .jobs
                .iter()
                .filter(|e| filter.flow_id.as_ref().map_or(true, |f| &e.flow_id == f))
                .filter(|e| filter.status.map_or(true, |s| e.status == s))
                .map(|e| e.value().clone())
                .collect();
            jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            if let Some(limit) = filter.limit {
                jobs.truncate(limit);
            }
            Ok(jobs)
        }

        async fn append_log(&self, id: &JobId, entry: JobLogEntry) -> Result<(), CoreError> {
            self.logs.entry(id.0.clone()).or_default().push(entry);
            Ok(())
        }

        async fn logs(&self, id: &JobId) -> Result<Vec<JobLogEntry>, CoreError> {
            Ok(self
                .logs
                .get(&id.0)
                .map(|entries| entries.clone())
                .unwrap_or_default())
        }
    }

    /// In-memory reference tables keyed by table name then primary key
    #[derive(Default)]
    pub struct MemoryReferenceTableRepository {
        tables: Arc<DashMap<String, HashMap<String, Row>>>,
    }

    impl MemoryReferenceTableRepository {
        /// Create an empty repository
        pub fn new() -> Self {
            Self::default()
        }

        /// Register or replace a whole table
        pub fn put_table(&self, table: impl Into<String>, rows: HashMap<String, Row>) {
            self.tables.insert(table.into(), rows);
        }

        /// Insert a single row, creating the table if needed
        pub fn put_row(&self, table: &str, key: impl Into<String>, row: Row) {
            self.tables
                .entry(table.to_string())
                .or_default()
                .insert(key.into(), row);
        }

        /// Remove every table
        pub fn clear(&self) {
            self.tables.clear();
        }
    }

    #[async_trait]
    impl ReferenceTableRepository for MemoryReferenceTableRepository {
        async fn find_row(&self, table: &str, key: &str) -> Result<Option<Row>, CoreError> {
            let rows = self
                .tables
                .get(table)
                .ok_or_else(|| CoreError::LookupError(format!("Unknown reference table: {}", table)))?;
            Ok(rows.get(key).cloned())
        }

        async fn table_exists(&self, table: &str) -> Result<bool, CoreError> {
            Ok(self.tables.contains_key(table))
        }

        async fn list_tables(&self) -> Result<Vec<String>, CoreError> {
            let mut names: Vec<String> = self.tables.iter().map(|e| e.key().clone()).collect();
            names.sort();
            Ok(names)
        }
    }
}
