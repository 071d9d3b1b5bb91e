/// Reference table lookups with timeout and cache
pub mod lookup;

/// Rule and rule group interpreter
pub mod interpreter;

/// Flow traversal service
pub mod flow_execution_service;

/// Flow definition management service
pub mod flow_definition_service;

/// Job lifecycle service and worker pool
pub mod job_service;
