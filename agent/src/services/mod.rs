pub mod job_manager;
pub mod node_info;
pub mod nodetool;
