//! HTTP communication with the repair agents
//!
//! Every database node runs an agent (default port 8746) that drives the
//! local repair tooling. The manager talks to it over JSON with a Bearer
//! API key.
//!
//! ```text
//! Generator → worker → HttpAgentClient → POST /repair/start → job id
//!                            ↑                 ↓
//!                       job status ← GET /repair/status/{job_id}
//! ```

pub mod agent_client;
pub mod types;

pub use agent_client::{AgentClients, HttpAgentClient};
