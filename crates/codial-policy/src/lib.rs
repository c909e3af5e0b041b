//! # codial-policy
//!
//! Workspace policy for the Codial agent core. Loads the operator-managed
//! policy files (`RULES.md`, `CODIAL.md`, `AGENTS.md`, the Claude memory
//! chain, skills, and subagent definitions) into an immutable
//! [`PolicySnapshot`], and manages the user-editable `CODIAL.md` rule list.
//!
//! The loader is pure on its input files: two loads over an unchanged
//! filesystem produce snapshots with identical content hashes.

#![deny(unsafe_code)]

pub mod constraints;
pub mod errors;
pub mod frontmatter;
pub mod loader;
pub mod rules_store;
pub mod skills;
pub mod subagent;

pub use constraints::{enforce_provider_and_model, parse_policy_constraints, PolicyConstraints};
pub use errors::PolicyError;
pub use loader::{extract_agent_defaults, AgentDefaults, PolicyLoader, PolicySnapshot};
pub use rules_store::RulesStore;
pub use skills::SkillSummary;
pub use subagent::SubagentSpec;
