//! Member repository.
//!
//! Queue entries keyed by (queue channel, member). The ordering returned by
//! [`MemberRepository::list_ordered`] is the single source of truth for who
//! is next in line.

pub mod models;
pub mod queries;

pub use models::{MemberEntry, MemberState};
pub use queries::MemberRepository;
