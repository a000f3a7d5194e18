//! Social graph store - friendship and membership edges
//!
//! Every successful mutation here stamps the affected users' freshness
//! markers through [`crate::notify`], in the same transaction as the edge
//! change. Friend mutations stamp both endpoints; membership mutations stamp
//! only the acting user (a user wants to know "did my group list change",
//! not "did this group's roster change").

pub mod store;

pub use store::SocialStore;
