//! Core types of the edit pipeline: identifiers, values, policies,
//! transactions, edges, and the ports the application layer talks through.

pub mod attachment;
pub mod batch;
pub mod edge;
pub mod effect;
pub mod object;
pub mod phid;
pub mod policy;
pub mod ports;
pub mod post;
pub mod project;
pub mod slug;
pub mod transaction;
pub mod value;
