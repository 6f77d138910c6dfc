//! Core data models for the bucket-backed file system.
//!
//! These types describe objects as the remote store reports them, the
//! settings applied to every write, and the normalized keys that address
//! objects inside the bucket.

pub mod acl;
pub mod key;
pub mod object;
