//! B+ tree storage (spec.md §3/§4.7 components 9/10): the node layer
//! (type dispatch, invariant checking), the bounded update lists that
//! bubble structural changes up one layer at a time, and the cursor
//! operations (`insert`/`write`/`read`/`remove`) built on top of them.

pub mod cursor;
pub mod node;
pub mod node_updates;

pub use cursor::{insert, read, remove, write};
pub use node::validate_tree;
pub use node_updates::{NodeUpdates, PivotUpdate, Side, SiblingUpdate};
