//! Core sizing rules for B+Tree node reservations.
//!
//! This crate defines how many nodes a batch of tree operations must have held back before it
//! starts, and how far a node pool must grow to admit such a reservation. It knows nothing about
//! the ledger that tracks reservations or the tree that backs them.
//!
//! Nothing in this crate requires the standard library.

#![cfg_attr(all(not(feature = "std"), not(test)), no_std)]

pub mod ops;
pub mod sizing;

pub use ops::Operations;
pub use sizing::{available_nodes, growth_target, reserve_nodes, unreserved};
