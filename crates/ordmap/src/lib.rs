//! This crate contains an ordered map implementation based on a red-black
//! tree that tracks subtree sizes.
//!
//! To use it, create a [map::OrdMap] and use it like a
//! [BTreeMap](std::collections::BTreeMap) with rank queries.
#![doc = include_str!("../README.md")]

#![warn(missing_docs)]

/// Iterators over map entries, keys and values.
pub mod iter;
/// The ordered map implementation.
pub mod map;

/// Contains an augmented red-black tree implementation based on slab.
mod tree;
