//! Synteny search: micro-synteny tracks and macro-synteny blocks.

pub mod blocks;
pub mod metrics;
pub mod micro;
pub mod paf;
pub mod pairwise;
