//! Physical properties of operators.
//!
//! A [`StructuralPropertiesVector`] describes how an operator's output is spread over the
//! cluster ([`Partitioning`]) and how it is arranged inside each partition
//! ([`LocalProperty`]). Operators state what they require of their inputs and compute what
//! they deliver; enforcers are inserted where the two do not match.

mod distribution;

use std::fmt::Debug;
use std::hash::Hash;

pub use distribution::*;
mod order;
pub use order::*;
mod physical;
pub use physical::*;
mod coordination;
pub use coordination::*;

pub trait PhysicalProp: Debug + Hash {
    /// Tests whether self satisfies `other`.
    ///
    /// Both sides are expected to be normalized against the same equivalence classes.
    fn satisfies(&self, other: &Self) -> bool;
}
