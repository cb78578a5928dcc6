//! Fixed-capacity containers used on the hot path.
//!
//! None of these types grow or panic on overflow: every mutator either
//! succeeds or silently declines, mirroring the original tool's
//! `StackMap`/`StackSet` templates. Rust's const generics stand in for the
//! original's compile-time `Size` template parameter. `FixedMap`/`FixedSet`
//! hold their slots inline (no indirection past construction); `FixedVec`
//! reserves its backing buffer once, at construction, and never reallocates
//! past that — the one upfront reservation the hot path pays, in exchange
//! for `push` being a plain bounds-checked write rather than a second
//! allocation strategy.

mod map;
mod set;
mod vec;

pub use map::FixedMap;
pub use set::FixedSet;
pub use vec::{CapacityError, FixedVec};
