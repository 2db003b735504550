//! Adaptive, incrementally-migrating data structures (spec.md §4.3/§4.4):
//! a handle allocator and a hash table, both of which resize by growing a
//! second backing store and migrating a bounded quantum of entries per
//! operation rather than stopping the world.

pub mod clock_alloc;
pub mod hash_table;

pub use clock_alloc::ClockAllocator;
pub use hash_table::AdaptiveHashTable;
