pub mod alloc;
pub mod gc;
pub mod heap;

pub use gc::GcReport;
pub use heap::{Heap, HeapStats};

pub const KB: usize = 1024;
pub const MB: usize = 1024 * KB;
