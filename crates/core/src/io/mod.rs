//! I/O operations for reading flow vector files

mod text;

pub use text::{parse_vectors, read_vectors, write_vectors};
