pub mod digest;

pub use digest::{constant_time_eq, sha256_hex};
