//! Stream concurrency limits.
//! 流并发限制。
//!
//! Computes how far the advertised stream limit may grow and which incoming
//! stream ids are admissible.
//!
//! 计算通告的流限制可以增长多少，以及哪些传入的流ID是可接受的。

pub mod limiter;


pub use limiter::{StreamLimit, StreamLimiter, compute_next_limit, is_stream_id_admissible};
