//! Sequential specifications the checker validates histories against
//!
//! This module provides the [`Model`] trait plus two ready-made models:
//! - `RegisterModel`: a single string register with get, put and CAS
//! - `KvModel`: many such registers addressed by key, partitioned per key

pub mod kv;
pub mod register;
mod traits;

pub use kv::{KvInput, KvModel};
pub use register::{RegisterInput, RegisterModel, RegisterOutput};
pub use traits::Model;
