//! # TP Runtime
//!
//! Bootstrap pieces for the `tp-runtime` binary, exposed as a library so the
//! bundled families can be reused and tested.

pub mod cli;

#[cfg(feature = "intkey")]
pub mod intkey;
