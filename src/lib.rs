//! Cover song identification over audio feature matrices.
//!
//! The crate turns per-song collections of cover representations (MFCC/HPCP
//! time series) into P×K hard-triplet training batches, and evaluates trained
//! embedding models by ranking covers in the learned space.

pub mod config;
pub mod dataset;
pub mod error;
pub mod eval;
pub mod model;
pub mod songbase;
