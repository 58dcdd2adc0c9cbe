// src/consensus/mod.rs

pub mod adapter;
pub mod config;
pub mod controller;
pub mod disagreement;
pub mod document;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod event;
pub mod extractor;
pub mod session;
pub mod similarity;
pub mod store;

pub use engine::{ConsensusEngine, SessionHandle};
pub use error::ConsensusError;
