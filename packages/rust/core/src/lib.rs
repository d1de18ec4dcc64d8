//! Core pipeline orchestration and domain logic for formpipe.
//!
//! This crate ties together input discovery, record transformation, the
//! form tool, output relocation and archiving into a single run
//! (see [`pipeline::Pipeline`]).

pub mod archive;
pub mod discover;
pub mod pipeline;
pub mod relocate;
pub mod template;
pub mod transform;
