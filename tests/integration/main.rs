//! Integration tests for storybatch.
//!
//! `cli` drives the binary end to end; `scheduler` wires the library pieces
//! together the way the binary does, with a scripted story runner.

mod cli;
mod scheduler;
