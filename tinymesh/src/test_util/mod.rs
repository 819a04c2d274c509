//! An in-memory radio medium and a harness for running several mesh nodes on it. They are used
//!  for testing the mesh engine itself, but are exported for testing applications on top of it.

pub mod network;
pub mod radio;
