//! # Tessera
//!
//! Command-line driver for the Tessera core: configuration loading, manifest
//! checks, migrations, batch pushes and read-back.

pub mod cli;
