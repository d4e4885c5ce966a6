//! # CLI Command Implementations
//!
//! This module contains the implementation for each subcommand of the
//! `subforge` command-line tool. Each subcommand lives in its own file.
//!
//! ## Structure
//!
//! Each command module contains:
//! - An `Args` struct that defines the command-specific arguments and
//!   options, derived using `clap`.
//! - An `execute` function that takes the parsed `Args`, builds the
//!   settings, and calls into the `subforge` library to do the work.

pub mod merge;
