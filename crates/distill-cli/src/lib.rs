//! Library side of the `distill` command line tool.
pub mod experiment;
