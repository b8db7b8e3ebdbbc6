pub mod bootstrap;
pub mod cli;
pub mod package;
pub mod repo;
pub mod spec;
