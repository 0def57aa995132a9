pub mod cli;
pub mod launcher;
