#[cfg(feature = "cli")]
pub mod cli;
pub mod rules;

#[cfg(feature = "cli")]
pub use cli::CliConfig;
