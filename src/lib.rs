pub mod config;
pub mod errors;
pub mod logging;
pub mod oracle;
pub mod refine;
pub mod signals;
pub mod temper_config;

#[cfg(test)]
mod testing;
