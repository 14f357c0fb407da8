//! CLI command implementations.
//!
//! Each submodule owns one `Commands` variant:
//!
//! | Module    | Commands handled |
//! |-----------|------------------|
//! | `refine`  | `Refine`         |
//! | `status`  | `Status`         |
//! | `config`  | `Config`         |

pub mod config;
pub mod refine;
pub mod status;

pub use config::cmd_config;
pub use refine::cmd_refine;
pub use status::cmd_status;
