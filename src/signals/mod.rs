//! Section extraction from raw oracle output.
//!
//! Every prompt temper sends asks the oracle to wrap the parts it needs in
//! labeled tags, for example:
//!
//! - `<advice>...</advice>` - critique advice
//! - `<recommendation>3</recommendation>` - quality ordinal
//! - `<verdict>2</verdict>` - judge vote
//! - `<list>...</list>` and `<gaps>...</gaps>` - itemized checklists
//!
//! A missing section is never an error here; callers decide the default.

mod parser;

pub use parser::{extract_first_integer, extract_list_items, extract_section, is_none_marker};
