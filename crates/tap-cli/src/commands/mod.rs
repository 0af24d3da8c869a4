//! CLI command implementations

pub mod catalog;
pub mod inspect;
pub mod list;

pub use catalog::CatalogCommand;
pub use inspect::InspectCommand;
pub use list::ListCommand;
