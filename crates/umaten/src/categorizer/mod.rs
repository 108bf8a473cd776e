pub mod resolver;
pub mod tree;

pub use resolver::{CategoryDirective, CategoryResolver};
pub use tree::{CategoryCatalog, CategoryId, CategoryNode, CategoryRecord, CategoryTree};
