//! Store contract tests shared by every `DocumentStore` implementation

pub mod store_tests;
