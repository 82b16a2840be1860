//! PubMed Central full-text parsing

pub mod parser;

pub use parser::parse_sections;
