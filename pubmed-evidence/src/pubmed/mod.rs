//! PubMed E-utilities access: search, record fetch and PMC links

pub mod client;
pub mod parser;
pub(crate) mod responses;

pub use client::{PubMedClient, MAX_SEARCH_RESULTS};
pub use parser::parse_documents;
