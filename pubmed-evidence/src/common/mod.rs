//! Types shared by the PubMed and PMC modules

pub mod ids;
pub mod xml;

pub use ids::{PmcId, PubMedId};
