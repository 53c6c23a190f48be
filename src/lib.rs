pub mod error;
pub mod options;
pub mod physical;
pub mod schema;

pub use crate::{
    error::{ForensicError, Result},
    options::AnalysisOptions,
    physical::db::Database,
};
