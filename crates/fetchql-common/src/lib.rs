//! Common types and error handling shared across the FetchQL workspace.

pub mod cancellation;
pub mod error;
pub mod result;

pub use cancellation::CancellationToken;
pub use error::{Error, Result};
pub use result::{ColumnInfo, QueryResult, QueryRow, QueryValue};
