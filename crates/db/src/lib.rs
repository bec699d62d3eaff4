pub mod bigquery;
pub mod connection;
pub mod migrations;
pub mod repositories;

pub use bigquery::{AccessTokenSource, BigQueryConfigError, BigQuerySink, BigQueryTable};
pub use connection::{connect, connect_with_settings, DbPool};
pub use repositories::{QuotationRepository, RepositoryError, SqlQuotationRepository};
