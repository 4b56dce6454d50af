// fixtures/tables/mod.rs
//
// Row types and expected counts for the tables in tests/fixtures.sql.

pub mod companies;

pub use companies::{CompaniesTable, Company, MetaTable};
