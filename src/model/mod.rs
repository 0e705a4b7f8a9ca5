//! Types that represent the core data model, such as `Record`, `Amount` and `Filters`.
mod amount;
mod filters;
mod record;

pub use amount::{Amount, AmountError};
pub use filters::{Direction, FilterUpdate, Filters, SortBy};
pub(crate) use record::value_text;
pub use record::{Fields, Record, RecordId, Scope};
pub(crate) use record::{AMOUNT, CATEGORY, DATE, ID, NAME, STATUS};
