mod outcome;
mod result_set;
mod row;

pub use outcome::ExecOutcome;
pub use result_set::ResultSet;
pub use row::CustomDbRow;
