pub mod aggregation;
pub mod expression;
pub mod parser;
pub mod statement;

pub use aggregation::{Aggregation, GroupBy, TimeUnit};
pub use expression::{ComparisonOp, ComparisonValue, Expression};
pub use parser::parse_statement;
pub use statement::{
    DeleteStatement, DropStatement, InsertStatement, OrderBy, Projection, SelectStatement,
    SelectedField, SimpleOp, SortOrder, Statement,
};
