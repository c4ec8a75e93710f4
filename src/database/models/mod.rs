pub mod budget;
pub mod expense;
pub mod user_profile;

pub use budget::Budget;
pub use expense::{Expense, NewExpense, SpendingRow};
pub use user_profile::{ProfileUpdate, UserProfile};
