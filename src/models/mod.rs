pub mod day;
pub mod trip;
pub mod user;
