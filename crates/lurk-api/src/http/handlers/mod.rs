pub mod history;
pub mod providers;
pub mod stream;
pub mod synthesis;
pub mod tokens;
