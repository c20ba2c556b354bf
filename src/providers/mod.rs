pub mod memory;
pub mod openai;
pub mod prices;
pub mod sqlite;
