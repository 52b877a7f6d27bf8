pub mod chat;
pub mod embedding;
pub mod keywords;
pub mod rerank;
pub mod similar;
