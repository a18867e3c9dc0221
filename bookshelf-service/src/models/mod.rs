pub mod book;
pub mod requests;
pub mod responses;
pub mod storage;
