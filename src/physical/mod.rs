pub mod btree;
pub mod db;
pub mod header;
pub mod scan;
pub mod slack;
pub mod source;
pub mod varint;

pub(crate) mod buf;
