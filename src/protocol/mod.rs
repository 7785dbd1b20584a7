pub mod bit_stream;
pub mod messages;
pub mod range_list;
