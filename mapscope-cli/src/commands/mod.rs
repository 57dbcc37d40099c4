pub mod checksum;
pub mod serve;
