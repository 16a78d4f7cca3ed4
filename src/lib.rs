pub mod conf;
pub mod dhcp;
pub mod protocol;
pub mod transport;
