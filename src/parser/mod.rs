//! Pure parsers for the text the external facilities print.
pub mod nmap;
pub mod ping;
pub mod speedtest;
