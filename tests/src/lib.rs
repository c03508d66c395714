//! Integration test crate for the DHT.
//!
//! This crate has no library code -- it only contains integration tests
//! that exercise end-to-end flows across multiple workspace crates over
//! real TCP sockets on ephemeral ports.
