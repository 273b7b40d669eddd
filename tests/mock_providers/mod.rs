//! Mock provider servers for integration tests
//!
//! - WebSocket: Edge read-aloud synthesis (`edge_mock`)
//! - HTTP: the voice list is mocked with `wiremock` directly in the tests

#![allow(dead_code)]

pub mod edge_mock;

pub use edge_mock::{
    EdgeMockBehavior, EdgeMockServer, FIRST_WORD_OFFSET, RecordedHandshake, WORD_DURATION,
    WORD_STRIDE,
};
