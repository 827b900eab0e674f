//! Generated protobuf messages and service stubs for `lastmile.v1`.

#![allow(clippy::all, clippy::pedantic)]

tonic::include_proto!("lastmile.v1");

/// Encoded descriptor set served by gRPC reflection.
pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("lastmile_descriptor");
