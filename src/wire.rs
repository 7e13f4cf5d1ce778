//! Generated protobuf types for the Cast v2 envelope and device-auth
//! handshake, compiled from `proto/cast_channel.proto` by `build.rs`.
#![allow(clippy::all)]
include!(concat!(env!("OUT_DIR"), "/wire.rs"));
