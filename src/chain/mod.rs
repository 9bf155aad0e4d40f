pub mod providers;
pub mod rpc;
pub mod retry;
pub mod batch_client;
pub mod path_codec;
pub mod contracts;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
