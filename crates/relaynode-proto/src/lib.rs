/// Generated gRPC protocol definitions for relaynode.
///
/// This crate provides the protocol buffer definitions and generated code
/// for communication between the fleet controller and a node agent.
pub mod relaynode {
    pub mod v1 {
        tonic::include_proto!("relaynode.v1");
    }
}

// Re-export commonly used types for convenience
pub use relaynode::v1::*;
