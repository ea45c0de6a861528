mod admission;
pub mod grpc;
pub mod http;

pub use admission::{AdmissionRequest, AdmissionService};
