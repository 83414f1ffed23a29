pub mod endpoint;
pub mod validator;

pub use endpoint::{EndpointDriver, SparqlFormat, SparqlPayload};
pub use validator::{validate, QueryType};
