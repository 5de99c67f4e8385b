//! Handler registry: descriptors, parameter schemas and the shared store.

mod descriptor;
mod params;
mod store;

pub use descriptor::{Handler, HandlerDescriptor, HandlerFuture, HandlerResult, Method, MethodSet};
pub use params::{ParamSpec, ParamType, Params, bind_params};
pub use store::{ClearOutcome, Registry, RegistrySnapshot, UnitHandlers};
