//! Route tree builder: path nodes, method bindings and the preflight post-pass.

mod cors;
mod method;
mod tree;

pub use cors::{
    allow_methods_value, PreflightResponse, ALLOW_HEADERS_HEADER, ALLOW_METHODS_HEADER,
    ALLOW_ORIGIN_HEADER,
};
pub use method::HttpMethod;
pub use tree::{
    build_route_tree, Integration, MethodBinding, RouteDeclaration, RouteDescriptor, RouteNode,
    RouteTarget, RouteTree,
};
