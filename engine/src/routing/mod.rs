mod group;
mod router;

pub use group::{GroupBuilder, GroupRouter};
pub use router::{
    register_route_name, route, route_with_params, BoxedHandler, RouteBuilder, Router,
};
