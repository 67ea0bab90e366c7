pub mod routes;

pub use routes::serve;
