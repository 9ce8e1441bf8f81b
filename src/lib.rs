pub mod aggregate;
pub mod api;
pub mod auth;
pub mod cart_repo;
pub mod cart_service;
pub mod config;
pub mod orm;
pub mod recipe_repo;
pub mod routes;
pub mod schema;
pub mod shopping_list;
pub mod short_link_repo;
pub mod short_link_service;
pub mod user_repo;
