pub mod api;
pub mod app;
pub mod db;
pub mod error;
pub mod models;
pub mod router;
pub mod shell;
pub mod state;
pub mod validation;
