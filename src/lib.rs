pub mod app;
pub mod auth;
pub mod completions;
pub mod config;
pub mod db;
pub mod error;
pub mod exercises;
pub mod mail;
pub mod meals;
pub mod nutrition_plans;
pub mod progress;
pub mod reviews;
pub mod schedule;
pub mod sessions;
pub mod state;
pub mod storage;
pub mod uploads;
pub mod users;
pub mod validate;
pub mod workout_plans;
