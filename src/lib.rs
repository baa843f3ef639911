//! Crunch - A fitness club member registry with geodesic distance statistics.
//!
//! # Overview
//!
//! Members register with their name, company, email and home coordinates.
//! Logged-in members can list everyone registered, and anyone can ask how far
//! apart the membership is: the service computes the great-circle distance
//! between every pair of members and reports the minimum, maximum, mean and
//! standard deviation.
//!
//! # Modules
//!
//! - [`aggregation`]: Pairwise haversine distances and their summary statistics
//! - [`model`]: Coordinates, statistics records and member types
//! - [`validation`]: Registration parameter checks
//! - [`auth`]: Password digests and credential checks
//! - [`session`]: Cookie-based login sessions
//! - [`storage`]: SQLite storage layer
//! - [`api`]: HTTP API handlers

pub mod aggregation;
pub mod api;
pub mod auth;
pub mod model;
pub mod pages;
pub mod session;
pub mod storage;
pub mod validation;
