//! Planner Scout - product page extraction and collection sync
//!
//! Classifies pages, extracts structured product records with selector
//! cascades, and keeps a local cache in sync with a remote collection
//! service under dedup and rate-limit rules.

pub mod application;
pub mod domain;
pub mod infrastructure;
