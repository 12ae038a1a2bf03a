//! Integration tests for shareindex

mod config_integration;
mod filelist_roundtrip;
mod hash_cache;
mod hasher_verification;
mod refresh_scenarios;
mod test_utils;
