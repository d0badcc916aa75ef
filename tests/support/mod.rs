#![allow(dead_code)]

pub mod atmos_env;
pub mod fake_service;
