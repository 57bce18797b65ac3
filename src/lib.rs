pub mod arg_parser;
pub mod bus;
pub mod config;
pub mod controller;
pub mod errors;
pub mod fan_curve;
pub mod logger;
pub mod sensor;
