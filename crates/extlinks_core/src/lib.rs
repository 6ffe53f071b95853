pub mod config;
pub mod delimit;
pub mod namespace;
pub mod pages;
pub mod params;
pub mod policy;
pub mod processor;
pub mod runtime;
pub mod sections;
pub mod template;
