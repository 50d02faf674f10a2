//! Logic shared by the streaming and aggregate completion paths

pub mod query;
