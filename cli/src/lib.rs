pub mod activation;
pub mod bundle;
pub mod clients;
pub mod config;
pub mod deps;
pub mod dynamodb;
pub mod ec2;
pub mod envs;
pub mod error;
pub mod list;
pub mod logger;
pub mod pipeline;
pub mod provider;
pub mod publish;
pub mod retry;
pub mod role;
pub mod s3;
