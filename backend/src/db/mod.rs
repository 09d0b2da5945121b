pub mod dynamodb_repository;
pub mod memory_repository;
pub mod repository;

pub use dynamodb_repository::DynamoDbRepository;
pub use memory_repository::InMemoryRepository;
