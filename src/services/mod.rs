pub mod disk_cache;
pub mod file_system;
pub mod memory_client;
pub mod object_client;
pub mod path_normalizer;
pub mod s3_client;
pub mod virtual_file;
