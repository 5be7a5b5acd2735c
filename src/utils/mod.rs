pub mod file_name;
pub mod validation;
