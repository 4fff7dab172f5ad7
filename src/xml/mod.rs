// ABOUTME: XML document collaborators for export and sync
// ABOUTME: Fixed schema: <Departments><Department><DepCode/><DepJob/><Description/></Department></Departments>

pub mod reader;
pub mod writer;

pub use reader::{parse_departments, read_departments, RawDepartment};
pub use writer::{write_departments, write_document};

pub(crate) const ROOT: &str = "Departments";
pub(crate) const DEPARTMENT: &str = "Department";
