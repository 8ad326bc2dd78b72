pub mod styles;
pub mod xlsx;

pub use xlsx::read_workbook;
