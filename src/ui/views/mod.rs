mod branches;
mod dashboard;
mod page;
mod products;
mod salespeople;
mod upload;

pub use page::PageView;
pub use upload::UploadView;
