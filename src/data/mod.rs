//! Data files: writing measurement tables and reading them back.
pub mod datafile;
pub mod metadata;
pub mod reader;

pub use datafile::{format_number, DataFileWriter};
pub use metadata::{ChannelInfo, RunMetadata};
pub use reader::{DataSet, DataTail, TailUpdate};
