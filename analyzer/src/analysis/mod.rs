pub mod binned;
pub mod flagging;
pub mod optimize;
pub mod scoring;
pub mod slopes;
